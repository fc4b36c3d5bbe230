//! Process-wide `tracing` setup shared by the onboard binaries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs::File, str::FromStr, sync::Arc};
use tracing::Level;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{self, writer::BoxMakeWriter},
    prelude::*,
    Registry,
};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Plain,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    /// Global level (`trace` .. `error`). Unknown values fall back to `info`.
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    pub file_path: Option<String>,
    /// Extra `EnvFilter` directives, e.g. `onboard_connector=debug,reqwest=warn`.
    #[serde(default)]
    pub filter: Option<String>,
}

impl LogConfig {
    fn level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let builder = EnvFilter::builder().with_default_directive(LevelFilter::from_level(self.level()).into());
        match self.filter.as_deref() {
            Some(directives) => builder
                .parse(directives)
                .with_context(|| format!("Invalid log filter '{}'", directives)),
            None => Ok(builder.parse_lossy("")),
        }
    }

    fn writer(&self) -> Result<BoxMakeWriter> {
        match self.output {
            LogOutput::Stdout => Ok(BoxMakeWriter::new(std::io::stdout)),
            LogOutput::File => {
                let file_path = self
                    .file_path
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("Log output is 'file' but 'file_path' is not specified"))?;
                let log_file = File::create(file_path)
                    .with_context(|| format!("Failed to create log file {}", file_path))?;
                Ok(BoxMakeWriter::new(Arc::new(log_file)))
            }
        }
    }
}

/// Installs the global subscriber. Fails if the configuration is invalid or a subscriber is
/// already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let writer = config.writer()?;
    let subscriber = Registry::default().with(filter);

    match config.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().with_writer(writer).json())
            .try_init()?,
        LogFormat::Plain => subscriber
            .with(fmt::layer().with_writer(writer).with_ansi(config.output == LogOutput::Stdout).pretty())
            .try_init()?,
    }

    Ok(())
}
