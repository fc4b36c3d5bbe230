use clap::{Parser, Subcommand};

/// Follows a node-backed wallet and logs every change to its synchronized state.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect the configured wallet and watch it until Ctrl+C.
    Run(RunCmd),
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to the watcher configuration TOML file.
    /// If not provided, default values will be used.
    #[arg(short, long)]
    pub config: Option<String>,
}
