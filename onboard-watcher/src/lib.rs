pub mod cli;
pub mod config;
pub mod node_provider;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::{load_config, WatcherConfig};
use node_provider::NodeProvider;
use onboard_connector::registry::ProviderRegistry;
use onboard_connector::{StoreKey, StoreSlice, SyncEngine};
use std::sync::Arc;
use tokio::signal;
use tokio_stream::StreamExt;

/// The main entry point for running the watcher.
/// This function handles CLI parsing, configuration, and engine startup.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let Commands::Run(run_cmd) = cli.command;
    let config = load_config_from_cli(run_cmd)?;
    onboard_logger::init(&config.watcher.log)?;
    tracing::info!("Configuration loaded: {:#?}", &config);
    run_watcher(config).await?;

    Ok(())
}

/// Loads the watcher configuration based on the provided CLI command.
fn load_config_from_cli(run_cmd: cli::RunCmd) -> Result<WatcherConfig> {
    if let Some(config_path) = run_cmd.config {
        println!("Loading configuration from '{}'", &config_path);
        load_config(&config_path)
    } else {
        println!("No config file provided, using default settings.");
        Ok(WatcherConfig::default())
    }
}

/// Connects the node wallet, logs every wallet change and disconnects on Ctrl+C.
async fn run_watcher(config: WatcherConfig) -> Result<()> {
    let registry = Arc::new(ProviderRegistry::new().context("Failed to create RPC client")?);
    let engine = SyncEngine::builder()
        .with_config(config.connector)
        .with_registry(registry.clone())
        .build()?;

    let mut wallets = Box::pin(engine.store().select(StoreKey::Wallets));
    let printer = tokio::spawn(async move {
        while let Some(slice) = wallets.next().await {
            let StoreSlice::Wallets(wallets) = slice else {
                continue;
            };
            for wallet in &wallets {
                let chain = wallet.active_chain().map(|chain| chain.id.as_str()).unwrap_or("-");
                for account in &wallet.accounts {
                    tracing::info!(
                        label = %wallet.label,
                        chain_id = chain,
                        address = %account.address,
                        ens = ?account.ens.as_ref().map(|record| &record.name),
                        balance = ?account.balance,
                        tokens = ?account.secondary_tokens,
                        "Wallet state"
                    );
                }
            }
            if wallets.is_empty() {
                tracing::info!("No wallets connected");
            }
        }
    });

    let label = config.watcher.label.as_str();
    let provider = NodeProvider::new(registry.client_for_url(&config.watcher.node_url));
    engine
        .connect_evm(label, provider.clone())
        .await
        .with_context(|| format!("Failed to connect to node at {}", config.watcher.node_url))?;
    provider.start_polling(config.watcher.poll_interval());

    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            engine.reset().await;
            printer.abort();
            tracing::info!("Shutdown complete.");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for shutdown signal.");
        }
    }
    Ok(())
}
