//! A wallet state synchronization engine.
//!
//! This crate keeps an in-memory picture of connected wallets (their accounts, active chain and
//! derived account data) consistent with the asynchronous events those wallets emit.
//!
//! # Key Components
//!
//! *   [`workers::SyncEngine`]: the main entry point. Connects wallets, runs one reconciliation
//!     worker per connection and exposes direct provider requests such as `set_chain`.
//! *   [`store::Store`]: the single source of truth, read through snapshots and keyed change
//!     streams.
//! *   [`listener`]: the event bridge that turns native provider notifications into a
//!     per-connection event stream, cancelled on disconnect.
//! *   [`resolvers`]: the enrichment pipeline (balance, ENS, UNS, secondary tokens).
//! *   [`notify`]: keeps a transaction-notification backend subscribed to connected accounts.
//! *   [`registry`]: process-wide JSON-RPC client handles, one per RPC URL.
pub mod client;
/// Defines configuration structures for the engine.
pub mod config;
/// The per-label disconnect broadcast.
pub mod dispatcher;
pub mod error;
/// Normalized wallet events and payload parsing.
pub mod events;
pub mod listener;
pub mod notify;
/// Wallet provider capability traits.
pub mod provider;
pub mod registry;
pub mod resolvers;
pub mod store;
pub mod types;
/// The engine and its per-wallet reconciliation workers.
pub mod workers;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use provider::{Eip1193Provider, ProviderError, SubstrateProvider, WalletProvider};
pub use store::{AppState, Store, StoreKey, StoreSlice};
pub use types::{Account, Chain, ConnectedChain, Namespace, WalletState};
pub use workers::{SyncEngine, SyncEngineBuilder};
