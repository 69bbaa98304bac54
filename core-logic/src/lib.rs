//! # Core Logic - Shared Utilities for Testnet Bots
//!
//! Chain-agnostic building blocks used by the bots under `chains/`.
//!
//! ## Modules
//!
//! - [`config`] - Shared configuration structures (proxies)
//! - [`error`] - Typed error handling with thiserror
//! - [`traits`] - Core trait definitions
//! - `utils` - Retry policies, gas ceiling, key file, proxies, logger, shutdown

pub mod config;
pub mod error;
pub mod traits;
pub(crate) mod utils;

pub use config::ProxyConfig;
pub use error::{ConfigError, NetworkError, WalletError};
pub use traits::{Task, TaskResult};

pub use utils::{
    gwei_to_wei, random_between, setup_logger, wei_to_gwei, with_retry, Backoff, GasConfig,
    GasConfigToml, PrivateKey, ProxyManager, RetryPolicy, RetryState, WalletManager,
    WorkerRunner, RESULT_TARGET,
};
