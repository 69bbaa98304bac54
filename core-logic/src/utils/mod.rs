//! # Utilities Module
//!
//! Internal utility modules for the core-logic crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod gas;
pub(crate) mod logger;
pub(crate) mod proxy_manager;
pub(crate) mod retry;
pub(crate) mod runner;
pub(crate) mod wallet_manager;

pub use gas::{gwei_to_wei, wei_to_gwei, GasConfig, GasConfigToml};
pub use logger::{setup_logger, RESULT_TARGET};
pub use proxy_manager::ProxyManager;
pub use retry::{random_between, with_retry, Backoff, RetryPolicy, RetryState};
pub use runner::WorkerRunner;
pub use wallet_manager::{PrivateKey, WalletManager};
