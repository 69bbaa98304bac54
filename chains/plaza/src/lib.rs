//! # Plaza Finance testnet bot
//!
//! Keeps a set of wallets active on the Plaza testnet pool: each wallet claims
//! wstETH from the faucet, approves the pool and cycles bondETH / levETH
//! through create and redeem, once per scheduling pass.
//!
//! ## Modules
//!
//! - [`config`] - TOML + env configuration and timing table
//! - [`chain`] - RPC seam ([`chain::ChainClient`])
//! - [`contracts`] - pool and ERC20 bindings
//! - [`gas_gate`] - fee ceiling check
//! - [`tx_manager`] - build, sign, submit, await receipt
//! - [`faucet`] - faucet claims and on-chain verification
//! - [`operations`] - create/redeem sequence
//! - [`processor`] - per-wallet pipeline
//! - [`scheduler`] - wallet iteration and cycle timing

pub mod app;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod faucet;
pub mod gas_gate;
pub mod operations;
pub mod processor;
pub mod scheduler;
pub mod tx_manager;

#[cfg(test)]
pub(crate) mod testing;

pub use self::config::{PlazaConfig, Settings};
pub use processor::{WalletContext, WalletProcessor};
pub use scheduler::{CycleReport, CycleScheduler, SchedulerError};
