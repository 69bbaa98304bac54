//! # Core Logic - Gas Configuration
//!
//! Chain-agnostic gas policy: the fee ceiling that gates every state-changing
//! call and the safety buffer applied on top of node gas estimates. The chain
//! crates do the actual RPC reads.

use serde::Deserialize;

/// Configuration for gas management
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasConfig {
    /// Highest acceptable network fee, in gwei. Inclusive.
    pub max_gwei: f64,
    /// Percentage added on top of `eth_estimateGas`.
    pub estimate_buffer_percent: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            max_gwei: 1.0,
            estimate_buffer_percent: 20,
        }
    }
}

impl GasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_fee(mut self, max_gwei: f64) -> Self {
        self.max_gwei = max_gwei;
        self
    }

    pub fn with_buffer_percent(mut self, percent: u64) -> Self {
        self.estimate_buffer_percent = percent;
        self
    }

    pub fn max_gwei(&self) -> f64 {
        self.max_gwei
    }

    /// Fee ceiling in wei.
    pub fn max_fee_wei(&self) -> u128 {
        gwei_to_wei(self.max_gwei)
    }

    /// `estimate * (100 + buffer) / 100`, saturating.
    pub fn buffered_limit(&self, estimate: u128) -> u128 {
        estimate.saturating_mul(100 + self.estimate_buffer_percent as u128) / 100
    }
}

/// Convert gwei to wei
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * 1e9).round() as u128
}

/// Convert wei to gwei for display
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

/// Deserialize helper for GasConfig from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GasConfigToml {
    pub max_gwei: Option<f64>,
    pub estimate_buffer_percent: Option<u64>,
}

impl From<GasConfigToml> for GasConfig {
    fn from(toml: GasConfigToml) -> Self {
        let defaults = GasConfig::default();
        Self {
            max_gwei: toml.max_gwei.unwrap_or(defaults.max_gwei),
            estimate_buffer_percent: toml
                .estimate_buffer_percent
                .unwrap_or(defaults.estimate_buffer_percent),
        }
    }
}
