use crate::chain::ChainClient;
use anyhow::Result;
use core_logic::{wei_to_gwei, GasConfig};
use ethers::types::U256;
use std::sync::Arc;
use tracing::{info, warn};

/// Admits state-changing work only while the network fee is at or below
/// the configured ceiling.
#[derive(Clone)]
pub struct GasGate {
    chain: Arc<dyn ChainClient>,
    config: GasConfig,
}

impl GasGate {
    pub fn new(chain: Arc<dyn ChainClient>, config: GasConfig) -> Self {
        Self { chain, config }
    }

    pub fn ceiling(&self) -> U256 {
        U256::from(self.config.max_fee_wei())
    }

    pub async fn current_fee(&self) -> Result<U256> {
        self.chain.gas_price().await
    }

    /// `true` iff the fee could be read and is `<=` the ceiling. Never errors.
    pub async fn accept(&self) -> bool {
        match self.current_fee().await {
            Ok(fee) => {
                let fee_gwei = wei_to_gwei(fee.low_u128());
                if fee <= self.ceiling() {
                    info!("⛽ Gas price {:.4} gwei (limit {} gwei)", fee_gwei, self.config.max_gwei());
                    true
                } else {
                    warn!(
                        "⛽ Gas price too high: {:.4} gwei > {} gwei",
                        fee_gwei,
                        self.config.max_gwei()
                    );
                    false
                }
            }
            Err(e) => {
                warn!("⛽ Failed to read gas price: {:#}", e);
                false
            }
        }
    }
}
