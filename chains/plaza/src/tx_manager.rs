//! Builds, signs and submits one contract call, then polls for its receipt.
//! No retries happen here; callers own their retry budgets.

use crate::chain::ChainClient;
use anyhow::{anyhow, Context, Result};
use core_logic::GasConfig;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub label: String,
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
}

impl ContractCall {
    pub fn new(label: impl Into<String>, to: Address, data: Bytes) -> Self {
        Self {
            label: label.into(),
            to,
            data,
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    Confirmed { hash: H256 },
    Reverted { hash: H256 },
    /// Submitted but no receipt before the deadline. May still land.
    TimedOut { hash: H256 },
    /// Never reached the mempool.
    Failed { reason: String },
}

impl TransactionResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransactionResult::Confirmed { .. })
    }

    pub fn hash(&self) -> Option<H256> {
        match self {
            TransactionResult::Confirmed { hash }
            | TransactionResult::Reverted { hash }
            | TransactionResult::TimedOut { hash } => Some(*hash),
            TransactionResult::Failed { .. } => None,
        }
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionResult::Confirmed { hash } => write!(f, "confirmed {:?}", hash),
            TransactionResult::Reverted { hash } => write!(f, "reverted {:?}", hash),
            TransactionResult::TimedOut { hash } => write!(f, "no receipt for {:?}", hash),
            TransactionResult::Failed { reason } => write!(f, "not submitted: {}", reason),
        }
    }
}

pub struct TransactionManager {
    chain: Arc<dyn ChainClient>,
    gas: GasConfig,
    poll_interval: Duration,
    timeout: Duration,
}

impl TransactionManager {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        gas: GasConfig,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            gas,
            poll_interval,
            timeout,
        }
    }

    pub async fn submit(&self, call: &ContractCall, signer: &LocalWallet) -> TransactionResult {
        let from = signer.address();
        let hash = match self.send(call, signer).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("❌ {} from {:?} failed before submission: {:#}", call.label, from, e);
                return TransactionResult::Failed {
                    reason: format!("{:#}", e),
                };
            }
        };

        info!("📤 {} sent: {:?}", call.label, hash);
        let result = self.wait_for_receipt(hash).await;
        match &result {
            TransactionResult::Confirmed { .. } => info!("✅ {} confirmed: {:?}", call.label, hash),
            TransactionResult::Reverted { .. } => {
                warn!("❌ {} from {:?} reverted: {:?}", call.label, from, hash)
            }
            TransactionResult::TimedOut { .. } => warn!(
                "⏳ {} from {:?} not mined after {}s: {:?}",
                call.label,
                from,
                self.timeout.as_secs(),
                hash
            ),
            TransactionResult::Failed { .. } => {}
        }
        result
    }

    async fn send(&self, call: &ContractCall, signer: &LocalWallet) -> Result<H256> {
        let from = signer.address();
        let mut request = TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(call.data.clone());
        if let Some(value) = call.value {
            request = request.value(value);
        }
        let mut tx: TypedTransaction = request.into();

        let estimate = self
            .chain
            .estimate_gas(&tx)
            .await
            .context("Gas estimation failed")?;
        if estimate > U256::from(u128::MAX) {
            return Err(anyhow!("Gas estimate out of range: {}", estimate));
        }
        let gas_limit = U256::from(self.gas.buffered_limit(estimate.as_u128()));

        let gas_price = self.chain.gas_price().await.context("Failed to read gas price")?;
        let nonce = self.chain.nonce(from).await.context("Failed to read nonce")?;
        let chain_id = self.chain.chain_id().await.context("Failed to read chain id")?;

        tx.set_gas(gas_limit);
        tx.set_gas_price(gas_price);
        tx.set_nonce(nonce);
        tx.set_chain_id(chain_id);
        debug!(
            "{}: nonce {} gas {} price {} chain {}",
            call.label, nonce, gas_limit, gas_price, chain_id
        );

        let signature = signer
            .sign_transaction(&tx)
            .await
            .context("Failed to sign transaction")?;
        let raw = tx.rlp_signed(&signature);

        self.chain.send_raw_transaction(raw).await
    }

    /// Polls every `poll_interval` until a receipt shows up or `timeout` passes.
    /// Read errors while polling count as "not yet".
    async fn wait_for_receipt(&self, hash: H256) -> TransactionResult {
        let deadline = Instant::now() + self.timeout;

        loop {
            match self.chain.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    return if receipt.status == Some(U64::from(1)) {
                        TransactionResult::Confirmed { hash }
                    } else {
                        TransactionResult::Reverted { hash }
                    };
                }
                Ok(None) => debug!("Waiting for receipt {:?}", hash),
                Err(e) => debug!("Receipt poll for {:?} failed: {:#}", hash, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return TransactionResult::TimedOut { hash };
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
