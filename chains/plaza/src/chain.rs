//! RPC seam. Everything that talks to the node goes through [`ChainClient`]
//! so the pipeline can be driven against a scripted chain in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn native_balance(&self, address: Address) -> Result<U256>;
    async fn gas_price(&self) -> Result<U256>;
    /// Latest-block transaction count of `address`.
    async fn nonce(&self, address: Address) -> Result<U256>;
    async fn chain_id(&self) -> Result<u64>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;
}

/// JSON-RPC over HTTP(S).
#[derive(Clone, Debug)]
pub struct RpcChain {
    provider: Provider<Http>,
    endpoint: String,
}

impl RpcChain {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(rpc_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .context("Failed to build RPC client")?;
        let url = reqwest::Url::parse(rpc_url)
            .with_context(|| format!("Invalid RPC url {}", rpc_url))?;
        let provider = Provider::new(Http::new_with_client(url, client));

        Ok(Self {
            provider,
            endpoint: rpc_url.to_string(),
        })
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn native_balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn nonce(&self, address: Address) -> Result<U256> {
        Ok(self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Latest.into()))
            .await?)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chainid().await?.as_u64())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        Ok(self.provider.call(&tx, None).await?)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        Ok(self.provider.estimate_gas(tx, None).await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .with_context(|| format!("eth_sendRawTransaction failed on {}", self.endpoint))?;
        Ok(*pending)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }
}
