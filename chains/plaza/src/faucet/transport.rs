use super::identity::RequestIdentity;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::Address;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// HTTP side of the faucet: a page visit and the queue request.
#[async_trait]
pub trait FaucetTransport: Send + Sync {
    /// Loads the public site the way a browser would before claiming.
    async fn warm_up(&self, identity: &RequestIdentity) -> Result<()>;

    /// Queues a claim for `address` and returns the HTTP status.
    async fn queue_claim(&self, identity: &RequestIdentity, address: Address) -> Result<u16>;
}

pub struct HttpFaucetTransport {
    queue_url: String,
    origin_url: String,
    timeout: Duration,
}

impl HttpFaucetTransport {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(queue_url: impl Into<String>, origin_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            origin_url: origin_url.into(),
            timeout: Self::REQUEST_TIMEOUT,
        }
    }

    // One client per identity so proxy and default headers never leak
    // between attempts.
    fn client_for(&self, identity: &RequestIdentity) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .default_headers(identity.headers.clone())
            .timeout(self.timeout);

        if let Some(proxy_conf) = &identity.proxy {
            let mut proxy = reqwest::Proxy::all(&proxy_conf.url)
                .with_context(|| format!("Invalid proxy url {}", proxy_conf.url))?;
            if let (Some(u), Some(p)) = (&proxy_conf.username, &proxy_conf.password) {
                proxy = proxy.basic_auth(u, p);
            }
            builder = builder.proxy(proxy);
        }

        builder.build().context("Failed to build faucet client")
    }
}

#[async_trait]
impl FaucetTransport for HttpFaucetTransport {
    async fn warm_up(&self, identity: &RequestIdentity) -> Result<()> {
        let client = self.client_for(identity)?;
        let response = client
            .get(&self.origin_url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.origin_url))?;
        debug!("Warm-up {} -> {}", self.origin_url, response.status());
        Ok(())
    }

    async fn queue_claim(&self, identity: &RequestIdentity, address: Address) -> Result<u16> {
        let client = self.client_for(identity)?;
        let body = json!({ "address": ethers::utils::to_checksum(&address, None) });

        let response = client
            .post(&self.queue_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.queue_url))?;

        Ok(response.status().as_u16())
    }
}
