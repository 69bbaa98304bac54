//! Faucet claiming: browser-like request pacing, the queue POST and on-chain
//! verification that the collateral actually arrived.

pub mod identity;
pub mod transport;

use crate::chain::ChainClient;
use crate::config::Timings;
use crate::contracts::PlazaContracts;
use anyhow::Result;
use core_logic::{with_retry, NetworkError, RetryPolicy};
use ethers::types::{Address, U256};
use identity::IdentityRotation;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use transport::FaucetTransport;

#[derive(Error, Debug)]
pub enum ClaimError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Faucet request failed: {0}")]
    Transport(String),

    #[error("Tokens not received after {checks} checks")]
    NotReceived { checks: u32 },
}

pub struct FaucetClient {
    chain: Arc<dyn ChainClient>,
    contracts: Arc<PlazaContracts>,
    transport: Arc<dyn FaucetTransport>,
    identities: Arc<dyn IdentityRotation>,
    endpoint: String,
    min_balance: U256,
    timings: Timings,
    policy: RetryPolicy,
}

impl FaucetClient {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: Arc<PlazaContracts>,
        transport: Arc<dyn FaucetTransport>,
        identities: Arc<dyn IdentityRotation>,
        endpoint: impl Into<String>,
        min_balance: U256,
        timings: Timings,
    ) -> Self {
        let policy = timings.faucet_policy();
        Self {
            chain,
            contracts,
            transport,
            identities,
            endpoint: endpoint.into(),
            min_balance,
            timings,
            policy,
        }
    }

    /// Up to three claims with exponential backoff. `true` only once the
    /// collateral balance is confirmed on chain. `tag` names the wallet in logs.
    pub async fn claim_and_verify(&self, tag: &str, address: Address) -> bool {
        let claim = move |attempt| self.claim_once(tag, address, attempt);
        match with_retry(self.policy, tag, claim).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} 🚰 Faucet gave up for {:?}: {:#}", tag, address, e);
                false
            }
        }
    }

    pub async fn claim_once(&self, tag: &str, address: Address, attempt: u32) -> Result<()> {
        tokio::time::sleep(self.timings.human_pre_delay.sample()).await;

        let identity = self.identities.next_identity();
        if let Some(proxy) = &identity.proxy {
            info!("{} 🌐 Using proxy {}", tag, proxy.url);
        }

        if let Err(e) = self.transport.warm_up(&identity).await {
            debug!("Warm-up request failed: {:#}", e);
        }

        tokio::time::sleep(self.timings.pre_claim_delay.sample()).await;

        info!(
            "{} 🚰 Requesting faucet (attempt {}/{})",
            tag, attempt, self.policy.max_attempts
        );
        let status = match self.transport.queue_claim(&identity, address).await {
            Ok(status) => status,
            Err(e) => {
                let cooldown = Duration::from_secs(self.timings.transport_error_cooldown_secs);
                warn!(
                    "{} 🚰 Faucet request error (attempt {}), cooling down {}s: {:#}",
                    tag,
                    attempt,
                    cooldown.as_secs(),
                    e
                );
                tokio::time::sleep(cooldown).await;
                return Err(ClaimError::Transport(format!("{:#}", e)).into());
            }
        };

        match status {
            200 => {
                info!("{} 🚰 Faucet claim queued for {:?}", tag, address);
                if self.verify_receipt(tag, address).await {
                    Ok(())
                } else {
                    Err(ClaimError::NotReceived {
                        checks: self.timings.verify_attempts,
                    }
                    .into())
                }
            }
            403 => {
                let cooldown = self.timings.rate_limit_cooldown_secs;
                warn!(
                    "{} 🚰 Faucet answered 403 (attempt {}), waiting {}s",
                    tag, attempt, cooldown
                );
                tokio::time::sleep(Duration::from_secs(cooldown)).await;
                Err(ClaimError::from(NetworkError::RateLimited {
                    endpoint: self.endpoint.clone(),
                    cooldown_secs: cooldown,
                })
                .into())
            }
            other => {
                warn!("{} 🚰 Unexpected faucet status {} (attempt {})", tag, other, attempt);
                Err(ClaimError::from(NetworkError::HttpError {
                    status_code: other,
                    endpoint: self.endpoint.clone(),
                })
                .into())
            }
        }
    }

    /// Polls the collateral balance until it reaches the faucet threshold.
    /// Sleeps between checks only, never after the last one.
    pub async fn verify_receipt(&self, tag: &str, address: Address) -> bool {
        let checks = self.timings.verify_attempts;

        for check in 1..=checks {
            let pause = match self
                .contracts
                .collateral_balance(self.chain.as_ref(), address)
                .await
            {
                Ok(balance) if balance >= self.min_balance => {
                    info!("{} 🚰 Faucet tokens received", tag);
                    return true;
                }
                Ok(_) => {
                    info!("{} ⏳ Waiting for tokens... ({}/{})", tag, check, checks);
                    Duration::from_secs(self.timings.verify_interval_secs)
                }
                Err(e) => {
                    warn!("{} Balance check failed ({}/{}): {:#}", tag, check, checks, e);
                    Duration::from_secs(self.timings.verify_error_pause_secs)
                }
            };

            if check < checks {
                tokio::time::sleep(pause).await;
            }
        }

        false
    }
}
