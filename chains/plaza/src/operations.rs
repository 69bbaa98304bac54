//! The fixed create/redeem sequence run against the pool for one wallet.

use crate::chain::ChainClient;
use crate::config::DelayRange;
use crate::contracts::{PlazaContracts, TokenType};
use crate::tx_manager::{ContractCall, TransactionManager};
use anyhow::{anyhow, Result};
use core_logic::RetryPolicy;
use ethers::prelude::*;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Create deposits are drawn from this window, in wei (0.009 to 0.01 ether).
pub const CREATE_MIN_WEI: u64 = 9_000_000_000_000_000;
pub const CREATE_MAX_WEI: u64 = 10_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Redeem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub token: TokenType,
}

impl OperationSpec {
    pub const fn new(kind: OperationKind, token: TokenType) -> Self {
        Self { kind, token }
    }

    /// Create bond, create leverage, redeem bond, redeem leverage.
    pub const CANONICAL: [OperationSpec; 4] = [
        OperationSpec::new(OperationKind::Create, TokenType::Bond),
        OperationSpec::new(OperationKind::Create, TokenType::Leverage),
        OperationSpec::new(OperationKind::Redeem, TokenType::Bond),
        OperationSpec::new(OperationKind::Redeem, TokenType::Leverage),
    ];
}

impl fmt::Display for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperationKind::Create => write!(f, "create {}", self.token),
            OperationKind::Redeem => write!(f, "redeem {}", self.token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Confirmed,
    /// Nothing to redeem; no transaction was sent.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub spec: OperationSpec,
    pub status: OperationStatus,
    pub attempts: u32,
}

impl OperationOutcome {
    pub fn succeeded(&self) -> bool {
        self.status != OperationStatus::Failed
    }
}

pub struct OperationSequencer {
    chain: Arc<dyn ChainClient>,
    contracts: Arc<PlazaContracts>,
    tx: Arc<TransactionManager>,
    policy: RetryPolicy,
    pause: DelayRange,
}

impl OperationSequencer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: Arc<PlazaContracts>,
        tx: Arc<TransactionManager>,
        policy: RetryPolicy,
        pause: DelayRange,
    ) -> Self {
        Self {
            chain,
            contracts,
            tx,
            policy,
            pause,
        }
    }

    /// Runs every operation in order. A failed operation never stops the
    /// ones after it.
    /// `tag` names the wallet in every log line.
    pub async fn run(
        &self,
        tag: &str,
        wallet: &LocalWallet,
        specs: &[OperationSpec],
    ) -> Vec<OperationOutcome> {
        let mut outcomes = Vec::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            let outcome = self.run_one(tag, wallet, *spec).await;
            let succeeded = outcome.succeeded();
            outcomes.push(outcome);

            if succeeded && i + 1 < specs.len() {
                let pause = self.pause.sample();
                info!("{} 💤 Pausing {:.1}s before next operation", tag, pause.as_secs_f64());
                tokio::time::sleep(pause).await;
            }
        }

        outcomes
    }

    async fn run_one(
        &self,
        tag: &str,
        wallet: &LocalWallet,
        spec: OperationSpec,
    ) -> OperationOutcome {
        let mut retry = self.policy.start();

        while let Some(attempt) = retry.begin() {
            info!("{} 🔄 {} (attempt {}/{})", tag, spec, attempt, retry.max_attempts());
            match self.attempt(wallet, spec).await {
                Ok(status) => {
                    return OperationOutcome {
                        spec,
                        status,
                        attempts: attempt,
                    }
                }
                Err(e) => match retry.backoff() {
                    Some(delay) => {
                        warn!(
                            "{} {} failed (attempt {}/{}): {:#}. Retrying in {:.1}s",
                            tag,
                            spec,
                            attempt,
                            retry.max_attempts(),
                            e,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => warn!(
                        "{} ❌ {} failed after {} attempts: {:#}",
                        tag, spec, attempt, e
                    ),
                },
            }
        }

        OperationOutcome {
            spec,
            status: OperationStatus::Failed,
            attempts: retry.attempt(),
        }
    }

    async fn attempt(&self, wallet: &LocalWallet, spec: OperationSpec) -> Result<OperationStatus> {
        let call = match self.prepare(wallet.address(), spec).await? {
            Some(call) => call,
            None => return Ok(OperationStatus::Skipped),
        };

        let result = self.tx.submit(&call, wallet).await;
        if result.is_confirmed() {
            Ok(OperationStatus::Confirmed)
        } else {
            Err(anyhow!("{}", result))
        }
    }

    /// `None` when there is nothing to do for this operation.
    async fn prepare(&self, owner: Address, spec: OperationSpec) -> Result<Option<ContractCall>> {
        match spec.kind {
            OperationKind::Create => {
                let amount = random_create_amount();
                info!("Depositing {} wei for {}", amount, spec.token);
                Ok(Some(self.contracts.create_call(spec.token, amount)?))
            }
            OperationKind::Redeem => {
                let token = self
                    .contracts
                    .derivative_token(self.chain.as_ref(), spec.token)
                    .await?;
                let balance = self
                    .contracts
                    .balance_of(self.chain.as_ref(), token, owner)
                    .await?;

                if balance.is_zero() {
                    info!("No {} balance to redeem, skipping", spec.token);
                    return Ok(None);
                }

                let amount = balance / 2;
                info!("Redeeming {} of {} {}", amount, balance, spec.token);
                Ok(Some(self.contracts.redeem_call(spec.token, amount)?))
            }
        }
    }
}

pub fn random_create_amount() -> U256 {
    U256::from(rand::thread_rng().gen_range(CREATE_MIN_WEI..=CREATE_MAX_WEI))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timings;
    use crate::testing::{
        wallet, MockChain, ReceiptPlan, BOND_TOKEN, COLLATERAL, KEY_A, LEV_TOKEN, POOL,
    };
    use core_logic::GasConfig;

    fn sequencer(chain: Arc<MockChain>) -> (OperationSequencer, Arc<PlazaContracts>) {
        let timings = Timings::default();
        let contracts = Arc::new(PlazaContracts::new(POOL, COLLATERAL).unwrap());
        let tx = Arc::new(TransactionManager::new(
            chain.clone(),
            GasConfig::default(),
            timings.receipt_poll(),
            timings.receipt_timeout(),
        ));
        let sequencer = OperationSequencer::new(
            chain,
            contracts.clone(),
            tx,
            timings.operation_policy(),
            timings.operation_pause,
        );
        (sequencer, contracts)
    }

    #[test]
    fn test_create_amount_window() {
        for _ in 0..200 {
            let amount = random_create_amount();
            assert!(amount >= U256::from(CREATE_MIN_WEI) && amount <= U256::from(CREATE_MAX_WEI));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_does_not_stop_sequence() {
        // create bond reverts three times, everything else lands
        let chain = Arc::new(
            MockChain::new()
                .with_receipts(vec![
                    ReceiptPlan::Reverted,
                    ReceiptPlan::Reverted,
                    ReceiptPlan::Reverted,
                ])
                .with_token_balance(BOND_TOKEN, U256::from(100))
                .with_token_balance(LEV_TOKEN, U256::from(40)),
        );
        let (sequencer, _) = sequencer(chain.clone());

        let outcomes = sequencer
            .run("[W:001/001]", &wallet(KEY_A), &OperationSpec::CANONICAL)
            .await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].status, OperationStatus::Failed);
        assert_eq!(outcomes[0].attempts, 3);
        assert!(outcomes[1..].iter().all(|o| o.status == OperationStatus::Confirmed));
        assert_eq!(chain.sends(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_balance_redeem_is_skipped_without_submitting() {
        let chain = Arc::new(MockChain::new());
        let (sequencer, _) = sequencer(chain.clone());
        let redeem_only = [OperationSpec::new(OperationKind::Redeem, TokenType::Leverage)];

        let outcomes = sequencer.run("[W:001/001]", &wallet(KEY_A), &redeem_only).await;

        assert_eq!(outcomes[0].status, OperationStatus::Skipped);
        assert!(outcomes[0].succeeded());
        assert_eq!(chain.count("lToken"), 1);
        assert_eq!(chain.count("estimate_gas"), 0);
        assert_eq!(chain.sends(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_uses_half_of_balance() {
        let chain = Arc::new(MockChain::new().with_token_balance(BOND_TOKEN, U256::from(101)));
        let (sequencer, contracts) = sequencer(chain.clone());
        let redeem_bond = [OperationSpec::new(OperationKind::Redeem, TokenType::Bond)];

        let outcomes = sequencer.run("[W:001/001]", &wallet(KEY_A), &redeem_bond).await;

        assert_eq!(outcomes[0].status, OperationStatus::Confirmed);
        let expected = contracts
            .redeem_call(TokenType::Bond, U256::from(50))
            .unwrap();
        assert_eq!(chain.estimated(), vec![(Some(POOL), expected.data)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_wait_between_retries() {
        let chain = Arc::new(MockChain::new().with_estimate_failures(3));
        let (sequencer, _) = sequencer(chain.clone());
        let create_bond = [OperationSpec::new(OperationKind::Create, TokenType::Bond)];

        let start = tokio::time::Instant::now();
        let outcomes = sequencer.run("[W:001/001]", &wallet(KEY_A), &create_bond).await;

        assert_eq!(outcomes[0].status, OperationStatus::Failed);
        assert_eq!(chain.count("estimate_gas"), 3);
        // two pauses of 10-20s, none after the last attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(20));
        assert!(elapsed <= std::time::Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_reads_token_address_each_attempt() {
        let chain = Arc::new(
            MockChain::new()
                .with_token_balance(BOND_TOKEN, U256::from(10))
                .with_receipts(vec![ReceiptPlan::SubmitError]),
        );
        let (sequencer, _) = sequencer(chain.clone());
        let redeem_bond = [OperationSpec::new(OperationKind::Redeem, TokenType::Bond)];

        let outcomes = sequencer.run("[W:001/001]", &wallet(KEY_A), &redeem_bond).await;

        assert_eq!(outcomes[0].status, OperationStatus::Confirmed);
        assert_eq!(outcomes[0].attempts, 2);
        assert_eq!(chain.count("bondToken"), 2);
        assert_eq!(chain.count("balanceOf"), 2);
    }
}
