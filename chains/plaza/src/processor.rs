//! Per-wallet pipeline: balance check, gas gate, faucet, approval, operations.

use crate::chain::ChainClient;
use crate::config::DelayRange;
use crate::contracts::PlazaContracts;
use crate::faucet::FaucetClient;
use crate::gas_gate::GasGate;
use crate::operations::{OperationOutcome, OperationSequencer, OperationSpec};
use crate::tx_manager::TransactionManager;
use anyhow::Result;
use async_trait::async_trait;
use core_logic::{RetryPolicy, Task, TaskResult, RESULT_TARGET};
use ethers::prelude::*;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckBalance,
    CheckGas,
    ClaimFaucet,
    EnsureApproval,
    RunOperations,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CheckBalance => "check-balance",
            Stage::CheckGas => "check-gas",
            Stage::ClaimFaucet => "claim-faucet",
            Stage::EnsureApproval => "ensure-approval",
            Stage::RunOperations => "run-operations",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StageFailure {
    #[error("Insufficient ETH for gas: have {balance} wei, need {required} wei")]
    InsufficientFunds { balance: U256, required: U256 },

    #[error("Gas price above ceiling or unreadable")]
    GasTooHigh,

    #[error("Faucet claim not verified")]
    FaucetFailed,

    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    #[error("{stage} failed: {source:#}")]
    Rpc {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl StageFailure {
    pub fn stage(&self) -> Stage {
        match self {
            StageFailure::InsufficientFunds { .. } => Stage::CheckBalance,
            StageFailure::GasTooHigh => Stage::CheckGas,
            StageFailure::FaucetFailed => Stage::ClaimFaucet,
            StageFailure::ApprovalFailed(_) => Stage::EnsureApproval,
            StageFailure::Rpc { stage, .. } => *stage,
        }
    }

    /// Terminal failures end the wallet's pass without further attempts.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageFailure::InsufficientFunds { .. } | StageFailure::ApprovalFailed(_)
        )
    }
}

/// One wallet for one pass. Dropping it drops the signing key.
pub struct WalletContext {
    pub wallet: LocalWallet,
    pub index: usize,
    pub total: usize,
}

impl WalletContext {
    pub fn tag(&self) -> String {
        format!("[W:{:03}/{:03}]", self.index, self.total)
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorSettings {
    pub min_gas_balance: U256,
    pub approval_threshold: U256,
    pub policy: RetryPolicy,
    pub faucet_retry: DelayRange,
    pub operations: Vec<OperationSpec>,
}

pub struct WalletProcessor {
    chain: Arc<dyn ChainClient>,
    contracts: Arc<PlazaContracts>,
    gas_gate: GasGate,
    faucet: FaucetClient,
    tx: Arc<TransactionManager>,
    sequencer: OperationSequencer,
    settings: ProcessorSettings,
}

impl WalletProcessor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: Arc<PlazaContracts>,
        gas_gate: GasGate,
        faucet: FaucetClient,
        tx: Arc<TransactionManager>,
        sequencer: OperationSequencer,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            chain,
            contracts,
            gas_gate,
            faucet,
            tx,
            sequencer,
            settings,
        }
    }

    /// Runs the pipeline with the wallet retry budget. `true` when every stage
    /// before the operations succeeded; operation failures are logged only.
    pub async fn process(&self, ctx: &WalletContext) -> bool {
        let tag = ctx.tag();
        let address = ctx.address();
        let mut retry = self.settings.policy.start();

        info!("{} 👛 Processing {:?}", tag, address);

        while let Some(attempt) = retry.begin() {
            match self.run_pipeline(ctx).await {
                Ok(outcomes) => {
                    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
                    if failed > 0 {
                        warn!("{} {} of {} operations failed", tag, failed, outcomes.len());
                    }
                    info!(
                        target: RESULT_TARGET,
                        "{} {:?} SUCCESS (attempt {}/{})",
                        tag,
                        address,
                        attempt,
                        retry.max_attempts()
                    );
                    return true;
                }
                Err(failure) if failure.is_terminal() => {
                    error!(
                        target: RESULT_TARGET,
                        "{} {:?} FAILED at {} (attempt {}/{}): {}",
                        tag,
                        address,
                        failure.stage(),
                        attempt,
                        retry.max_attempts(),
                        failure
                    );
                    return false;
                }
                Err(failure) => {
                    let delay = match failure {
                        StageFailure::FaucetFailed => retry
                            .has_remaining()
                            .then(|| self.settings.faucet_retry.sample()),
                        _ => retry.backoff(),
                    };
                    match delay {
                        Some(delay) => {
                            warn!(
                                "{} {} failed (attempt {}/{}): {}. Retrying in {:.0}s",
                                tag,
                                failure.stage(),
                                attempt,
                                retry.max_attempts(),
                                failure,
                                delay.as_secs_f64()
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => warn!(
                            "{} {} failed on final attempt {}: {}",
                            tag,
                            failure.stage(),
                            attempt,
                            failure
                        ),
                    }
                }
            }
        }

        error!(
            target: RESULT_TARGET,
            "{} {:?} FAILED after {} attempts",
            tag,
            address,
            retry.attempt()
        );
        false
    }

    async fn run_pipeline(
        &self,
        ctx: &WalletContext,
    ) -> std::result::Result<Vec<OperationOutcome>, StageFailure> {
        let address = ctx.address();

        let balance = self
            .chain
            .native_balance(address)
            .await
            .map_err(|source| StageFailure::Rpc {
                stage: Stage::CheckBalance,
                source,
            })?;
        if balance < self.settings.min_gas_balance {
            return Err(StageFailure::InsufficientFunds {
                balance,
                required: self.settings.min_gas_balance,
            });
        }

        if !self.gas_gate.accept().await {
            return Err(StageFailure::GasTooHigh);
        }

        let tag = ctx.tag();
        if !self.faucet.claim_and_verify(&tag, address).await {
            return Err(StageFailure::FaucetFailed);
        }

        self.ensure_approval(&tag, &ctx.wallet)
            .await
            .map_err(|e| StageFailure::ApprovalFailed(format!("{:#}", e)))?;

        Ok(self
            .sequencer
            .run(&tag, &ctx.wallet, &self.settings.operations)
            .await)
    }

    async fn ensure_approval(&self, tag: &str, wallet: &LocalWallet) -> Result<()> {
        let allowance = self
            .contracts
            .pool_allowance(self.chain.as_ref(), wallet.address())
            .await?;

        if allowance >= self.settings.approval_threshold {
            return Ok(());
        }

        info!("{} Allowance {} below threshold, approving pool", tag, allowance);
        let call = self.contracts.approve_call()?;
        let result = self.tx.submit(&call, wallet).await;
        if result.is_confirmed() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("{}", result))
        }
    }
}

#[async_trait]
impl Task<WalletContext> for WalletProcessor {
    fn name(&self) -> &str {
        "plaza_wallet"
    }

    async fn run(&self, ctx: WalletContext) -> Result<TaskResult> {
        let tag = ctx.tag();
        if self.process(&ctx).await {
            Ok(TaskResult::success(format!("{} done", tag)))
        } else {
            Ok(TaskResult::failed(format!("{} failed", tag)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timings;
    use crate::testing::{
        ether, gwei, wallet, FakeTransport, FixedIdentity, LogCapture, MockChain, ReceiptPlan,
        COLLATERAL, KEY_A, POOL,
    };
    use core_logic::GasConfig;
    use std::time::Duration;
    use tokio::time::Instant;

    fn processor(chain: Arc<MockChain>, transport: Arc<FakeTransport>) -> WalletProcessor {
        let timings = Timings::default();
        let contracts = Arc::new(PlazaContracts::new(POOL, COLLATERAL).unwrap());
        let tx = Arc::new(TransactionManager::new(
            chain.clone(),
            GasConfig::default(),
            timings.receipt_poll(),
            timings.receipt_timeout(),
        ));
        let faucet = FaucetClient::new(
            chain.clone(),
            contracts.clone(),
            transport,
            Arc::new(FixedIdentity),
            "faucet",
            ether(8),
            timings.clone(),
        );
        let sequencer = OperationSequencer::new(
            chain.clone(),
            contracts.clone(),
            tx.clone(),
            timings.operation_policy(),
            timings.operation_pause,
        );
        WalletProcessor::new(
            chain.clone(),
            contracts,
            GasGate::new(chain, GasConfig::default()),
            faucet,
            tx,
            sequencer,
            ProcessorSettings {
                min_gas_balance: ether(2),
                approval_threshold: ether(1000),
                policy: timings.wallet_policy(),
                faucet_retry: timings.faucet_retry,
                operations: OperationSpec::CANONICAL.to_vec(),
            },
        )
    }

    fn ctx() -> WalletContext {
        WalletContext {
            wallet: wallet(KEY_A),
            index: 2,
            total: 5,
        }
    }

    #[test]
    fn test_tag_format() {
        assert_eq!(ctx().tag(), "[W:002/005]");
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_balance_stops_after_single_read() {
        let chain = Arc::new(MockChain::new().with_native_balance(ether(1)));
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(!ok);
        assert_eq!(chain.log(), vec!["native_balance".to_string()]);
        assert!(transport.claims().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pipeline_succeeds() {
        let chain = Arc::new(
            MockChain::new()
                .with_token_balance(COLLATERAL, ether(10))
                .with_allowance(U256::zero()),
        );
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(ok);
        assert_eq!(transport.claims().len(), 1);
        // approve + two creates; both redeems skip on zero balances
        assert_eq!(chain.sends(), 3);
        assert_eq!(&chain.estimated()[0].1[..4], &ethers::utils::id("approve(address,uint256)")[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sufficient_allowance_skips_approval() {
        let chain = Arc::new(MockChain::new().with_token_balance(COLLATERAL, ether(10)));
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        assert!(processor(chain.clone(), transport).process(&ctx()).await);
        assert_eq!(chain.count("allowance"), 1);
        assert_eq!(chain.sends(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_rejection_retries_whole_pipeline() {
        let chain = Arc::new(MockChain::new().with_gas_price(Some(gwei(2.0))));
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        let start = Instant::now();
        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(!ok);
        assert_eq!(chain.count("native_balance"), 3);
        assert_eq!(chain.count("gas_price"), 3);
        assert!(transport.claims().is_empty());
        assert_eq!(chain.sends(), 0);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60) && elapsed <= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_failure_is_terminal() {
        let chain = Arc::new(
            MockChain::new()
                .with_token_balance(COLLATERAL, ether(10))
                .with_allowance(U256::zero())
                .with_receipts(vec![ReceiptPlan::Reverted]),
        );
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(!ok);
        assert_eq!(transport.claims().len(), 1);
        assert_eq!(chain.sends(), 1);
        assert_eq!(chain.count("native_balance"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_faucet_failure_waits_before_retrying() {
        // three 403s exhaust the first faucet run, the next run succeeds
        let chain = Arc::new(MockChain::new().with_token_balance(COLLATERAL, ether(10)));
        let transport = Arc::new(FakeTransport::new(vec![Some(403), Some(403), Some(403)]));

        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(ok);
        let claims = transport.claims();
        assert_eq!(claims.len(), 4);
        // 60s cooldown + 60-180s faucet retry + pacing
        assert!(claims[3] - claims[2] >= Duration::from_secs(120));
        assert_eq!(chain.count("native_balance"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_read_error_consumes_one_attempt() {
        let chain = Arc::new(
            MockChain::new()
                .with_native_balance_failures(1)
                .with_token_balance(COLLATERAL, ether(10)),
        );
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        let start = Instant::now();
        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(ok);
        assert_eq!(chain.count("native_balance"), 2);
        assert_eq!(transport.claims().len(), 1);
        // the 30-60s wallet backoff runs before the second pass reaches the faucet
        let first_claim = transport.claims()[0] - start;
        assert!(first_claim >= Duration::from_secs(30));
        assert!(first_claim <= Duration::from_secs(60 + 17));
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_read_errors_exhaust_budget() {
        let chain = Arc::new(MockChain::new().with_native_balance_failures(5));
        let transport = Arc::new(FakeTransport::new(Vec::new()));

        let ok = processor(chain.clone(), transport.clone()).process(&ctx()).await;

        assert!(!ok);
        assert_eq!(chain.count("native_balance"), 3);
        assert!(transport.claims().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_lines_name_the_wallet() {
        let capture = LogCapture::default();
        let _guard = capture.install();

        // one 403, then create bond reverts on every attempt
        let chain = Arc::new(
            MockChain::new()
                .with_token_balance(COLLATERAL, ether(10))
                .with_receipts(vec![
                    ReceiptPlan::Reverted,
                    ReceiptPlan::Reverted,
                    ReceiptPlan::Reverted,
                ]),
        );
        let transport = Arc::new(FakeTransport::new(vec![Some(403)]));
        let context = ctx();
        let address = format!("{:?}", context.address());

        assert!(processor(chain, transport).process(&context).await);

        let lines = capture.lines();
        assert!(lines.iter().any(|l| l.contains("403")));
        assert!(lines.iter().any(|l| l.contains("reverted")));
        assert!(lines.iter().any(|l| l.contains("failed after 3 attempts")));
        for line in &lines {
            assert!(
                line.contains("[W:002/005]") || line.contains(&address),
                "line does not name the wallet: {}",
                line
            );
        }
    }
}
