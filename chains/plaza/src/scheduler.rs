use crate::config::{RunIdentity, Timings};
use crate::processor::WalletContext;
use chrono::Local;
use core_logic::{Task, WalletError, WalletManager, WorkerRunner};
use ethers::signers::{LocalWallet, Signer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Nothing to process. Never retried.
    #[error("No usable private keys in {path}")]
    NoWallets { path: String },

    #[error("Cycle aborted: {0:#}")]
    Cycle(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Walks the key file one wallet at a time, forever, with a fixed gap
/// between passes.
pub struct CycleScheduler {
    processor: Arc<dyn Task<WalletContext>>,
    key_file: PathBuf,
    timings: Timings,
    identity: RunIdentity,
}

impl CycleScheduler {
    pub fn new(
        processor: Arc<dyn Task<WalletContext>>,
        key_file: impl Into<PathBuf>,
        timings: Timings,
        identity: RunIdentity,
    ) -> Self {
        Self {
            processor,
            key_file: key_file.into(),
            timings,
            identity,
        }
    }

    /// Runs until `token` is cancelled or a fatal error occurs.
    pub async fn run(&self, token: CancellationToken) -> Result<(), SchedulerError> {
        match WorkerRunner::run_until_cancelled(token, self.run_forever()).await {
            Some(result) => result,
            None => Ok(()),
        }
    }

    async fn run_forever(&self) -> Result<(), SchedulerError> {
        let mut cycle = 0u64;
        loop {
            cycle += 1;
            match self.run_cycle().await {
                Ok(report) => {
                    let interval = self.timings.cycle_interval();
                    info!(
                        "🏁 Cycle #{} complete: {} succeeded, {} failed",
                        cycle, report.succeeded, report.failed
                    );
                    if let Ok(gap) = chrono::Duration::from_std(interval) {
                        info!(
                            "⏰ Next cycle at {}",
                            (Local::now() + gap).format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                    tokio::time::sleep(interval).await;
                }
                Err(e @ SchedulerError::NoWallets { .. }) => return Err(e),
                Err(e) => {
                    let pause = self.timings.cycle_error_pause();
                    error!("{}. Retrying in {}s", e, pause.as_secs());
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// One pass over every wallet in file order.
    pub async fn run_cycle(&self) -> Result<CycleReport, SchedulerError> {
        info!(
            "🚀 Cycle start | operator: {} | version: {}",
            self.identity.operator, self.identity.version
        );

        let keys = match WalletManager::load(&self.key_file) {
            Ok(manager) => manager.into_keys(),
            Err(e) => {
                return Err(match e.downcast_ref::<WalletError>() {
                    Some(WalletError::NoValidKeys { path }) => {
                        SchedulerError::NoWallets { path: path.clone() }
                    }
                    _ => SchedulerError::Cycle(e),
                })
            }
        };

        let total = keys.len();
        let mut report = CycleReport::default();
        info!("Loaded {} wallets", total);

        for (i, key) in keys.into_iter().enumerate() {
            let index = i + 1;
            let parsed = key.expose().parse::<LocalWallet>();
            drop(key);

            let success = match parsed {
                Ok(wallet) => self.process_wallet(wallet, index, total).await,
                Err(e) => {
                    error!("[W:{:03}/{:03}] Unusable key: {}", index, total, e);
                    false
                }
            };

            if success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }

            if index < total {
                let delay = self.inter_wallet_delay(success);
                info!("💤 Next wallet in {:.0}s", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
        }

        Ok(report)
    }

    async fn process_wallet(&self, wallet: LocalWallet, index: usize, total: usize) -> bool {
        let address = wallet.address();
        let ctx = WalletContext {
            wallet,
            index,
            total,
        };

        match self.processor.run(ctx).await {
            Ok(result) => result.success,
            Err(e) => {
                warn!(
                    "[W:{:03}/{:03}] {:?} {} error: {:#}",
                    index,
                    total,
                    address,
                    self.processor.name(),
                    e
                );
                false
            }
        }
    }

    fn inter_wallet_delay(&self, success: bool) -> Duration {
        if success {
            self.timings.wallet_success_delay.sample()
        } else {
            self.timings.wallet_failure_delay.sample()
        }
    }
}
