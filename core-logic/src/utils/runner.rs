use std::future::Future;
use std::time::Instant;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Returns a token that is cancelled on the first Ctrl+C.
    pub fn shutdown_on_ctrl_c() -> CancellationToken {
        let token = CancellationToken::new();
        let cloned_token = token.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("🛑 Received Ctrl+C. Initiating graceful shutdown...");
                    cloned_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        token
    }

    /// Drives `job` until it finishes or `token` is cancelled.
    ///
    /// On cancellation the job future is dropped at whatever suspension point
    /// it was parked on; nothing is resubmitted. Returns `None` in that case.
    pub async fn run_until_cancelled<F, T>(token: CancellationToken, job: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let start_time = Instant::now();

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = job => Some(result),
        };

        info!(
            "🛑 Shutdown Complete. Uptime: {:.1}s",
            start_time.elapsed().as_secs_f64()
        );
        outcome
    }
}
