use anyhow::Result;
use clap::Parser;
use core_logic::{setup_logger, WalletManager, WorkerRunner};
use dotenv::dotenv;
use plaza_project::app::build_scheduler;
use plaza_project::PlazaConfig;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/plaza/config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Keep guard alive for file logging
    let _log_guard = setup_logger("plaza");
    dotenv().ok();

    let args = Args::parse();
    info!("Loading config from: {}", args.config);

    let settings = match PlazaConfig::load(&args.config).and_then(|c| c.resolve()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Ok(());
        }
    };

    info!(
        "🤖 Plaza bot | operator: {} | version: {}",
        settings.identity.operator, settings.identity.version
    );

    // Fail fast on an unusable key file; the scheduler re-reads it every cycle.
    match WalletManager::load(&settings.key_file) {
        Ok(manager) => info!("Found {} wallets in {}", manager.count(), settings.key_file.display()),
        Err(e) => {
            error!("{:#}", e);
            return Ok(());
        }
    }

    let scheduler = match build_scheduler(&settings).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start: {:#}", e);
            return Ok(());
        }
    };

    let token = WorkerRunner::shutdown_on_ctrl_c();
    if let Err(e) = scheduler.run(token).await {
        error!("Fatal: {}", e);
    }

    info!("Bot shutdown complete");
    Ok(())
}
