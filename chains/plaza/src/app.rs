use crate::chain::{ChainClient, RpcChain};
use crate::config::Settings;
use crate::contracts::PlazaContracts;
use crate::faucet::identity::BrowserIdentities;
use crate::faucet::transport::HttpFaucetTransport;
use crate::faucet::FaucetClient;
use crate::gas_gate::GasGate;
use crate::operations::{OperationSequencer, OperationSpec};
use crate::processor::{ProcessorSettings, WalletProcessor};
use crate::scheduler::CycleScheduler;
use crate::tx_manager::TransactionManager;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Wires every component from validated settings.
pub async fn build_scheduler(settings: &Settings) -> Result<CycleScheduler> {
    let chain: Arc<dyn ChainClient> = Arc::new(RpcChain::new(&settings.rpc_url)?);
    check_chain_id(chain.as_ref(), settings.expected_chain_id).await;
    let contracts = Arc::new(PlazaContracts::new(settings.pool, settings.collateral)?);
    let timings = settings.timings.clone();

    let identities = BrowserIdentities::new(&settings.faucet.api_key, settings.proxies.clone())?;
    if identities.proxy_count() > 0 {
        info!("Loaded {} proxies for faucet rotation", identities.proxy_count());
    }

    let tx = Arc::new(TransactionManager::new(
        chain.clone(),
        settings.gas,
        timings.receipt_poll(),
        timings.receipt_timeout(),
    ));

    let faucet = FaucetClient::new(
        chain.clone(),
        contracts.clone(),
        Arc::new(HttpFaucetTransport::new(
            settings.faucet.queue_url.clone(),
            settings.faucet.origin_url.clone(),
        )),
        Arc::new(identities),
        settings.faucet.queue_url.clone(),
        settings.faucet_min_balance,
        timings.clone(),
    );

    let sequencer = OperationSequencer::new(
        chain.clone(),
        contracts.clone(),
        tx.clone(),
        timings.operation_policy(),
        timings.operation_pause,
    );

    let processor = WalletProcessor::new(
        chain.clone(),
        contracts,
        GasGate::new(chain, settings.gas),
        faucet,
        tx,
        sequencer,
        ProcessorSettings {
            min_gas_balance: settings.min_gas_balance,
            approval_threshold: settings.approval_threshold,
            policy: timings.wallet_policy(),
            faucet_retry: timings.faucet_retry,
            operations: OperationSpec::CANONICAL.to_vec(),
        },
    );

    Ok(CycleScheduler::new(
        Arc::new(processor),
        settings.key_file.clone(),
        timings,
        settings.identity.clone(),
    ))
}

/// Warns when the node is not the chain the config was written for.
pub async fn check_chain_id(chain: &dyn ChainClient, expected: u64) {
    match chain.chain_id().await {
        Ok(id) if id == expected => info!("Connected to chain {}", id),
        Ok(id) => warn!("Node reports chain {}, config expects {}", id, expected),
        Err(e) => warn!("Could not read chain id: {:#}", e),
    }
}
