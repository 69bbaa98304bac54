//! Scripted chain and faucet doubles shared by the unit tests.

use crate::chain::ChainClient;
use crate::faucet::identity::{IdentityRotation, RequestIdentity};
use crate::faucet::transport::FaucetTransport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use reqwest::header::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::subscriber::DefaultGuard;

pub const KEY_A: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_B: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const POOL: Address = H160([0x11; 20]);
pub const COLLATERAL: Address = H160([0x22; 20]);
pub const BOND_TOKEN: Address = H160([0xb0; 20]);
pub const LEV_TOKEN: Address = H160([0x1e; 20]);
pub const CHAIN_ID: u64 = 84532;

pub fn wallet(key: &str) -> LocalWallet {
    key.parse::<LocalWallet>().unwrap()
}

pub fn ether(milli: u64) -> U256 {
    U256::from(milli) * U256::exp10(15)
}

pub fn gwei(n: f64) -> U256 {
    U256::from(core_logic::gwei_to_wei(n))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptPlan {
    Success,
    Reverted,
    /// Never mined.
    Pending,
    /// Node rejects the raw transaction.
    SubmitError,
}

#[derive(Default)]
struct State {
    native_balance: U256,
    native_balance_failures: usize,
    gas_price: Option<U256>,
    allowance: U256,
    token_balances: HashMap<Address, U256>,
    balance_script: HashMap<Address, VecDeque<Option<U256>>>,
    receipt_plans: VecDeque<ReceiptPlan>,
    mined: HashMap<H256, ReceiptPlan>,
    estimate_failures: usize,
    estimated: Vec<(Option<Address>, Bytes)>,
    log: Vec<String>,
    sends: usize,
    receipt_polls: usize,
}

pub struct MockChain {
    state: Mutex<State>,
}

impl MockChain {
    pub fn new() -> Self {
        let state = State {
            native_balance: ether(100),
            gas_price: Some(gwei(0.5)),
            allowance: U256::MAX,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_native_balance(self, balance: U256) -> Self {
        self.state.lock().unwrap().native_balance = balance;
        self
    }

    /// The next `count` `eth_getBalance` reads fail.
    pub fn with_native_balance_failures(self, count: usize) -> Self {
        self.state.lock().unwrap().native_balance_failures = count;
        self
    }

    /// `None` makes `eth_gasPrice` fail.
    pub fn with_gas_price(self, price: Option<U256>) -> Self {
        self.state.lock().unwrap().gas_price = price;
        self
    }

    pub fn with_allowance(self, allowance: U256) -> Self {
        self.state.lock().unwrap().allowance = allowance;
        self
    }

    pub fn with_token_balance(self, token: Address, balance: U256) -> Self {
        self.state.lock().unwrap().token_balances.insert(token, balance);
        self
    }

    /// Successive `balanceOf` answers for `token`; `None` is a read error.
    /// Falls back to the fixed balance once drained.
    pub fn with_balance_script(self, token: Address, script: Vec<Option<U256>>) -> Self {
        self.state
            .lock()
            .unwrap()
            .balance_script
            .insert(token, script.into());
        self
    }

    /// Fate of each submitted transaction, in order. Unscripted ones succeed.
    pub fn with_receipts(self, plans: Vec<ReceiptPlan>) -> Self {
        self.state.lock().unwrap().receipt_plans = plans.into();
        self
    }

    pub fn with_estimate_failures(self, count: usize) -> Self {
        self.state.lock().unwrap().estimate_failures = count;
        self
    }

    /// Every RPC method invoked, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    /// Calldata of every transaction that reached gas estimation.
    pub fn estimated(&self) -> Vec<(Option<Address>, Bytes)> {
        self.state.lock().unwrap().estimated.clone()
    }

    pub fn sends(&self) -> usize {
        self.state.lock().unwrap().sends
    }

    pub fn receipt_polls(&self) -> usize {
        self.state.lock().unwrap().receipt_polls
    }

    fn record(&self, method: &str) {
        self.state.lock().unwrap().log.push(method.to_string());
    }
}

fn selector(signature: &str) -> [u8; 4] {
    ethers::utils::id(signature)
}

fn word(token: Token) -> Bytes {
    Bytes::from(ethers::abi::encode(&[token]))
}

#[async_trait]
impl ChainClient for MockChain {
    async fn native_balance(&self, _address: Address) -> Result<U256> {
        self.record("native_balance");
        let mut state = self.state.lock().unwrap();
        if state.native_balance_failures > 0 {
            state.native_balance_failures -= 1;
            return Err(anyhow!("eth_getBalance timed out"));
        }
        Ok(state.native_balance)
    }

    async fn gas_price(&self) -> Result<U256> {
        self.record("gas_price");
        self.state
            .lock()
            .unwrap()
            .gas_price
            .ok_or_else(|| anyhow!("eth_gasPrice unavailable"))
    }

    async fn nonce(&self, _address: Address) -> Result<U256> {
        self.record("nonce");
        Ok(U256::from(self.state.lock().unwrap().sends))
    }

    async fn chain_id(&self) -> Result<u64> {
        self.record("chain_id");
        Ok(CHAIN_ID)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let sel: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| anyhow!("short calldata"))?;

        if sel == selector("bondToken()") {
            self.record("bondToken");
            return Ok(word(Token::Address(BOND_TOKEN)));
        }
        if sel == selector("lToken()") {
            self.record("lToken");
            return Ok(word(Token::Address(LEV_TOKEN)));
        }
        if sel == selector("allowance(address,address)") {
            self.record("allowance");
            return Ok(word(Token::Uint(self.state.lock().unwrap().allowance)));
        }
        if sel == selector("balanceOf(address)") {
            self.record("balanceOf");
            let mut state = self.state.lock().unwrap();
            let scripted = state.balance_script.get_mut(&to).and_then(|q| q.pop_front());
            return match scripted {
                Some(Some(balance)) => Ok(word(Token::Uint(balance))),
                Some(None) => Err(anyhow!("balanceOf read failed")),
                None => {
                    let balance = state.token_balances.get(&to).copied().unwrap_or_default();
                    Ok(word(Token::Uint(balance)))
                }
            };
        }
        Err(anyhow!("unexpected eth_call to {:?}", to))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        self.record("estimate_gas");
        let mut state = self.state.lock().unwrap();
        state.estimated.push((
            tx.to_addr().copied(),
            tx.data().cloned().unwrap_or_default(),
        ));
        if state.estimate_failures > 0 {
            state.estimate_failures -= 1;
            return Err(anyhow!("execution reverted"));
        }
        Ok(U256::from(100_000u64))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        self.record("send_raw_transaction");
        let mut state = self.state.lock().unwrap();
        let plan = state.receipt_plans.pop_front().unwrap_or(ReceiptPlan::Success);
        if plan == ReceiptPlan::SubmitError {
            return Err(anyhow!("nonce too low"));
        }
        state.sends += 1;
        let hash = H256::from(ethers::utils::keccak256(&raw));
        state.mined.insert(hash, plan);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        self.record("transaction_receipt");
        let mut state = self.state.lock().unwrap();
        state.receipt_polls += 1;
        let status = match state.mined.get(&hash) {
            Some(ReceiptPlan::Success) => 1u64,
            Some(ReceiptPlan::Reverted) => 0u64,
            _ => return Ok(None),
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::from(status)),
            ..Default::default()
        }))
    }
}

/// Faucet endpoint double. Unscripted claims answer 200.
pub struct FakeTransport {
    statuses: Mutex<VecDeque<Option<u16>>>,
    claims: Mutex<Vec<Instant>>,
    warm_ups: Mutex<usize>,
}

impl FakeTransport {
    /// `None` entries are transport errors.
    pub fn new(statuses: Vec<Option<u16>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            claims: Mutex::new(Vec::new()),
            warm_ups: Mutex::new(0),
        }
    }

    pub fn claims(&self) -> Vec<Instant> {
        self.claims.lock().unwrap().clone()
    }

    pub fn warm_ups(&self) -> usize {
        *self.warm_ups.lock().unwrap()
    }
}

#[async_trait]
impl FaucetTransport for FakeTransport {
    async fn warm_up(&self, _identity: &RequestIdentity) -> Result<()> {
        *self.warm_ups.lock().unwrap() += 1;
        Ok(())
    }

    async fn queue_claim(&self, _identity: &RequestIdentity, _address: Address) -> Result<u16> {
        self.claims.lock().unwrap().push(Instant::now());
        match self.statuses.lock().unwrap().pop_front() {
            Some(Some(status)) => Ok(status),
            Some(None) => Err(anyhow!("connection reset")),
            None => Ok(200),
        }
    }
}

pub struct FixedIdentity;

impl IdentityRotation for FixedIdentity {
    fn next_identity(&self) -> RequestIdentity {
        RequestIdentity {
            headers: HeaderMap::new(),
            proxy: None,
        }
    }
}

/// Collects WARN and ERROR lines emitted on the current thread while the
/// returned guard is alive.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
