use anyhow::{Context, Result};
use config::{Config, Environment, File};
use core_logic::{
    random_between, Backoff, ConfigError, GasConfig, GasConfigToml, ProxyConfig, ProxyManager,
    RetryPolicy,
};
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RPC_URL: &str = "https://sepolia.base.org";
pub const DEFAULT_POOL_ADDRESS: &str = "0x47129e886b44B5b8815e6471FCD7b31515d83242";
pub const DEFAULT_COLLATERAL_TOKEN: &str = "0x13e5fb0b6534bb22cbc59fae339dbbe0dc906871";
pub const DEFAULT_FAUCET_URL: &str = "https://api.plaza.finance/faucet/queue";
pub const DEFAULT_FAUCET_ORIGIN: &str = "https://plaza.finance";
/// Public key shipped with the Plaza web app; used when none is configured.
pub const DEFAULT_API_KEY: &str = "bfc7b70e-66ad-4524-9bb6-733716c4da94";

#[derive(Debug, Deserialize, Clone)]
pub struct PlazaConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Expected chain; signing always uses the id reported by the node.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_pool_address")]
    pub pool_address: String,
    #[serde(default = "default_collateral_token")]
    pub collateral_token: String,
    #[serde(default = "default_faucet_url")]
    pub faucet_url: String,
    #[serde(default = "default_faucet_origin")]
    pub faucet_origin: String,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub proxy_file: Option<String>,
    #[serde(default = "default_key_file")]
    pub private_key_file: String,
    #[serde(default)]
    pub gas: GasConfigToml,
    #[serde(default = "default_min_gas_balance")]
    pub min_gas_balance_eth: f64,
    #[serde(default = "default_faucet_min_balance")]
    pub faucet_min_balance_eth: f64,
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold_eth: f64,
    #[serde(default)]
    pub identity: RunIdentity,
    #[serde(default)]
    pub timings: Timings,
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}
fn default_chain_id() -> u64 {
    84532
}
fn default_pool_address() -> String {
    DEFAULT_POOL_ADDRESS.to_string()
}
fn default_collateral_token() -> String {
    DEFAULT_COLLATERAL_TOKEN.to_string()
}
fn default_faucet_url() -> String {
    DEFAULT_FAUCET_URL.to_string()
}
fn default_faucet_origin() -> String {
    DEFAULT_FAUCET_ORIGIN.to_string()
}
fn default_key_file() -> String {
    core_logic::WalletManager::PV_FILE.to_string()
}
fn default_min_gas_balance() -> f64 {
    0.002
}
fn default_faucet_min_balance() -> f64 {
    0.008
}
fn default_approval_threshold() -> f64 {
    1.0
}

/// Who is running the bot and which build. Logged at startup and every cycle.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RunIdentity {
    pub operator: String,
    pub version: String,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self {
            operator: "plaza-bot".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Longest pause any delay window may ask for.
pub const MAX_DELAY_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Inclusive random window, in seconds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn secs(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs_f64(self.min_secs.max(0.0))
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs_f64(self.max_secs.max(self.min_secs).max(0.0))
    }

    pub fn sample(&self) -> Duration {
        random_between(self.min(), self.max())
    }

    pub fn as_backoff(&self) -> Backoff {
        Backoff::Uniform {
            min: self.min(),
            max: self.max(),
        }
    }

    fn validate(&self, field: &str) -> std::result::Result<(), ConfigError> {
        let in_range = |v: f64| v.is_finite() && (0.0..=MAX_DELAY_SECS).contains(&v);
        if !in_range(self.min_secs) || !in_range(self.max_secs) {
            return Err(ConfigError::InvalidValue {
                field: format!("timings.{}", field),
                reason: format!(
                    "bounds must be between 0 and {}s, got {}..{}",
                    MAX_DELAY_SECS, self.min_secs, self.max_secs
                ),
            });
        }
        Ok(())
    }
}

/// Every pause the bot takes. Defaults are the production cadence.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Timings {
    pub human_pre_delay: DelayRange,
    pub pre_claim_delay: DelayRange,
    pub rate_limit_cooldown_secs: u64,
    pub transport_error_cooldown_secs: u64,
    pub faucet_backoff_initial_secs: u64,
    pub faucet_backoff_max_secs: u64,
    pub verify_interval_secs: u64,
    pub verify_attempts: u32,
    pub verify_error_pause_secs: u64,
    pub receipt_poll_secs: u64,
    pub receipt_timeout_secs: u64,
    pub operation_retry: DelayRange,
    pub operation_pause: DelayRange,
    pub wallet_retry: DelayRange,
    pub faucet_retry: DelayRange,
    pub wallet_success_delay: DelayRange,
    pub wallet_failure_delay: DelayRange,
    pub cycle_interval_secs: u64,
    pub cycle_error_pause_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            human_pre_delay: DelayRange::secs(3.0, 7.0),
            pre_claim_delay: DelayRange::secs(5.0, 10.0),
            rate_limit_cooldown_secs: 60,
            transport_error_cooldown_secs: 30,
            faucet_backoff_initial_secs: 4,
            faucet_backoff_max_secs: 10,
            verify_interval_secs: 10,
            verify_attempts: 40,
            verify_error_pause_secs: 5,
            receipt_poll_secs: 5,
            receipt_timeout_secs: 300,
            operation_retry: DelayRange::secs(10.0, 20.0),
            operation_pause: DelayRange::secs(10.0, 20.0),
            wallet_retry: DelayRange::secs(30.0, 60.0),
            faucet_retry: DelayRange::secs(60.0, 180.0),
            wallet_success_delay: DelayRange::secs(60.0, 120.0),
            wallet_failure_delay: DelayRange::secs(180.0, 300.0),
            cycle_interval_secs: 6 * 60 * 60,
            cycle_error_pause_secs: 5 * 60,
        }
    }
}

impl Timings {
    pub fn wallet_policy(&self) -> RetryPolicy {
        RetryPolicy::wallet_pipeline().with_backoff(self.wallet_retry.as_backoff())
    }

    pub fn faucet_policy(&self) -> RetryPolicy {
        RetryPolicy::faucet_claim().with_backoff(Backoff::Exponential {
            initial: Duration::from_secs(self.faucet_backoff_initial_secs),
            max: Duration::from_secs(self.faucet_backoff_max_secs),
            multiplier: 2.0,
        })
    }

    pub fn operation_policy(&self) -> RetryPolicy {
        RetryPolicy::chain_operation().with_backoff(self.operation_retry.as_backoff())
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_secs(self.receipt_poll_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn cycle_error_pause(&self) -> Duration {
        Duration::from_secs(self.cycle_error_pause_secs)
    }

    /// Rejects delay windows that cannot become a `Duration`.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let ranges = [
            ("human_pre_delay", &self.human_pre_delay),
            ("pre_claim_delay", &self.pre_claim_delay),
            ("operation_retry", &self.operation_retry),
            ("operation_pause", &self.operation_pause),
            ("wallet_retry", &self.wallet_retry),
            ("faucet_retry", &self.faucet_retry),
            ("wallet_success_delay", &self.wallet_success_delay),
            ("wallet_failure_delay", &self.wallet_failure_delay),
        ];
        for (field, range) in ranges {
            range.validate(field)?;
        }
        Ok(())
    }
}

/// Faucet endpoint and credentials.
#[derive(Debug, Clone)]
pub struct FaucetSettings {
    pub queue_url: String,
    pub origin_url: String,
    pub api_key: String,
}

/// Validated, typed view of [`PlazaConfig`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_url: String,
    pub expected_chain_id: u64,
    pub pool: Address,
    pub collateral: Address,
    pub faucet: FaucetSettings,
    pub proxies: Vec<ProxyConfig>,
    pub key_file: PathBuf,
    pub gas: GasConfig,
    pub min_gas_balance: U256,
    pub faucet_min_balance: U256,
    pub approval_threshold: U256,
    pub identity: RunIdentity,
    pub timings: Timings,
}

impl PlazaConfig {
    /// Loads `path` (optional) layered with `PLAZA_*` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("PLAZA"))
            .build()?;

        settings.try_deserialize().map_err(|e| anyhow::anyhow!(e))
    }

    pub fn resolve(&self) -> Result<Settings> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "rpc_url".to_string(),
            }
            .into());
        }
        self.timings.validate()?;

        let mut proxies = Vec::new();
        match self.proxy.as_deref().map(ProxyConfig::parse) {
            Some(Some(proxy)) => proxies.push(proxy),
            Some(None) => {
                return Err(ConfigError::InvalidValue {
                    field: "proxy".to_string(),
                    reason: "expected URL or ip:port[:user:pass]".to_string(),
                }
                .into())
            }
            None => proxies.extend(ProxyManager::from_env("HTTP_PROXY")),
        }
        if let Some(path) = &self.proxy_file {
            proxies.extend(ProxyManager::load_proxies(path)?);
        }

        Ok(Settings {
            rpc_url: self.rpc_url.clone(),
            expected_chain_id: self.chain_id,
            pool: parse_address("pool_address", &self.pool_address)?,
            collateral: parse_address("collateral_token", &self.collateral_token)?,
            faucet: FaucetSettings {
                queue_url: self.faucet_url.clone(),
                origin_url: self.faucet_origin.clone(),
                api_key: self
                    .api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            },
            proxies,
            key_file: PathBuf::from(&self.private_key_file),
            gas: self.gas.clone().into(),
            min_gas_balance: eth_to_wei("min_gas_balance_eth", self.min_gas_balance_eth)?,
            faucet_min_balance: eth_to_wei("faucet_min_balance_eth", self.faucet_min_balance_eth)?,
            approval_threshold: eth_to_wei("approval_threshold_eth", self.approval_threshold_eth)?,
            identity: self.identity.clone(),
            timings: self.timings.clone(),
        })
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address> {
    raw.parse::<Address>().map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Decimal ether amount to wei.
pub fn eth_to_wei(field: &str, amount: f64) -> Result<U256> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} is not a valid ether amount", amount),
        }
        .into());
    }
    let wei = ethers::utils::parse_ether(amount.to_string())
        .with_context(|| format!("Failed to convert {} = {} to wei", field, amount))?;
    Ok(wei)
}
