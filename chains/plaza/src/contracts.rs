use crate::chain::ChainClient;
use crate::tx_manager::ContractCall;
use anyhow::{Context, Result};
use ethers::prelude::*;
use std::fmt;

const POOL_ABI: &str = r#"[
    {"type":"function","name":"bondToken","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"address"}]},
    {"type":"function","name":"lToken","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"address"}]},
    {"type":"function","name":"create","stateMutability":"nonpayable","inputs":[{"name":"tokenType","type":"uint8"},{"name":"depositAmount","type":"uint256"},{"name":"minAmount","type":"uint256"}],"outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"redeem","stateMutability":"nonpayable","inputs":[{"name":"tokenType","type":"uint8"},{"name":"depositAmount","type":"uint256"},{"name":"minAmount","type":"uint256"}],"outputs":[{"name":"","type":"uint256"}]}
]"#;

const ERC20_ABI: &str = r#"[
    {"type":"function","name":"balanceOf","stateMutability":"view","inputs":[{"name":"account","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"allowance","stateMutability":"view","inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"approve","stateMutability":"nonpayable","inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]}
]"#;

/// Pool derivative. The discriminant is the `tokenType` argument of
/// `create`/`redeem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    Bond = 0,
    Leverage = 1,
}

impl TokenType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Bond => write!(f, "bondETH"),
            TokenType::Leverage => write!(f, "levETH"),
        }
    }
}

/// Plaza pool + collateral token, with calldata builders and typed reads.
#[derive(Debug, Clone)]
pub struct PlazaContracts {
    pool: Address,
    collateral: Address,
    pool_abi: BaseContract,
    erc20_abi: BaseContract,
}

impl PlazaContracts {
    pub fn new(pool: Address, collateral: Address) -> Result<Self> {
        let pool_abi: abi::Abi = serde_json::from_str(POOL_ABI).context("Failed to parse pool ABI")?;
        let erc20_abi: abi::Abi =
            serde_json::from_str(ERC20_ABI).context("Failed to parse ERC20 ABI")?;

        Ok(Self {
            pool,
            collateral,
            pool_abi: BaseContract::from(pool_abi),
            erc20_abi: BaseContract::from(erc20_abi),
        })
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    pub fn collateral(&self) -> Address {
        self.collateral
    }

    pub fn create_call(&self, token: TokenType, amount: U256) -> Result<ContractCall> {
        let data = self
            .pool_abi
            .encode("create", (token.as_u8(), amount, U256::zero()))?;
        Ok(ContractCall::new(format!("create {}", token), self.pool, data))
    }

    pub fn redeem_call(&self, token: TokenType, amount: U256) -> Result<ContractCall> {
        let data = self
            .pool_abi
            .encode("redeem", (token.as_u8(), amount, U256::zero()))?;
        Ok(ContractCall::new(format!("redeem {}", token), self.pool, data))
    }

    /// Unlimited collateral approval for the pool.
    pub fn approve_call(&self) -> Result<ContractCall> {
        let data = self.erc20_abi.encode("approve", (self.pool, U256::MAX))?;
        Ok(ContractCall::new("approve wstETH", self.collateral, data))
    }

    /// Reads the pool's token address for `token`.
    pub async fn derivative_token(
        &self,
        chain: &dyn ChainClient,
        token: TokenType,
    ) -> Result<Address> {
        let method = match token {
            TokenType::Bond => "bondToken",
            TokenType::Leverage => "lToken",
        };
        let data = self.pool_abi.encode(method, ())?;
        let raw = chain
            .call(self.pool, data)
            .await
            .with_context(|| format!("Failed to read {}", method))?;
        let address: Address = self.pool_abi.decode_output(method, raw)?;
        Ok(address)
    }

    pub async fn balance_of(
        &self,
        chain: &dyn ChainClient,
        token: Address,
        owner: Address,
    ) -> Result<U256> {
        let data = self.erc20_abi.encode("balanceOf", owner)?;
        let raw = chain
            .call(token, data)
            .await
            .with_context(|| format!("Failed to read balance of {:?}", token))?;
        let balance: U256 = self.erc20_abi.decode_output("balanceOf", raw)?;
        Ok(balance)
    }

    pub async fn collateral_balance(&self, chain: &dyn ChainClient, owner: Address) -> Result<U256> {
        self.balance_of(chain, self.collateral, owner).await
    }

    /// Collateral allowance granted by `owner` to the pool.
    pub async fn pool_allowance(&self, chain: &dyn ChainClient, owner: Address) -> Result<U256> {
        let data = self.erc20_abi.encode("allowance", (owner, self.pool))?;
        let raw = chain
            .call(self.collateral, data)
            .await
            .context("Failed to read allowance")?;
        let allowance: U256 = self.erc20_abi.decode_output("allowance", raw)?;
        Ok(allowance)
    }
}
