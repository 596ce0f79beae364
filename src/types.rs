use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Custom error types for the DEX client
#[derive(Error, Debug)]
pub enum DexError {
    #[error("Wrong network: wallet is on chain {actual}, expected chain {expected}")]
    NetworkMismatch { actual: u64, expected: u64 },

    #[error("No wallet connected; this action requires a signer")]
    WalletNotConnected,

    #[error("Signature request rejected by the wallet")]
    UserRejected,

    #[error("Insufficient allowance: spender {spender:?} is approved for {allowance} but {required} is required")]
    InsufficientAllowance {
        spender: Address,
        allowance: U256,
        required: U256,
    },

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Invalid swap path: {0}")]
    InvalidPath(String),

    #[error("Quote is stale: local estimate {local} diverges from on-chain quote {verified}")]
    QuoteStale { local: U256, verified: U256 },

    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("A transaction for this action is already in flight")]
    TransactionInFlight,

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract call failed: {0}")]
    ContractError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid token address: {0}")]
    InvalidTokenAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Math overflow or underflow")]
    MathError,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DEX client operations
pub type Result<T> = std::result::Result<T, DexError>;

/// Token metadata; decimals default to 18 unless an on-chain read says otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    /// Placeholder descriptor used before the on-chain metadata read completes
    pub fn unresolved(address: Address) -> Self {
        Self {
            address,
            symbol: format!("{:#x}", address)[..10].to_string(),
            decimals: 18,
        }
    }
}

impl fmt::Display for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.symbol, self.address)
    }
}

/// Snapshot of a liquidity pool; reserves are valid only as of `block_number`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Pool contract address
    pub address: Address,

    /// First token of the pair (canonical on-chain ordering)
    pub token0: Address,

    /// Second token of the pair
    pub token1: Address,

    /// Reserve of token0
    pub reserve0: U256,

    /// Reserve of token1
    pub reserve1: U256,

    /// Swap fee in basis points (30 = 0.3%)
    pub fee_bps: u32,

    /// Block number the reserves were read at
    pub block_number: u64,
}

impl PoolInfo {
    /// Get the other token in the pair
    pub fn get_other_token(&self, token: &Address) -> Option<Address> {
        if token == &self.token0 {
            Some(self.token1)
        } else if token == &self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// Get (reserve_in, reserve_out) oriented for a given input token
    pub fn get_reserves(&self, token_in: &Address) -> Option<(U256, U256)> {
        if token_in == &self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if token_in == &self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// Whether this pool holds the given (unordered) pair
    pub fn contains_pair(&self, token_a: &Address, token_b: &Address) -> bool {
        (self.token0 == *token_a && self.token1 == *token_b)
            || (self.token0 == *token_b && self.token1 == *token_a)
    }

    /// Spot price ratio (token1 per token0), display only
    pub fn price_ratio(&self) -> f64 {
        if self.reserve0.is_zero() {
            return 0.0;
        }
        let r0 = self.reserve0.as_u128() as f64;
        let r1 = self.reserve1.as_u128() as f64;
        r1 / r0
    }
}

/// A single hop of a quoted swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteHop {
    /// Pool used for this hop
    pub pool: Address,

    /// Token in for this hop
    pub token_in: Address,

    /// Token out for this hop
    pub token_out: Address,

    /// Amount in for this hop
    pub amount_in: U256,

    /// Amount out for this hop
    pub amount_out: U256,

    /// Fee paid in this hop (in token_in)
    pub fee: U256,
}

/// A derived swap quote; recomputed whenever amount, path or reserves change,
/// never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Input amount in the first token's base units
    pub amount_in: U256,

    /// Expected output amount in the last token's base units
    pub amount_out: U256,

    /// Token path, token_in first
    pub path: Vec<Address>,

    /// Per-hop breakdown
    pub hops: Vec<QuoteHop>,

    /// Price impact in basis points
    pub price_impact_bps: u32,

    /// Slippage-adjusted minimum output, floor-rounded
    pub minimum_received: U256,
}

impl Quote {
    /// Effective exchange rate, display only
    pub fn exchange_rate(&self) -> f64 {
        if self.amount_in.is_zero() {
            return 0.0;
        }
        self.amount_out.as_u128() as f64 / self.amount_in.as_u128() as f64
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// Result of an allowance read for a (token, owner, spender) triple
#[derive(Debug, Clone)]
pub struct ApprovalState {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    pub allowance: U256,
}

impl ApprovalState {
    /// Exact U256 comparison; never goes through floating point
    pub fn sufficient_for(&self, amount: U256) -> bool {
        self.allowance >= amount
    }
}

/// Terminal failure of a tracked transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFailure {
    /// The signer declined to sign; terminal for this attempt
    UserRejected,

    /// The receipt came back with status 0
    Reverted(String),

    /// Dispatch or confirmation failed at the provider
    Provider(String),
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxFailure::UserRejected => write!(f, "rejected by signer"),
            TxFailure::Reverted(reason) => write!(f, "reverted: {}", reason),
            TxFailure::Provider(reason) => write!(f, "provider error: {}", reason),
        }
    }
}

/// Lifecycle of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Idle,
    PendingSignature,
    Confirming(H256),
    Success(H256),
    Failed(TxFailure),
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Success(_) | TxState::Failed(_))
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::Idle => write!(f, "idle"),
            TxState::PendingSignature => write!(f, "pending signature"),
            TxState::Confirming(hash) => write!(f, "confirming {:#x}", hash),
            TxState::Success(hash) => write!(f, "success {:#x}", hash),
            TxState::Failed(failure) => write!(f, "failed ({})", failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> PoolInfo {
        PoolInfo {
            address: Address::from_low_u64_be(100),
            token0: Address::from_low_u64_be(1),
            token1: Address::from_low_u64_be(2),
            reserve0: U256::from(1000u64),
            reserve1: U256::from(2000u64),
            fee_bps: 30,
            block_number: 0,
        }
    }

    #[test]
    fn test_get_reserves_orientation() {
        let p = pool();
        assert_eq!(
            p.get_reserves(&p.token0),
            Some((U256::from(1000u64), U256::from(2000u64)))
        );
        assert_eq!(
            p.get_reserves(&p.token1),
            Some((U256::from(2000u64), U256::from(1000u64)))
        );
        assert_eq!(p.get_reserves(&Address::from_low_u64_be(9)), None);
    }

    #[test]
    fn test_contains_pair_is_order_insensitive() {
        let p = pool();
        assert!(p.contains_pair(&p.token0, &p.token1));
        assert!(p.contains_pair(&p.token1, &p.token0));
        assert!(!p.contains_pair(&p.token0, &Address::from_low_u64_be(9)));
    }

    #[test]
    fn test_approval_state_comparison() {
        let state = ApprovalState {
            token: Address::zero(),
            owner: Address::zero(),
            spender: Address::zero(),
            allowance: U256::from(100u64),
        };
        assert!(state.sufficient_for(U256::from(100u64)));
        assert!(!state.sufficient_for(U256::from(101u64)));
    }
}
