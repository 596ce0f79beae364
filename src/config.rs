use crate::types::{DexError, Result};
use ethers::types::Address;
use std::env;
use std::str::FromStr;

/// The single supported network (Base Sepolia)
pub const SUPPORTED_CHAIN_ID: u64 = 84532;

/// Static description of the target network
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,

    pub name: String,

    pub rpc_url: String,

    pub explorer_url: String,
}

impl ChainConfig {
    /// Exactly one chain id is supported at a time
    pub fn is_supported(&self, chain_id: u64) -> bool {
        chain_id == self.chain_id
    }

    /// Explorer link for a transaction hash
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Deployed addresses of the platform contracts
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    /// AMM pool factory
    pub factory: Address,

    /// AMM router
    pub router: Address,

    /// YRT yield distributor / series manager
    pub distributor: Address,

    /// Mock USD stable token (faucet-mintable)
    pub stable_usd: Address,

    /// Mock IDR stable token (faucet-mintable)
    pub stable_idr: Address,
}

impl ContractRegistry {
    /// A registry entry equal to the zero address is never usable operationally
    fn validate(self) -> Result<Self> {
        for (name, addr) in [
            ("factory", self.factory),
            ("router", self.router),
            ("distributor", self.distributor),
            ("stable_usd", self.stable_usd),
            ("stable_idr", self.stable_idr),
        ] {
            if addr.is_zero() {
                return Err(DexError::ConfigError(format!(
                    "contract address for {} is the zero address",
                    name
                )));
            }
        }
        Ok(self)
    }

    /// Faucet-mintable test tokens
    pub fn faucet_tokens(&self) -> Vec<(&'static str, Address)> {
        vec![("mUSD", self.stable_usd), ("mIDR", self.stable_idr)]
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chain: ChainConfig,

    pub contracts: ContractRegistry,

    /// Slippage tolerance applied to quotes, in basis points
    pub default_slippage_bps: u32,

    /// Allowed divergence between local and on-chain quotes, in basis points
    pub quote_tolerance_bps: u32,

    /// Pool snapshot lifetime in seconds
    pub pool_cache_ttl_secs: u64,

    /// Bounded retries for transient read failures; writes are never retried
    pub read_retries: u32,

    /// Deadline offset for router calls, in seconds from now
    pub tx_deadline_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let rpc_url =
            env::var("RPC_URL").unwrap_or_else(|_| "https://sepolia.base.org".to_string());

        let chain_id = env::var("CHAIN_ID")
            .unwrap_or_else(|_| SUPPORTED_CHAIN_ID.to_string())
            .parse()
            .map_err(|_| DexError::ConfigError("Invalid CHAIN_ID".to_string()))?;

        let explorer_url = env::var("EXPLORER_URL")
            .unwrap_or_else(|_| "https://sepolia.basescan.org".to_string());

        let chain = ChainConfig {
            chain_id,
            name: env::var("CHAIN_NAME").unwrap_or_else(|_| "Base Sepolia".to_string()),
            rpc_url,
            explorer_url,
        };

        let contracts = ContractRegistry {
            factory: Self::parse_address(
                &env::var("FACTORY_ADDRESS")
                    .unwrap_or_else(|_| "0x7Ae1cF8C7f1a2c1fD0BC5E9f3AD9dFd50A4bc101".to_string()),
            )?,
            router: Self::parse_address(
                &env::var("ROUTER_ADDRESS")
                    .unwrap_or_else(|_| "0x9B54c1c27Ae0bCD0a8Ae5FA1C8AD0e24B3e2d102".to_string()),
            )?,
            distributor: Self::parse_address(
                &env::var("DISTRIBUTOR_ADDRESS")
                    .unwrap_or_else(|_| "0x4d61Be7FCab2fF3c10E1De05f7Ab93bC7A1Ed103".to_string()),
            )?,
            stable_usd: Self::parse_address(
                &env::var("STABLE_USD_ADDRESS")
                    .unwrap_or_else(|_| "0x2Fc4A9e05d07bBAA30Ce3Ee6fDd2cB68A91FD104".to_string()),
            )?,
            stable_idr: Self::parse_address(
                &env::var("STABLE_IDR_ADDRESS")
                    .unwrap_or_else(|_| "0x8e12d60B9AF0eE58c3Fa14Ad3c0DeC5B25c2D105".to_string()),
            )?,
        }
        .validate()?;

        let default_slippage_bps = env::var("DEFAULT_SLIPPAGE_BPS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let quote_tolerance_bps = env::var("QUOTE_TOLERANCE_BPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let pool_cache_ttl_secs = env::var("POOL_CACHE_TTL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let read_retries = env::var("READ_RETRIES")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .unwrap_or(2);

        let tx_deadline_secs = env::var("TX_DEADLINE_SECONDS")
            .unwrap_or_else(|_| "1200".to_string())
            .parse()
            .unwrap_or(1200);

        Ok(Self {
            chain,
            contracts,
            default_slippage_bps,
            quote_tolerance_bps,
            pool_cache_ttl_secs,
            read_retries,
            tx_deadline_secs,
        })
    }

    /// Parse an Ethereum address from string
    fn parse_address(addr_str: &str) -> Result<Address> {
        Address::from_str(addr_str)
            .map_err(|_| DexError::InvalidTokenAddress(addr_str.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                chain_id: SUPPORTED_CHAIN_ID,
                name: "Base Sepolia".to_string(),
                rpc_url: "https://sepolia.base.org".to_string(),
                explorer_url: "https://sepolia.basescan.org".to_string(),
            },
            contracts: ContractRegistry {
                factory: Address::from_low_u64_be(0x101),
                router: Address::from_low_u64_be(0x102),
                distributor: Address::from_low_u64_be(0x103),
                stable_usd: Address::from_low_u64_be(0x104),
                stable_idr: Address::from_low_u64_be(0x105),
            },
            default_slippage_bps: 50,
            quote_tolerance_bps: 10,
            pool_cache_ttl_secs: 30,
            read_retries: 2,
            tx_deadline_secs: 1200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain.chain_id, 84532);
        assert_eq!(config.default_slippage_bps, 50);
        assert!(config.chain.is_supported(84532));
        assert!(!config.chain.is_supported(1));
    }

    #[test]
    fn test_registry_rejects_zero_address() {
        let registry = ContractRegistry {
            factory: Address::zero(),
            router: Address::from_low_u64_be(1),
            distributor: Address::from_low_u64_be(2),
            stable_usd: Address::from_low_u64_be(3),
            stable_idr: Address::from_low_u64_be(4),
        };
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_tx_url() {
        let config = Config::default();
        assert_eq!(
            config.chain.tx_url("0xabc"),
            "https://sepolia.basescan.org/tx/0xabc"
        );
    }

    #[test]
    fn test_parse_address() {
        assert!(Config::parse_address("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f").is_ok());
        assert!(Config::parse_address("invalid").is_err());
    }
}
