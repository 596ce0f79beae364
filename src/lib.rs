// YRT DEX client library
//
// Client-side core for the YRT real-world-asset tokenization platform:
// pool discovery, swap quoting mirrored against the on-chain router, and
// transaction-lifecycle tracking for the write flows.

pub mod approval;
pub mod config;
pub mod flows;
pub mod gateway;
pub mod pools;
pub mod quote;
pub mod session;
pub mod tracker;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use approval::{ApprovalGate, ApprovalPhase, ApprovalStep};
pub use config::{ChainConfig, Config, ContractRegistry, SUPPORTED_CHAIN_ID};
pub use gateway::{Gateway, PoolReads};
pub use pools::{PoolDiscovery, PoolSnapshot};
pub use quote::{QuoteEngine, QuoteSession, QuoteTicket};
pub use session::{ConnectorKind, WalletSession};
pub use tracker::{TrackerSet, TxTracker};
pub use types::{
    ApprovalState, DexError, PoolInfo, Quote, QuoteHop, Result, TokenInfo, TxFailure, TxState,
};

use ethers::types::{Address, H256, U256};
use std::sync::Arc;

/// Main client interface: wires the wallet session, contract gateway and
/// pool discovery together, the way the UI layer consumes them
pub struct DexClient {
    session: WalletSession,
    gateway: Arc<Gateway>,
    discovery: PoolDiscovery,
    trackers: TrackerSet,
}

impl DexClient {
    /// Create a client with an established session
    pub fn new(config: Config, session: WalletSession) -> Self {
        let gateway = Arc::new(Gateway::new(session.provider(), config));
        let discovery = PoolDiscovery::new(gateway.clone());
        Self {
            session,
            gateway,
            discovery,
            trackers: TrackerSet::new(),
        }
    }

    /// View-only client from configuration alone
    pub fn read_only(config: Config) -> Result<Self> {
        let session = WalletSession::connect_read_only(config.chain.clone())?;
        Ok(Self::new(config, session))
    }

    /// Signing client from a raw private key
    pub fn with_private_key(config: Config, private_key: &str) -> Result<Self> {
        let session = WalletSession::connect_private_key(config.chain.clone(), private_key)?;
        Ok(Self::new(config, session))
    }

    pub fn config(&self) -> &Config {
        self.gateway.config()
    }

    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut WalletSession {
        &mut self.session
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn discovery(&self) -> &PoolDiscovery {
        &self.discovery
    }

    /// Per-action transaction trackers, shared by all write flows
    pub fn trackers(&self) -> &TrackerSet {
        &self.trackers
    }

    // ---- reads ------------------------------------------------------------

    /// Cached pool listing (display freshness)
    pub async fn list_pools(&self) -> Result<Arc<PoolSnapshot>> {
        self.discovery.list_pools().await
    }

    /// Force-refreshed pool listing
    pub async fn refresh_pools(&self) -> Result<Arc<PoolSnapshot>> {
        self.discovery.refresh().await
    }

    pub async fn find_pool(&self, token_a: Address, token_b: Address) -> Result<Option<PoolInfo>> {
        self.discovery.find_pool(token_a, token_b).await
    }

    pub async fn token_info(&self, token: Address) -> TokenInfo {
        self.gateway.token_info(token).await
    }

    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        self.gateway.balance_of(token, owner).await
    }

    /// Local quote over fresh reserves for a direct pair, then verified
    /// against the router
    pub async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        slippage_bps: Option<u32>,
    ) -> Result<Quote> {
        let config = self.gateway.config();
        let pool = self
            .discovery
            .find_pool(token_in, token_out)
            .await?
            .ok_or_else(|| {
                DexError::PoolNotFound(format!(
                    "no pool for pair {:#x} / {:#x}",
                    token_in, token_out
                ))
            })?;

        let quote = QuoteEngine::quote_path(
            amount_in,
            &[token_in, token_out],
            &[pool],
            slippage_bps.unwrap_or(config.default_slippage_bps),
        )?;
        QuoteEngine::verify(&self.gateway, &quote, config.quote_tolerance_bps).await?;
        Ok(quote)
    }

    // ---- writes -----------------------------------------------------------

    pub async fn swap(&self, params: flows::SwapParams) -> Result<flows::SwapOutcome> {
        flows::swap(&self.gateway, &self.session, &self.discovery, &self.trackers, params).await
    }

    pub async fn add_liquidity(
        &self,
        params: flows::AddLiquidityParams,
    ) -> Result<flows::AddLiquidityOutcome> {
        flows::add_liquidity(&self.gateway, &self.session, &self.trackers, params).await
    }

    pub async fn create_pool(&self, token_a: Address, token_b: Address) -> Result<H256> {
        flows::create_pool(
            &self.gateway,
            &self.session,
            &self.discovery,
            &self.trackers,
            token_a,
            token_b,
        )
        .await
    }

    pub async fn faucet_mint(&self, token: Address, amount: U256) -> Result<H256> {
        flows::faucet_mint(&self.gateway, &self.session, &self.trackers, token, amount).await
    }

    pub async fn create_series(
        &self,
        name: String,
        symbol: String,
        total_supply: U256,
    ) -> Result<H256> {
        flows::create_series(
            &self.gateway,
            &self.session,
            &self.trackers,
            name,
            symbol,
            total_supply,
        )
        .await
    }

    pub async fn start_new_period(&self, series: Address, duration_secs: u64) -> Result<H256> {
        flows::start_new_period(&self.gateway, &self.session, &self.trackers, series, duration_secs)
            .await
    }

    pub async fn deposit_yield(
        &self,
        series: Address,
        amount: U256,
    ) -> Result<flows::DepositYieldOutcome> {
        flows::deposit_yield(&self.gateway, &self.session, &self.trackers, series, amount).await
    }

    pub async fn distribute(&self, series: Address) -> Result<H256> {
        flows::distribute(&self.gateway, &self.session, &self.trackers, series).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_read_only_client() {
        let client = DexClient::read_only(Config::default());
        assert!(client.is_ok());
        let client = client.unwrap();
        assert_eq!(client.session().connector(), ConnectorKind::ReadOnly);
    }

    #[tokio::test]
    async fn test_write_rejected_without_signer() {
        let client = DexClient::read_only(Config::default()).unwrap();
        let result = client
            .faucet_mint(Address::from_low_u64_be(1), U256::from(100u64))
            .await;
        assert!(matches!(result, Err(DexError::WalletNotConnected)));
    }

    #[tokio::test]
    async fn test_write_rejected_on_wrong_network_before_dispatch() {
        let config = Config::default();
        let client = DexClient::with_private_key(
            config,
            "0x0123456789012345678901234567890123456789012345678901234567890123",
        )
        .unwrap();

        // wallet reports mainnet; no signature prompt may be issued
        client.session().observe_chain(1);
        let result = client
            .faucet_mint(Address::from_low_u64_be(1), U256::from(100u64))
            .await;
        assert!(matches!(
            result,
            Err(DexError::NetworkMismatch {
                actual: 1,
                expected: 84532
            })
        ));
    }
}
