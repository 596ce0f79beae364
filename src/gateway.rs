use crate::config::Config;
use crate::session::{SignerClient, WalletSession};
use crate::tracker::TrackerSet;
use crate::types::{DexError, Result, TokenInfo, TxFailure};
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::contract::{ContractCall, ContractError};
use ethers::prelude::*;
use ethers::types::{Address, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// AMM pool factory (UniswapV2-style pair enumeration + creation)
abigen!(
    PoolFactory,
    r#"[
        function allPairsLength() external view returns (uint256)
        function allPairs(uint256) external view returns (address)
        function getPair(address tokenA, address tokenB) external view returns (address pair)
        function createPool(address tokenA, address tokenB) external returns (address pool)
    ]"#,
);

// AMM pool (pair) contract
abigen!(
    AmmPool,
    r#"[
        function token0() external view returns (address)
        function token1() external view returns (address)
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
    ]"#,
);

// AMM router
abigen!(
    AmmRouter,
    r#"[
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts)
        function getAmountsIn(uint256 amountOut, address[] path) external view returns (uint256[] amounts)
        function quote(uint256 amountA, uint256 reserveA, uint256 reserveB) external pure returns (uint256 amountB)
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] amounts)
        function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB, uint256 liquidity)
    ]"#,
);

// ERC-20 with the faucet mint extension used by the test tokens
abigen!(
    Erc20,
    r#"[
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function balanceOf(address owner) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function mint(address to, uint256 amount) external
    ]"#,
);

// YRT series manager / yield distributor
abigen!(
    YieldDistributor,
    r#"[
        function createSeries(string name, string symbol, uint256 totalSupply) external returns (address series)
        function startNewPeriod(address series, uint256 durationSeconds) external
        function depositYield(address series, uint256 amount) external
        function distribute(address series) external
    ]"#,
);

/// Contract read/write gateway. Reads go through a bounded-retry wrapper;
/// writes go through `execute`, which owns the transaction lifecycle and is
/// never retried.
pub struct Gateway {
    provider: Arc<Provider<Http>>,
    config: Config,
    token_meta: DashMap<Address, TokenInfo>,
}

impl Gateway {
    pub fn new(provider: Arc<Provider<Http>>, config: Config) -> Self {
        Self {
            provider,
            config,
            token_meta: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    // ---- contract handles -------------------------------------------------

    pub fn factory(&self) -> PoolFactory<Provider<Http>> {
        PoolFactory::new(self.config.contracts.factory, self.provider.clone())
    }

    pub fn pool(&self, address: Address) -> AmmPool<Provider<Http>> {
        AmmPool::new(address, self.provider.clone())
    }

    pub fn router(&self) -> AmmRouter<Provider<Http>> {
        AmmRouter::new(self.config.contracts.router, self.provider.clone())
    }

    pub fn erc20(&self, token: Address) -> Erc20<Provider<Http>> {
        Erc20::new(token, self.provider.clone())
    }

    pub fn factory_signed(&self, session: &WalletSession) -> Result<PoolFactory<SignerClient>> {
        Ok(PoolFactory::new(
            self.config.contracts.factory,
            session.signer()?,
        ))
    }

    pub fn router_signed(&self, session: &WalletSession) -> Result<AmmRouter<SignerClient>> {
        Ok(AmmRouter::new(
            self.config.contracts.router,
            session.signer()?,
        ))
    }

    pub fn erc20_signed(
        &self,
        session: &WalletSession,
        token: Address,
    ) -> Result<Erc20<SignerClient>> {
        Ok(Erc20::new(token, session.signer()?))
    }

    pub fn distributor_signed(
        &self,
        session: &WalletSession,
    ) -> Result<YieldDistributor<SignerClient>> {
        Ok(YieldDistributor::new(
            self.config.contracts.distributor,
            session.signer()?,
        ))
    }

    // ---- reads ------------------------------------------------------------

    /// Run a view call with bounded retries and linear backoff.
    /// Only reads go through here; a retried write could double-submit.
    pub async fn read_retry<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.read_retries => {
                    attempt += 1;
                    warn!(%label, attempt, "read failed, retrying: {}", e);
                    tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(e) => {
                    return Err(DexError::ContractError(format!("{}: {}", label, e)));
                }
            }
        }
    }

    pub async fn block_number(&self) -> Result<u64> {
        let provider = self.provider.clone();
        self.read_retry("get_block_number", || {
            let provider = provider.clone();
            async move { provider.get_block_number().await }
        })
        .await
        .map(|n| n.as_u64())
    }

    pub async fn pool_count(&self) -> Result<usize> {
        let factory = self.factory();
        let count = self
            .read_retry("all_pairs_length", || {
                let call = factory.all_pairs_length();
                async move { call.call().await }
            })
            .await?;
        Ok(count.as_usize())
    }

    pub async fn pool_address_at(&self, index: usize) -> Result<Address> {
        let factory = self.factory();
        self.read_retry("all_pairs", || {
            let call = factory.all_pairs(U256::from(index));
            async move { call.call().await }
        })
        .await
    }

    /// Factory pair lookup for a (pre-sorted) token pair; zero address means
    /// no pool exists
    pub async fn pair_for(&self, token0: Address, token1: Address) -> Result<Address> {
        let factory = self.factory();
        self.read_retry("get_pair", || {
            let call = factory.get_pair(token0, token1);
            async move { call.call().await }
        })
        .await
    }

    /// Read a pool's tokens and reserves; the three reads are independent
    /// view calls joined together
    pub async fn pool_details(&self, pool: Address) -> Result<(Address, Address, U256, U256)> {
        let contract = self.pool(pool);

        let token0_call = contract.token_0();
        let token1_call = contract.token_1();
        let reserves_call = contract.get_reserves();
        let (token0, token1, reserves) = futures::try_join!(
            token0_call.call(),
            token1_call.call(),
            reserves_call.call(),
        )
        .map_err(|e| DexError::ContractError(format!("pool {:#x}: {}", pool, e)))?;

        Ok((
            token0,
            token1,
            U256::from(reserves.0),
            U256::from(reserves.1),
        ))
    }

    /// Token symbol and decimals, memoized after the first successful read.
    /// Decimals fall back to 18 when the token does not expose the read.
    pub async fn token_info(&self, token: Address) -> TokenInfo {
        if let Some(info) = self.token_meta.get(&token) {
            return info.clone();
        }

        let contract = self.erc20(token);
        let symbol_call = contract.symbol();
        let decimals_call = contract.decimals();
        let (symbol, decimals) = futures::join!(symbol_call.call(), decimals_call.call());

        let info = TokenInfo {
            address: token,
            symbol: symbol.unwrap_or_else(|_| TokenInfo::unresolved(token).symbol),
            decimals: decimals.unwrap_or(18),
        };

        debug!(token = %format!("{:#x}", token), symbol = %info.symbol, "resolved token metadata");
        self.token_meta.insert(token, info.clone());
        info
    }

    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let contract = self.erc20(token);
        self.read_retry("balance_of", || {
            let call = contract.balance_of(owner);
            async move { call.call().await }
        })
        .await
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let contract = self.erc20(token);
        self.read_retry("allowance", || {
            let call = contract.allowance(owner, spender);
            async move { call.call().await }
        })
        .await
    }

    /// Router's authoritative multi-hop quote
    pub async fn get_amounts_out(&self, amount_in: U256, path: Vec<Address>) -> Result<Vec<U256>> {
        let router = self.router();
        self.read_retry("get_amounts_out", || {
            let call = router.get_amounts_out(amount_in, path.clone());
            async move { call.call().await }
        })
        .await
    }

    pub async fn get_amounts_in(&self, amount_out: U256, path: Vec<Address>) -> Result<Vec<U256>> {
        let router = self.router();
        self.read_retry("get_amounts_in", || {
            let call = router.get_amounts_in(amount_out, path.clone());
            async move { call.call().await }
        })
        .await
    }

    // ---- writes -----------------------------------------------------------

    /// Submit a state-changing call and drive the action's shared tracker
    /// through its lifecycle. Rejects while the action is busy, rejects on
    /// the wrong network before the signature prompt, and never retries.
    pub async fn execute<D>(
        &self,
        session: &WalletSession,
        trackers: &TrackerSet,
        action: &str,
        call: ContractCall<SignerClient, D>,
    ) -> Result<TransactionReceipt>
    where
        D: ethers::abi::Detokenize,
    {
        if trackers.busy(action) {
            return Err(DexError::TransactionInFlight);
        }
        session.ensure_chain()?;

        trackers.begin(action)?;

        let pending = match call.send().await {
            Ok(pending) => pending,
            Err(e) => {
                let (failure, err) = classify_send_error(e);
                trackers.fail(action, failure);
                return Err(err);
            }
        };

        // PendingTransaction derefs to the transaction hash
        let tx_hash = *pending;
        trackers.confirming(action, tx_hash);

        let receipt = match pending.await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                trackers.fail(action, TxFailure::Provider("transaction dropped".to_string()));
                return Err(DexError::RpcError(format!(
                    "transaction {:#x} dropped from the mempool",
                    tx_hash
                )));
            }
            Err(e) => {
                trackers.fail(action, TxFailure::Provider(e.to_string()));
                return Err(DexError::RpcError(format!(
                    "failed waiting for receipt of {:#x}: {}",
                    tx_hash, e
                )));
            }
        };

        if receipt.status == Some(1u64.into()) {
            trackers.succeed(action, tx_hash);
            debug!(tx = %format!("{:#x}", tx_hash), action, "transaction confirmed");
            Ok(receipt)
        } else {
            let reason = format!("transaction {:#x} reverted", tx_hash);
            trackers.fail(action, TxFailure::Reverted(reason.clone()));
            Err(DexError::TransactionReverted(reason))
        }
    }
}

/// Read surface pool discovery runs on, split from the concrete gateway so
/// the discovery logic can be exercised against a canned reader.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PoolReads: Send + Sync {
    async fn pool_count(&self) -> Result<usize>;
    async fn pool_address_at(&self, index: usize) -> Result<Address>;
    async fn pair_for(&self, token0: Address, token1: Address) -> Result<Address>;
    async fn pool_details(&self, pool: Address) -> Result<(Address, Address, U256, U256)>;
    async fn block_number(&self) -> Result<u64>;
}

#[async_trait]
impl PoolReads for Gateway {
    async fn pool_count(&self) -> Result<usize> {
        Gateway::pool_count(self).await
    }

    async fn pool_address_at(&self, index: usize) -> Result<Address> {
        Gateway::pool_address_at(self, index).await
    }

    async fn pair_for(&self, token0: Address, token1: Address) -> Result<Address> {
        Gateway::pair_for(self, token0, token1).await
    }

    async fn pool_details(&self, pool: Address) -> Result<(Address, Address, U256, U256)> {
        Gateway::pool_details(self, pool).await
    }

    async fn block_number(&self) -> Result<u64> {
        Gateway::block_number(self).await
    }
}

/// Map a dispatch error onto the tracker failure and the surfaced error.
/// Wallet providers signal a declined signature with JSON-RPC code 4001 or a
/// "rejected"/"denied" message.
fn classify_send_error(e: ContractError<SignerClient>) -> (TxFailure, DexError) {
    let message = e.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("rejected") || lowered.contains("denied") || lowered.contains("4001") {
        (TxFailure::UserRejected, DexError::UserRejected)
    } else {
        (
            TxFailure::Provider(message.clone()),
            DexError::ContractError(message),
        )
    }
}
