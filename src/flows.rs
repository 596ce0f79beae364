use crate::approval::{ApprovalGate, ApprovalStep};
use crate::gateway::Gateway;
use crate::pools::PoolDiscovery;
use crate::quote::QuoteEngine;
use crate::session::WalletSession;
use crate::tracker::TrackerSet;
use crate::types::{DexError, Quote, Result};
use crate::utils;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use tracing::info;

/// Router call deadline, seconds from now
fn deadline(offset_secs: u64) -> U256 {
    U256::from(Utc::now().timestamp() as u64 + offset_secs)
}

/// Run the approve step of a flow if the current allowance is short.
///
/// Progression past the approve is gated on a fresh allowance read, not on
/// the approve receipt alone: a lagging RPC node can confirm the receipt
/// before serving the new allowance, and acting on the stale value would
/// revert the follow-up transaction.
async fn ensure_allowance(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<Option<H256>> {
    let owner = session.account()?;
    let mut step = ApprovalStep::new(token, amount);

    let state = ApprovalGate::check(gateway, token, owner, spender).await?;
    step.observe_allowance(state.allowance);
    if step.is_ready() {
        return Ok(None);
    }

    info!(
        token = %format!("{:#x}", token),
        amount = %amount,
        "allowance short, running approve"
    );

    let erc20 = gateway.erc20_signed(session, token)?;
    let receipt = gateway
        .execute(session, trackers, "approve", erc20.approve(spender, amount))
        .await?;

    // re-read, never assume: the receipt alone does not prove the node we
    // read from has caught up
    let state = ApprovalGate::check(gateway, token, owner, spender).await?;
    step.observe_allowance(state.allowance);
    if !step.is_ready() {
        return Err(DexError::InsufficientAllowance {
            spender,
            allowance: state.allowance,
            required: amount,
        });
    }

    Ok(Some(receipt.transaction_hash))
}

// ---- swap -----------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SwapParams {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub slippage_bps: Option<u32>,
}

#[derive(Debug)]
pub struct SwapOutcome {
    pub quote: Quote,
    pub verified_out: U256,
    pub approve_tx: Option<H256>,
    pub swap_tx: H256,
}

/// Full swap flow: refresh reserves, quote locally, gate on allowance, then
/// verify against the router right before submitting.
pub async fn swap(
    gateway: &Gateway,
    session: &WalletSession,
    discovery: &PoolDiscovery,
    trackers: &TrackerSet,
    params: SwapParams,
) -> Result<SwapOutcome> {
    session.ensure_chain()?;
    let account = session.account()?;
    let config = gateway.config();
    let slippage_bps = params.slippage_bps.unwrap_or(config.default_slippage_bps);

    // reserves must be fresh at submission time; the display cache is not
    // good enough here
    let pool = discovery
        .find_pool(params.token_in, params.token_out)
        .await?
        .ok_or_else(|| {
            DexError::PoolNotFound(format!(
                "no pool for pair {:#x} / {:#x}",
                params.token_in, params.token_out
            ))
        })?;

    let path = vec![params.token_in, params.token_out];
    let quote = QuoteEngine::quote_path(params.amount_in, &path, &[pool], slippage_bps)?;

    let approve_tx = ensure_allowance(
        gateway,
        session,
        trackers,
        params.token_in,
        config.contracts.router,
        params.amount_in,
    )
    .await?;

    // authoritative figure immediately before submission: the approve leg can
    // sit on a wallet prompt plus a confirmation, long enough for reserves to
    // move. QuoteStale propagates out and the caller re-runs the flow, which
    // refetches reserves.
    let verified_out = QuoteEngine::verify(gateway, &quote, config.quote_tolerance_bps).await?;

    let router = gateway.router_signed(session)?;
    let receipt = gateway
        .execute(
            session,
            trackers,
            "swap",
            router.swap_exact_tokens_for_tokens(
                params.amount_in,
                quote.minimum_received,
                path,
                account,
                deadline(config.tx_deadline_secs),
            ),
        )
        .await?;

    info!(
        amount_in = %params.amount_in,
        minimum_received = %quote.minimum_received,
        tx = %format!("{:#x}", receipt.transaction_hash),
        "swap submitted and confirmed"
    );

    Ok(SwapOutcome {
        quote,
        verified_out,
        approve_tx,
        swap_tx: receipt.transaction_hash,
    })
}

// ---- liquidity ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AddLiquidityParams {
    pub token_a: Address,
    pub token_b: Address,
    pub amount_a: U256,
    pub amount_b: U256,
    pub slippage_bps: Option<u32>,
}

#[derive(Debug)]
pub struct AddLiquidityOutcome {
    pub approve_a_tx: Option<H256>,
    pub approve_b_tx: Option<H256>,
    pub liquidity_tx: H256,
}

/// Approve both legs, then add liquidity with slippage-derived minimums
pub async fn add_liquidity(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    params: AddLiquidityParams,
) -> Result<AddLiquidityOutcome> {
    session.ensure_chain()?;
    let account = session.account()?;
    let config = gateway.config();
    let slippage_bps = params.slippage_bps.unwrap_or(config.default_slippage_bps);
    let router = config.contracts.router;

    let approve_a_tx =
        ensure_allowance(gateway, session, trackers, params.token_a, router, params.amount_a)
            .await?;
    let approve_b_tx =
        ensure_allowance(gateway, session, trackers, params.token_b, router, params.amount_b)
            .await?;

    let router_contract = gateway.router_signed(session)?;
    let receipt = gateway
        .execute(
            session,
            trackers,
            "add-liquidity",
            router_contract.add_liquidity(
                params.token_a,
                params.token_b,
                params.amount_a,
                params.amount_b,
                utils::apply_slippage(params.amount_a, slippage_bps),
                utils::apply_slippage(params.amount_b, slippage_bps),
                account,
                deadline(config.tx_deadline_secs),
            ),
        )
        .await?;

    Ok(AddLiquidityOutcome {
        approve_a_tx,
        approve_b_tx,
        liquidity_tx: receipt.transaction_hash,
    })
}

// ---- pool creation --------------------------------------------------------

/// Create the AMM pool for a pair. Rejected when one already exists.
pub async fn create_pool(
    gateway: &Gateway,
    session: &WalletSession,
    discovery: &PoolDiscovery,
    trackers: &TrackerSet,
    token_a: Address,
    token_b: Address,
) -> Result<H256> {
    session.ensure_chain()?;

    let (token0, token1) = utils::sort_tokens(token_a, token_b);
    if let Some(existing) = discovery.find_pool(token0, token1).await? {
        return Err(DexError::Other(anyhow::anyhow!(
            "a pool already exists for this pair at {:#x}",
            existing.address
        )));
    }

    let factory = gateway.factory_signed(session)?;
    let receipt = gateway
        .execute(session, trackers, "create-pool", factory.create_pool(token0, token1))
        .await?;

    Ok(receipt.transaction_hash)
}

// ---- faucet ---------------------------------------------------------------

/// Mint test tokens to the connected account
pub async fn faucet_mint(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    token: Address,
    amount: U256,
) -> Result<H256> {
    session.ensure_chain()?;
    let account = session.account()?;

    let erc20 = gateway.erc20_signed(session, token)?;
    let receipt = gateway
        .execute(session, trackers, "faucet-mint", erc20.mint(account, amount))
        .await?;

    Ok(receipt.transaction_hash)
}

// ---- YRT series -----------------------------------------------------------

/// Deploy a new YRT series through the distributor
pub async fn create_series(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    name: String,
    symbol: String,
    total_supply: U256,
) -> Result<H256> {
    session.ensure_chain()?;

    let distributor = gateway.distributor_signed(session)?;
    let receipt = gateway
        .execute(
            session,
            trackers,
            "create-series",
            distributor.create_series(name, symbol, total_supply),
        )
        .await?;

    Ok(receipt.transaction_hash)
}

/// Open a new yield period for a series
pub async fn start_new_period(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    series: Address,
    duration_secs: u64,
) -> Result<H256> {
    session.ensure_chain()?;

    let distributor = gateway.distributor_signed(session)?;
    let receipt = gateway
        .execute(
            session,
            trackers,
            "start-period",
            distributor.start_new_period(series, U256::from(duration_secs)),
        )
        .await?;

    Ok(receipt.transaction_hash)
}

#[derive(Debug)]
pub struct DepositYieldOutcome {
    pub approve_tx: Option<H256>,
    pub deposit_tx: H256,
}

/// Deposit stable-token yield for a series; the distributor pulls the funds,
/// so its allowance is gated first
pub async fn deposit_yield(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    series: Address,
    amount: U256,
) -> Result<DepositYieldOutcome> {
    session.ensure_chain()?;
    let config = gateway.config();

    let approve_tx = ensure_allowance(
        gateway,
        session,
        trackers,
        config.contracts.stable_usd,
        config.contracts.distributor,
        amount,
    )
    .await?;

    let distributor = gateway.distributor_signed(session)?;
    let receipt = gateway
        .execute(
            session,
            trackers,
            "deposit-yield",
            distributor.deposit_yield(series, amount),
        )
        .await?;

    Ok(DepositYieldOutcome {
        approve_tx,
        deposit_tx: receipt.transaction_hash,
    })
}

/// Distribute the deposited yield to series holders
pub async fn distribute(
    gateway: &Gateway,
    session: &WalletSession,
    trackers: &TrackerSet,
    series: Address,
) -> Result<H256> {
    session.ensure_chain()?;

    let distributor = gateway.distributor_signed(session)?;
    let receipt = gateway
        .execute(session, trackers, "distribute", distributor.distribute(series))
        .await?;

    Ok(receipt.transaction_hash)
}
