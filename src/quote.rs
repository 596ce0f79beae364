use crate::gateway::Gateway;
use crate::types::{DexError, PoolInfo, Quote, QuoteHop, Result};
use crate::utils;
use ethers::types::{Address, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Constant-product quoting, mirrored client-side so the UI can show an
/// instant estimate. The integer arithmetic (including truncation order)
/// matches the on-chain router exactly; any divergence there is a defect,
/// not a tolerance matter.
pub struct QuoteEngine;

impl QuoteEngine {
    /// amountOut = (amountIn * (10000 - feeBps) * reserveOut)
    ///           / (reserveIn * 10000 + amountIn * (10000 - feeBps))
    /// with truncating division, fee deducted from the input leg.
    pub fn get_amount_out(
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Result<U256> {
        if amount_in.is_zero() {
            return Err(DexError::InvalidAmount(
                "Amount in cannot be zero".to_string(),
            ));
        }
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(DexError::InsufficientLiquidity(
                "Pool has zero reserves".to_string(),
            ));
        }

        let fee_factor = U256::from(10000 - fee_bps);
        let fee_base = U256::from(10000);

        let amount_in_with_fee = amount_in
            .checked_mul(fee_factor)
            .ok_or(DexError::MathError)?;

        let numerator = amount_in_with_fee
            .checked_mul(reserve_out)
            .ok_or(DexError::MathError)?;

        let denominator = reserve_in
            .checked_mul(fee_base)
            .ok_or(DexError::MathError)?
            .checked_add(amount_in_with_fee)
            .ok_or(DexError::MathError)?;

        let amount_out = numerator
            .checked_div(denominator)
            .ok_or(DexError::MathError)?;

        if amount_out.is_zero() {
            return Err(DexError::InsufficientLiquidity(
                "Output amount would be zero".to_string(),
            ));
        }

        Ok(amount_out)
    }

    /// Inverse: required input for a wanted output. The router rounds this
    /// one up (+1), so the client does too.
    pub fn get_amount_in(
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Result<U256> {
        if amount_out.is_zero() {
            return Err(DexError::InvalidAmount(
                "Amount out cannot be zero".to_string(),
            ));
        }
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(DexError::InsufficientLiquidity(
                "Pool has zero reserves".to_string(),
            ));
        }
        if amount_out >= reserve_out {
            return Err(DexError::InsufficientLiquidity(
                "Amount out exceeds pool reserve".to_string(),
            ));
        }

        let fee_factor = U256::from(10000 - fee_bps);
        let fee_base = U256::from(10000);

        let numerator = reserve_in
            .checked_mul(amount_out)
            .ok_or(DexError::MathError)?
            .checked_mul(fee_base)
            .ok_or(DexError::MathError)?;

        let denominator = reserve_out
            .checked_sub(amount_out)
            .ok_or(DexError::MathError)?
            .checked_mul(fee_factor)
            .ok_or(DexError::MathError)?;

        numerator
            .checked_div(denominator)
            .and_then(|v| v.checked_add(U256::one()))
            .ok_or(DexError::MathError)
    }

    /// Price impact in basis points: deviation of the realized average price
    /// (amountOut/amountIn) from the marginal spot price (reserveOut/reserveIn)
    pub fn price_impact_bps(
        amount_in: U256,
        reserve_in: U256,
        amount_out: U256,
        reserve_out: U256,
    ) -> u32 {
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return 10000;
        }

        // impact = (amountIn*reserveOut - amountOut*reserveIn) / (amountIn*reserveOut)
        let numerator = match amount_in.checked_mul(reserve_out) {
            Some(spot) => match amount_out.checked_mul(reserve_in) {
                Some(realized) => spot.saturating_sub(realized),
                None => return 10000,
            },
            None => return 10000,
        };

        let denominator = match amount_in.checked_mul(reserve_out) {
            Some(v) if !v.is_zero() => v,
            _ => return 10000,
        };

        let impact = numerator
            .checked_mul(U256::from(10000))
            .and_then(|v| v.checked_div(denominator))
            .unwrap_or(U256::from(10000));

        impact.as_u32().min(10000)
    }

    /// Quote a full path against reserve snapshots, applying each hop's
    /// output as the next hop's input
    pub fn quote_path(
        amount_in: U256,
        path: &[Address],
        pools: &[PoolInfo],
        slippage_bps: u32,
    ) -> Result<Quote> {
        if path.len() < 2 {
            return Err(DexError::InvalidPath(format!(
                "path needs at least 2 tokens, got {}",
                path.len()
            )));
        }
        if pools.len() != path.len() - 1 {
            return Err(DexError::InvalidPath(format!(
                "path of {} tokens needs {} pools, got {}",
                path.len(),
                path.len() - 1,
                pools.len()
            )));
        }

        let mut hops = Vec::with_capacity(pools.len());
        let mut current_amount = amount_in;

        for (i, pool) in pools.iter().enumerate() {
            let token_in = path[i];
            let token_out = path[i + 1];

            let (reserve_in, reserve_out) = pool.get_reserves(&token_in).ok_or_else(|| {
                DexError::InvalidPath(format!(
                    "token {:#x} not in pool {:#x}",
                    token_in, pool.address
                ))
            })?;
            if pool.get_other_token(&token_in) != Some(token_out) {
                return Err(DexError::InvalidPath(format!(
                    "pool {:#x} does not pair {:#x} with {:#x}",
                    pool.address, token_in, token_out
                )));
            }

            let amount_out =
                Self::get_amount_out(current_amount, reserve_in, reserve_out, pool.fee_bps)?;

            hops.push(QuoteHop {
                pool: pool.address,
                token_in,
                token_out,
                amount_in: current_amount,
                amount_out,
                fee: utils::calculate_fee(current_amount, pool.fee_bps),
            });
            current_amount = amount_out;
        }

        let amount_out = current_amount;

        // single-hop impact is exact; multi-hop reports the first leg's
        // deviation compounded through the remaining hops' deviations
        let price_impact_bps = hops
            .iter()
            .map(|hop| {
                let pool = pools.iter().find(|p| p.address == hop.pool);
                match pool.and_then(|p| p.get_reserves(&hop.token_in)) {
                    Some((rin, rout)) => {
                        Self::price_impact_bps(hop.amount_in, rin, hop.amount_out, rout)
                    }
                    None => 10000,
                }
            })
            .fold(0u32, |acc, hop_bps| (acc + hop_bps).min(10000));

        let minimum_received = utils::apply_slippage(amount_out, slippage_bps);

        debug!(
            amount_in = %amount_in,
            amount_out = %amount_out,
            hops = hops.len(),
            impact_bps = price_impact_bps,
            "local quote"
        );

        Ok(Quote {
            amount_in,
            amount_out,
            path: path.to_vec(),
            hops,
            price_impact_bps,
            minimum_received,
        })
    }

    /// Fetch the router's authoritative quote and reconcile it with the local
    /// estimate. A divergence beyond `tolerance_bps` means the reserves moved
    /// under us: surface QuoteStale and force a refresh before submission.
    pub async fn verify(gateway: &Gateway, quote: &Quote, tolerance_bps: u32) -> Result<U256> {
        let amounts = gateway
            .get_amounts_out(quote.amount_in, quote.path.clone())
            .await?;
        let verified = *amounts
            .last()
            .ok_or_else(|| DexError::ContractError("empty getAmountsOut response".to_string()))?;

        if !Self::within_tolerance(quote.amount_out, verified, tolerance_bps) {
            return Err(DexError::QuoteStale {
                local: quote.amount_out,
                verified,
            });
        }
        Ok(verified)
    }

    /// |a - b| / max(a, b) <= tolerance_bps, in integer arithmetic
    pub fn within_tolerance(a: U256, b: U256, tolerance_bps: u32) -> bool {
        if a == b {
            return true;
        }
        let (larger, diff) = if a > b { (a, a - b) } else { (b, b - a) };
        if larger.is_zero() {
            return true;
        }
        match diff.checked_mul(U256::from(10000)) {
            Some(scaled) => scaled / larger <= U256::from(tolerance_bps),
            None => false,
        }
    }
}

/// Last-input-wins ordering for reactive recomputation: every keystroke
/// begins a new calculation with a fresh ticket, and a completed calculation
/// is accepted only if no newer one has begun since. A slow stale response
/// can never overwrite a fresher one.
#[derive(Debug, Default)]
pub struct QuoteSession {
    seq: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteTicket(u64);

impl QuoteSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new calculation, superseding any in flight
    pub fn begin(&self) -> QuoteTicket {
        QuoteTicket(self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// True if the ticket still represents the latest calculation
    pub fn is_current(&self, ticket: QuoteTicket) -> bool {
        self.seq.load(Ordering::SeqCst) == ticket.0
    }

    /// Gate a finished calculation: Some(result) only for the latest ticket
    pub fn accept<T>(&self, ticket: QuoteTicket, result: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(result)
        } else {
            debug!("discarding superseded quote result");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(reserve0: u64, reserve1: u64) -> PoolInfo {
        PoolInfo {
            address: Address::from_low_u64_be(100),
            token0: Address::from_low_u64_be(1),
            token1: Address::from_low_u64_be(2),
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
            fee_bps: 30,
            block_number: 0,
        }
    }

    #[test]
    fn test_exact_constant_product_output() {
        // (10 * 9970 * 2000) / (1000 * 10000 + 10 * 9970) = 199400000 / 10099700
        // = 19.74... which truncates to 19
        let out = QuoteEngine::get_amount_out(
            U256::from(10u64),
            U256::from(1000u64),
            U256::from(2000u64),
            30,
        )
        .unwrap();
        assert_eq!(out, U256::from(19u64));
    }

    #[test]
    fn test_fee_monotonicity() {
        // with-fee output is strictly below the no-fee constant-product output
        let amount_in = U256::from(1_000_000u64);
        let reserve_in = U256::from(100_000_000u64);
        let reserve_out = U256::from(200_000_000u64);

        let with_fee =
            QuoteEngine::get_amount_out(amount_in, reserve_in, reserve_out, 30).unwrap();
        let no_fee = QuoteEngine::get_amount_out(amount_in, reserve_in, reserve_out, 0).unwrap();
        assert!(with_fee < no_fee);

        // and below the naive spot-price output
        let spot = amount_in * reserve_out / reserve_in;
        assert!(with_fee < spot);
        assert!(with_fee > U256::zero());
    }

    #[test]
    fn test_round_trip_loses_value() {
        let reserve_a = U256::from(1_000_000_000u64);
        let reserve_b = U256::from(2_000_000_000u64);
        let amount_in = U256::from(5_000_000u64);

        let out = QuoteEngine::get_amount_out(amount_in, reserve_a, reserve_b, 30).unwrap();
        // swap back through the post-trade reserves
        let back = QuoteEngine::get_amount_out(
            out,
            reserve_b - out,
            reserve_a + amount_in,
            30,
        )
        .unwrap();
        assert!(back <= amount_in);
    }

    #[test]
    fn test_zero_reserves_fail_with_insufficient_liquidity() {
        for (rin, rout) in [(0u64, 2000u64), (1000, 0), (0, 0)] {
            let result = QuoteEngine::get_amount_out(
                U256::from(10u64),
                U256::from(rin),
                U256::from(rout),
                30,
            );
            assert!(matches!(result, Err(DexError::InsufficientLiquidity(_))));
        }
    }

    #[test]
    fn test_zero_amount_rejected() {
        let result = QuoteEngine::get_amount_out(
            U256::zero(),
            U256::from(1000u64),
            U256::from(2000u64),
            30,
        );
        assert!(matches!(result, Err(DexError::InvalidAmount(_))));
    }

    #[test]
    fn test_get_amount_in_rounds_up() {
        let reserve_in = U256::from(1000u64);
        let reserve_out = U256::from(2000u64);

        let required =
            QuoteEngine::get_amount_in(U256::from(19u64), reserve_in, reserve_out, 30).unwrap();
        // feeding the required input back in must reach at least the target
        let out = QuoteEngine::get_amount_out(required, reserve_in, reserve_out, 30).unwrap();
        assert!(out >= U256::from(19u64));

        // asking for the whole reserve is unfillable
        assert!(matches!(
            QuoteEngine::get_amount_in(reserve_out, reserve_in, reserve_out, 30),
            Err(DexError::InsufficientLiquidity(_))
        ));
    }

    #[test]
    fn test_quote_path_single_hop() {
        let p = pool(1000, 2000);
        let path = [p.token0, p.token1];

        let quote = QuoteEngine::quote_path(U256::from(10u64), &path, &[p], 50).unwrap();
        assert_eq!(quote.amount_out, U256::from(19u64));
        assert_eq!(quote.hop_count(), 1);
        // floor(19 * 9950 / 10000) = 18
        assert_eq!(quote.minimum_received, U256::from(18u64));
        assert!(quote.price_impact_bps > 0);
        assert!(quote.minimum_received <= quote.amount_out);
    }

    #[test]
    fn test_quote_path_multi_hop_feeds_sequentially() {
        let t1 = Address::from_low_u64_be(1);
        let t2 = Address::from_low_u64_be(2);
        let t3 = Address::from_low_u64_be(3);

        let p1 = PoolInfo {
            address: Address::from_low_u64_be(100),
            token0: t1,
            token1: t2,
            reserve0: U256::from(1_000_000u64),
            reserve1: U256::from(2_000_000u64),
            fee_bps: 30,
            block_number: 0,
        };
        let p2 = PoolInfo {
            address: Address::from_low_u64_be(101),
            token0: t2,
            token1: t3,
            reserve0: U256::from(2_000_000u64),
            reserve1: U256::from(3_000_000u64),
            fee_bps: 30,
            block_number: 0,
        };

        let amount_in = U256::from(1000u64);
        let quote =
            QuoteEngine::quote_path(amount_in, &[t1, t2, t3], &[p1.clone(), p2.clone()], 50)
                .unwrap();

        let first = QuoteEngine::get_amount_out(
            amount_in,
            p1.reserve0,
            p1.reserve1,
            30,
        )
        .unwrap();
        let second = QuoteEngine::get_amount_out(first, p2.reserve0, p2.reserve1, 30).unwrap();

        assert_eq!(quote.hops[0].amount_out, first);
        assert_eq!(quote.hops[1].amount_in, first);
        assert_eq!(quote.amount_out, second);
    }

    #[test]
    fn test_quote_path_rejects_short_path() {
        let p = pool(1000, 2000);
        let result = QuoteEngine::quote_path(U256::from(10u64), &[p.token0], &[], 50);
        assert!(matches!(result, Err(DexError::InvalidPath(_))));
    }

    #[test]
    fn test_quote_path_rejects_mismatched_pool() {
        let p = pool(1000, 2000);
        let stranger = Address::from_low_u64_be(9);
        let result = QuoteEngine::quote_path(U256::from(10u64), &[p.token0, stranger], &[p], 50);
        assert!(matches!(result, Err(DexError::InvalidPath(_))));
    }

    #[test]
    fn test_within_tolerance() {
        assert!(QuoteEngine::within_tolerance(
            U256::from(10000u64),
            U256::from(10000u64),
            0
        ));
        assert!(QuoteEngine::within_tolerance(
            U256::from(10000u64),
            U256::from(9991u64),
            10
        ));
        assert!(!QuoteEngine::within_tolerance(
            U256::from(10000u64),
            U256::from(9900u64),
            10
        ));
    }

    #[test]
    fn test_reserve_drift_during_approval_wait_exceeds_tolerance() {
        // a swap's approve leg can sit on a wallet prompt and a block
        // confirmation; the figure quoted before that wait no longer matches
        // what the router returns once the reserves have moved
        let amount_in = U256::from(1_000u64);
        let quoted = QuoteEngine::get_amount_out(
            amount_in,
            U256::from(100_000u64),
            U256::from(200_000u64),
            30,
        )
        .unwrap();

        // a large trade lands in the pool while waiting
        let router_now = QuoteEngine::get_amount_out(
            amount_in,
            U256::from(120_000u64),
            U256::from(167_000u64),
            30,
        )
        .unwrap();

        assert!(!QuoteEngine::within_tolerance(quoted, router_now, 10));

        // recomputing from the moved reserves brings the figures back in line
        let requoted = QuoteEngine::get_amount_out(
            amount_in,
            U256::from(120_000u64),
            U256::from(167_000u64),
            30,
        )
        .unwrap();
        assert!(QuoteEngine::within_tolerance(requoted, router_now, 10));
    }

    #[test]
    fn test_quote_session_last_input_wins() {
        let session = QuoteSession::new();

        let first = session.begin();
        let second = session.begin();

        // the slow, superseded calculation is discarded at completion
        assert_eq!(session.accept(first, 1u32), None);
        // the latest one lands
        assert_eq!(session.accept(second, 2u32), Some(2u32));

        // a third edit supersedes the second
        let third = session.begin();
        assert!(!session.is_current(second));
        assert!(session.is_current(third));
    }
}
