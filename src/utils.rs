use crate::types::{DexError, Result};
use ethers::types::{Address, U256};
use std::str::FromStr;

/// Sort a token pair into the canonical on-chain ordering (ascending by
/// address), matching how the factory keys its pair lookup
pub fn sort_tokens(token_a: Address, token_b: Address) -> (Address, Address) {
    if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

/// Calculate the fee amount taken from an input amount
pub fn calculate_fee(amount: U256, fee_bps: u32) -> U256 {
    amount
        .checked_mul(U256::from(fee_bps))
        .and_then(|v| v.checked_div(U256::from(10000)))
        .unwrap_or(U256::zero())
}

/// Apply a slippage tolerance to an amount, rounding down.
/// Floor rounding keeps the result at or below what the router computes,
/// so a submitted minimum never triggers a spurious revert.
pub fn apply_slippage(amount: U256, slippage_bps: u32) -> U256 {
    let keep = U256::from(10000u64.saturating_sub(slippage_bps as u64));
    amount
        .checked_mul(keep)
        .and_then(|v| v.checked_div(U256::from(10000)))
        .unwrap_or(U256::zero())
}

/// 10^decimals as a 256-bit integer. Clamped at 10^77, the largest power of
/// ten that fits; token metadata is an unvalidated on-chain read and a bogus
/// decimals value must not panic the caller.
pub fn pow10(decimals: u8) -> U256 {
    U256::exp10(decimals.min(77) as usize)
}

/// Parse a token amount string with decimal support into base units.
/// Examples: "1.0", "0.5", "1000"
pub fn parse_token_amount(amount_str: &str, decimals: u8) -> Result<U256> {
    let parts: Vec<&str> = amount_str.split('.').collect();

    if parts.is_empty() || parts.len() > 2 {
        return Err(DexError::ParseError(format!(
            "Invalid amount format: {}",
            amount_str
        )));
    }

    let integer_part = U256::from_dec_str(parts[0])
        .map_err(|_| DexError::ParseError(format!("Invalid integer part: {}", parts[0])))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.len() > decimals as usize {
            return Err(DexError::ParseError(format!(
                "Too many decimal places. Max: {}",
                decimals
            )));
        }
        // Pad with zeros to reach full decimals
        let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
        U256::from_dec_str(&padded)
            .map_err(|_| DexError::ParseError(format!("Invalid decimal part: {}", dec_str)))?
    } else {
        U256::zero()
    };

    integer_part
        .checked_mul(pow10(decimals))
        .and_then(|v| v.checked_add(decimal_part))
        .ok_or(DexError::MathError)
}

/// Format a base-unit token amount for display
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = pow10(decimals);
    let integer_part = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        return format!("{}", integer_part);
    }

    let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
    let trimmed = decimal_str.trim_end_matches('0');

    if trimmed.is_empty() {
        format!("{}", integer_part)
    } else {
        format!("{}.{}", integer_part, trimmed)
    }
}

/// Parse an Ethereum address from string
pub fn parse_address(addr_str: &str) -> Result<Address> {
    Address::from_str(addr_str).map_err(|_| DexError::InvalidTokenAddress(addr_str.to_string()))
}

/// Shortened address for table output: 0x1234..abcd
pub fn short_address(addr: &Address) -> String {
    let full = format!("{:#x}", addr);
    format!("{}..{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_tokens() {
        let a = Address::from_low_u64_be(2);
        let b = Address::from_low_u64_be(1);
        assert_eq!(sort_tokens(a, b), (b, a));
        assert_eq!(sort_tokens(b, a), (b, a));
    }

    #[test]
    fn test_apply_slippage_floor() {
        // 50 bps off 19 floors to 18, never rounds up
        assert_eq!(apply_slippage(U256::from(19u64), 50), U256::from(18u64));
        assert_eq!(apply_slippage(U256::from(10000u64), 50), U256::from(9950u64));
        assert_eq!(apply_slippage(U256::from(100u64), 0), U256::from(100u64));
        assert_eq!(apply_slippage(U256::from(100u64), 10000), U256::zero());
    }

    #[test]
    fn test_calculate_fee() {
        assert_eq!(calculate_fee(U256::from(10000u64), 30), U256::from(30u64));
    }

    #[test]
    fn test_parse_token_amount() {
        let amount = parse_token_amount("1.0", 18).unwrap();
        assert_eq!(amount, U256::from(1_000_000_000_000_000_000u128));

        let amount = parse_token_amount("0.5", 18).unwrap();
        assert_eq!(amount, U256::from(500_000_000_000_000_000u128));

        let amount = parse_token_amount("1000", 6).unwrap();
        assert_eq!(amount, U256::from(1_000_000_000u128));

        assert!(parse_token_amount("1.2345678", 6).is_err());
        assert!(parse_token_amount("not-a-number", 18).is_err());
    }

    #[test]
    fn test_extreme_decimals_do_not_panic() {
        // decimals is an unvalidated on-chain read; u8::MAX must stay safe
        assert_eq!(format_token_amount(U256::zero(), 255), "0");
        let _ = format_token_amount(U256::MAX, 255);
        assert_eq!(
            parse_token_amount("1", 40).unwrap(),
            U256::exp10(40)
        );
        assert!(matches!(
            parse_token_amount("2", 255),
            Err(DexError::MathError)
        ));
    }

    #[test]
    fn test_format_token_amount() {
        let amount = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_token_amount(amount, 18), "1");

        let amount = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_token_amount(amount, 18), "1.5");

        let amount = U256::from(1_234_560_000_000_000_000u128);
        assert_eq!(format_token_amount(amount, 18), "1.23456");
    }

    #[test]
    fn test_short_address() {
        let addr = Address::from_low_u64_be(0xabcd);
        assert_eq!(short_address(&addr), "0x0000..abcd");
    }
}
