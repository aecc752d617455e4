//! U256 arithmetic for slice pricing.
//!
//! All divisions truncate, matching on-chain integer semantics.

use alloy::primitives::U256;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Exclusive upper bound for the configurable deviation tolerance (20%).
pub const MAX_DEVIATION_CEILING_BPS: u16 = 2000;

/// Power of 10, or `None` if it does not fit in a U256 (exp > 77).
#[inline]
pub fn pow10(exp: u8) -> Option<U256> {
    if exp < 20 {
        return Some(U256::from(10u64.pow(exp as u32)));
    }
    U256::from(10u64).checked_pow(U256::from(exp))
}

/// Apply basis points reduction.
/// Returns: value * (10000 - basis_points) / 10000, or `None` on overflow.
///
/// Example: apply_basis_points(1000, 100) = 990 (1% reduction)
#[inline]
pub fn apply_basis_points(value: U256, basis_points: u16) -> Option<U256> {
    let factor = U256::from(10000u16.saturating_sub(basis_points));
    value.checked_mul(factor).map(|v| v / BPS_DENOMINATOR)
}

/// Lowest `min_out` a keeper may authorize for a best quote.
#[inline]
pub fn min_out_floor(best_quote: U256, max_deviation_bps: u16) -> Option<U256> {
    apply_basis_points(best_quote, max_deviation_bps)
}

/// Oracle-implied output: amount_in * price / 10^decimals.
///
/// Returns zero when the scale does not fit in a U256 and `None` when the
/// product overflows.
#[inline]
pub fn expected_output(amount_in: U256, price: U256, decimals: u8) -> Option<U256> {
    let product = amount_in.checked_mul(price)?;
    Some(match pow10(decimals) {
        Some(scale) => product / scale,
        None => U256::ZERO,
    })
}

/// Absolute deviation of `realized` from `expected` in basis points.
///
/// Zero when `expected` is zero. Saturates at `u64::MAX`.
#[inline]
pub fn deviation_bps(expected: U256, realized: U256) -> u64 {
    if expected.is_zero() {
        return 0;
    }
    let diff = if realized >= expected {
        realized - expected
    } else {
        expected - realized
    };
    let bps = diff.saturating_mul(BPS_DENOMINATOR) / expected;
    bps.try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_basis_points() {
        let value = U256::from(1000u64);
        assert_eq!(apply_basis_points(value, 100), Some(U256::from(990u64)));
        assert_eq!(apply_basis_points(value, 1000), Some(U256::from(900u64)));
        assert_eq!(apply_basis_points(value, 0), Some(value));
        assert_eq!(apply_basis_points(U256::MAX, 100), None);
    }

    #[test]
    fn test_min_out_floor() {
        // 500 bps on 10000 => 9500
        assert_eq!(
            min_out_floor(U256::from(10000u64), 500),
            Some(U256::from(9500u64))
        );
        // Truncates
        assert_eq!(min_out_floor(U256::from(999u64), 1), Some(U256::from(998u64)));
    }

    #[test]
    fn test_expected_output() {
        // 100 units at 20.00 (2000 with 2 decimals) => 2000
        assert_eq!(
            expected_output(U256::from(100u64), U256::from(2000u64), 2),
            Some(U256::from(2000u64))
        );
        // Truncates to zero for dust
        assert_eq!(
            expected_output(U256::from(1u64), U256::from(5u64), 8),
            Some(U256::ZERO)
        );
        // Scale beyond U256 collapses to zero
        assert_eq!(
            expected_output(U256::from(1u64), U256::from(1u64), 200),
            Some(U256::ZERO)
        );
        assert_eq!(expected_output(U256::MAX, U256::from(2u64), 0), None);
    }

    #[test]
    fn test_deviation_bps() {
        assert_eq!(deviation_bps(U256::from(2000u64), U256::from(1900u64)), 500);
        assert_eq!(deviation_bps(U256::from(2000u64), U256::from(2100u64)), 500);
        assert_eq!(deviation_bps(U256::from(2000u64), U256::from(2000u64)), 0);
        assert_eq!(deviation_bps(U256::ZERO, U256::from(5u64)), 0);
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), Some(U256::from(1u64)));
        assert_eq!(pow10(6), Some(U256::from(1_000_000u64)));
        assert_eq!(pow10(18), Some(U256::from(1_000_000_000_000_000_000u64)));
        assert_eq!(
            pow10(24),
            Some(U256::from(1_000_000_000_000_000_000_000_000u128))
        );
        assert!(pow10(77).is_some());
        assert_eq!(pow10(78), None);
    }
}
