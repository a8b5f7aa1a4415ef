/*
 * Unit conversion and price arithmetic helpers
 */

use ethers::types::{U256, U512};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;
use std::str::FromStr;
use crate::models::{MegadromeError, Result};

const DECIMAL_MAX_DIGITS: usize = 28;
const RATIO_SCALE: u32 = 18;

/// Converts a human amount such as `"2.5"` to base units. Digits beyond
/// `decimals` are rounded half-up. Anything that is not a plain non-negative
/// decimal number yields zero.
#[must_use]
pub fn parse_units(amount: &str, decimals: u8) -> U256 {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return U256::zero();
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return U256::zero();
    }

    let decimals = usize::from(decimals);
    let (kept, dropped) = if frac_part.len() > decimals {
        frac_part.split_at(decimals)
    } else {
        (frac_part, "")
    };

    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    digits.push_str(kept);
    digits.extend(std::iter::repeat('0').take(decimals - kept.len()));
    let digits = digits.trim_start_matches('0');

    let mut value = if digits.is_empty() {
        U256::zero()
    } else {
        match U256::from_dec_str(digits) {
            Ok(v) => v,
            Err(_) => return U256::zero(),
        }
    };

    if dropped.bytes().next().is_some_and(|b| b >= b'5') {
        value = value.saturating_add(U256::one());
    }
    value
}

/// Formats base units as a human amount with trailing zeros removed.
#[must_use]
pub fn format_units(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Converts base units to a `Decimal` in human units, dropping fractional
/// digits that do not fit into `Decimal`'s precision.
pub fn to_decimal(amount: U256, decimals: u8) -> Result<Decimal> {
    let human = format_units(amount, decimals);
    let (int_part, frac_part) = human.split_once('.').unwrap_or((human.as_str(), ""));

    if int_part.len() > DECIMAL_MAX_DIGITS {
        return Err(MegadromeError::CalculationError(format!(
            "Amount {human} exceeds decimal precision"
        )));
    }
    let room = DECIMAL_MAX_DIGITS - int_part.len();
    let frac_part = &frac_part[..frac_part.len().min(room)];

    let text = if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    };
    Decimal::from_str(&text)
        .map_err(|e| MegadromeError::CalculationError(format!("Failed to parse amount: {e}")))
}

fn to_biguint(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

/// Price impact in percent of a trade relative to a unit probe:
/// `|1 - effective / spot| * 100` where `effective` is the trade's output
/// scaled to the probe's input size. Zero whenever a signal is missing.
#[must_use]
pub fn price_impact_percent(
    amount_in: U256,
    amount_out: U256,
    probe_in: U256,
    probe_out: U256,
) -> Decimal {
    if amount_in.is_zero() || amount_out.is_zero() || probe_in.is_zero() || probe_out.is_zero() {
        return Decimal::ZERO;
    }

    // effective / spot = (amount_out * probe_in) / (amount_in * probe_out)
    let numerator = to_biguint(amount_out) * to_biguint(probe_in);
    let denominator = to_biguint(amount_in) * to_biguint(probe_out);
    if denominator.is_zero() {
        return Decimal::ZERO;
    }

    let scale = BigUint::from(10u32).pow(RATIO_SCALE);
    let ratio_scaled = numerator * &scale / denominator;
    let Some(ratio_scaled) = ratio_scaled.to_i128() else {
        // Effective rate astronomically above spot; report the cap.
        return Decimal::MAX;
    };
    let Ok(ratio) = Decimal::try_from_i128_with_scale(ratio_scaled, RATIO_SCALE) else {
        return Decimal::MAX;
    };

    ((Decimal::ONE - ratio) * Decimal::ONE_HUNDRED).abs()
}

/// Minimum output accepted on-chain:
/// `quoted * floor((100 - slippage) * 100) / 10000`.
#[must_use]
pub fn minimum_received(quoted_out: U256, slippage_percent: Decimal) -> U256 {
    let keep_bps = ((Decimal::ONE_HUNDRED - slippage_percent) * Decimal::ONE_HUNDRED)
        .floor()
        .to_u64()
        .unwrap_or(0)
        .min(10_000);
    let scaled = quoted_out.full_mul(U256::from(keep_bps)) / U512::from(10_000u64);
    U256::try_from(scaled).unwrap_or(quoted_out)
}
