//! Fixed-point helpers
//!
//! All percentage math multiplies first and divides last. Every step is
//! checked; an overflow surfaces as `LedgerError::Overflow` instead of
//! wrapping. Products wider than 128 bits fall back to a 256-bit
//! intermediate so that `balance × weight / total` stays exact for large
//! pools.

use lib_types::{Amount, Bps, BPS_DENOMINATOR};

use crate::errors::{LedgerError, LedgerResult};

/// `amount × bps / 10000`, truncated
pub fn bps_of(amount: Amount, bps: Bps) -> LedgerResult<Amount> {
    mul_div(amount, Amount::from(bps), BPS_DENOMINATOR)
}

/// `amount × pct / 100`, truncated
pub fn pct_of(amount: Amount, pct: u32) -> LedgerResult<Amount> {
    mul_div(amount, Amount::from(pct), 100)
}

/// `a × b / c`, truncated, without intermediate overflow
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> LedgerResult<Amount> {
    if c == 0 {
        return Err(LedgerError::Overflow("division by zero"));
    }
    match a.checked_mul(b) {
        Some(product) => Ok(product / c),
        None => wide_mul_div(a, b, c).ok_or(LedgerError::Overflow("mul_div")),
    }
}

/// `a × b / c`, rounded up
pub fn mul_div_ceil(a: Amount, b: Amount, c: Amount) -> LedgerResult<Amount> {
    let floor = mul_div(a, b, c)?;
    // floor × c <= a × b, so the product is exact iff floor × c == a × b
    let exact = match (a.checked_mul(b), floor.checked_mul(c)) {
        (Some(product), Some(back)) => product == back,
        _ => widening_mul(a, b) == widening_mul(floor, c),
    };
    if exact {
        Ok(floor)
    } else {
        checked_add(floor, 1, "mul_div_ceil")
    }
}

pub fn checked_add(a: Amount, b: Amount, context: &'static str) -> LedgerResult<Amount> {
    a.checked_add(b).ok_or(LedgerError::Overflow(context))
}

pub fn checked_sub(a: Amount, b: Amount, context: &'static str) -> LedgerResult<Amount> {
    a.checked_sub(b).ok_or(LedgerError::Overflow(context))
}

/// `10^exp` as an amount
pub fn pow10(exp: u32) -> LedgerResult<Amount> {
    10u128.checked_pow(exp).ok_or(LedgerError::Overflow("pow10"))
}

/// Full 256-bit product as `(high, low)` halves
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let low = (ll & MASK) | (mid << 64);
    let high = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (high, low)
}

/// Binary long division of a 256-bit product by a 128-bit divisor.
/// Returns `None` when the quotient does not fit in 128 bits.
fn wide_mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    let (high, low) = widening_mul(a, b);
    if high >= c {
        return None;
    }

    // Invariant: rem < c at the top of every iteration
    let mut rem = high;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((low >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    Some(quotient)
}
