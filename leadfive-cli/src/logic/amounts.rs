//! Decimal token amounts and addresses from operator input

use lib_compensation::{Address, Amount};

use crate::error::{CliError, CliResult};

fn invalid(input: &str, reason: &str) -> CliError {
    CliError::InvalidAmount {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `"12.5"` into base units at `decimals` precision
pub fn parse_amount(input: &str, decimals: u8) -> CliResult<Amount> {
    let trimmed = input.trim().replace('_', "");
    if trimmed.is_empty() {
        return Err(invalid(input, "empty"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => {
            if fraction.contains('.') {
                return Err(invalid(input, "more than one decimal point"));
            }
            (whole, fraction)
        }
        None => (trimmed.as_str(), ""),
    };
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits_only(whole) || !digits_only(fraction) || (whole.is_empty() && fraction.is_empty()) {
        return Err(invalid(input, "expected a non-negative decimal number"));
    }
    if fraction.len() > usize::from(decimals) {
        return Err(invalid(input, &format!("at most {} decimal places", decimals)));
    }

    let unit = 10u128
        .checked_pow(u32::from(decimals))
        .ok_or_else(|| invalid(input, "precision too large"))?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| invalid(input, "too large"))?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = usize::from(decimals));
        padded.parse::<u128>().map_err(|_| invalid(input, "too large"))?
    };

    whole_units
        .checked_mul(unit)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(|| invalid(input, "too large"))
}

/// Render base units as a decimal string with trailing zeros trimmed
pub fn format_amount(amount: Amount, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let unit = match 10u128.checked_pow(u32::from(decimals)) {
        Some(unit) => unit,
        None => return amount.to_string(),
    };
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction, width = usize::from(decimals));
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

pub fn parse_address(input: &str) -> CliResult<Address> {
    input.trim().parse::<Address>().map_err(|e| CliError::InvalidAddress {
        input: input.to_string(),
        reason: e.to_string(),
    })
}
