//! Fixed-point token amounts.
//!
//! Amounts are unsigned 256-bit integers of base units; one whole token is
//! `10^DECIMALS` units.

use primitive_types::U256;

pub type Amount = U256;

pub const DECIMALS: u8 = 18;

/// `10^18` base units.
pub const ONE_TOKEN: Amount = U256([1_000_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,
    #[error("invalid character in amount {0:?}")]
    InvalidDigit(String),
    #[error("more than 18 fractional digits in {0:?}")]
    TooPrecise(String),
    #[error("amount {0:?} does not fit in 256 bits")]
    Overflow(String),
}

/// Whole tokens to base units.
pub fn tokens(whole: u64) -> Amount {
    U256::from(whole) * ONE_TOKEN
}

/// Parse a decimal token amount such as `"1714285714"` or `"0.25"` into
/// base units.
pub fn parse_units(input: &str) -> Result<Amount, UnitsError> {
    let s = input.trim().replace('_', "");
    if s.is_empty() {
        return Err(UnitsError::Empty);
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s.as_str(), ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(UnitsError::Empty);
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(UnitsError::InvalidDigit(input.to_string()));
    }
    if frac_part.len() > DECIMALS as usize {
        return Err(UnitsError::TooPrecise(input.to_string()));
    }

    let mut digits = String::with_capacity(int_part.len() + DECIMALS as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    digits.extend(std::iter::repeat('0').take(DECIMALS as usize - frac_part.len()));
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Amount::zero());
    }
    U256::from_dec_str(digits).map_err(|_| UnitsError::Overflow(input.to_string()))
}

/// Render base units as a decimal token amount, trailing zeros trimmed.
pub fn format_units(amount: Amount) -> String {
    let (whole, frac) = amount.div_mod(ONE_TOKEN);
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = DECIMALS as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Serde adapter writing amounts as decimal token strings (`"0.25"`).
/// The conversion is exact at 18 decimals.
pub mod serde_tokens {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{format_units, parse_units, Amount};

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_units(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        parse_units(&encoded).map_err(D::Error::custom)
    }
}
