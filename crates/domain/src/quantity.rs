//! Decoding of the hex quantities the provider uses for heights and values.
//!
//! One rule applies everywhere: an optional `0x`/`0X` prefix is stripped and
//! the remainder must be a non-empty run of hex digits, read in base 16.

use num_bigint::BigUint;
use thiserror::Error;

use crate::model::BlockHeight;

/// Errors emitted when a quantity string does not follow the hex rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity `{0}` has no digits")]
    Empty(String),
    #[error("quantity `{0}` contains non-hex characters")]
    NonHex(String),
    #[error("quantity `{0}` does not fit into a block height")]
    Overflow(String),
}

fn hex_digits(raw: &str) -> Result<&str, QuantityError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(QuantityError::Empty(raw.to_string()));
    }

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(QuantityError::NonHex(raw.to_string()));
    }

    Ok(digits)
}

/// Decodes an arbitrary-precision, non-negative hex quantity.
pub fn parse_quantity(raw: &str) -> Result<BigUint, QuantityError> {
    let digits = hex_digits(raw)?;
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| QuantityError::NonHex(raw.to_string()))
}

/// Decodes a hex block height such as the chain tip returned by the provider.
pub fn parse_height(raw: &str) -> Result<BlockHeight, QuantityError> {
    let digits = hex_digits(raw)?;
    u64::from_str_radix(digits, 16).map_err(|_| QuantityError::Overflow(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_and_bare_digits_decode_the_same() {
        let prefixed = parse_quantity("0x6f05b59d3b20000").unwrap();
        let bare = parse_quantity("6f05b59d3b20000").unwrap();
        assert_eq!(prefixed, bare);
        assert_eq!(prefixed.to_string(), "500000000000000000");
        assert_eq!(parse_quantity("0XFF").unwrap(), BigUint::from(255u32));
    }

    #[test]
    fn odd_length_and_zero_are_accepted() {
        assert_eq!(parse_quantity("0x0").unwrap(), BigUint::from(0u32));
        assert_eq!(parse_quantity("0xabc").unwrap(), BigUint::from(0xabcu32));
    }

    #[test]
    fn quantities_beyond_u128_keep_precision() {
        let value = parse_quantity("0x1000000000000000000000000000000000").unwrap();
        assert_eq!(value, BigUint::from(1u8) << 132u32);
    }

    #[test]
    fn malformed_quantities_are_rejected() {
        assert_eq!(parse_quantity(""), Err(QuantityError::Empty(String::new())));
        assert_eq!(parse_quantity("0x"), Err(QuantityError::Empty("0x".into())));
        assert_eq!(parse_quantity("0xzz"), Err(QuantityError::NonHex("0xzz".into())));
        assert_eq!(parse_quantity("-0x1"), Err(QuantityError::NonHex("-0x1".into())));
        assert_eq!(parse_quantity("0x_1"), Err(QuantityError::NonHex("0x_1".into())));
    }

    #[test]
    fn heights_decode_and_overflow() {
        assert_eq!(parse_height("0x10d4f").unwrap(), 68943);
        assert_eq!(
            parse_height("0x10000000000000000"),
            Err(QuantityError::Overflow("0x10000000000000000".into()))
        );
    }
}
