//! Liftplan rows to and from the `"0xNN"` strings the loom stores.
//!
//! Bit `i` of a row byte is shaft `i + 1`: shaft 1 is the least significant
//! bit, so shafts 1 and 3 lifted encode as `0x05`.

use crate::{
    domain::{Row, SHAFT_COUNT},
    error::ValidationError,
};

const HEX_PREFIX: &str = "0x";

pub fn row_to_byte(row: &Row) -> u8 {
    row.0
        .iter()
        .enumerate()
        .filter(|(_, lifted)| **lifted)
        .fold(0u8, |byte, (shaft, _)| byte | (1 << shaft))
}

pub fn byte_to_row(byte: u8) -> Row {
    let mut bits = [false; SHAFT_COUNT];
    for (shaft, bit) in bits.iter_mut().enumerate() {
        *bit = byte & (1 << shaft) != 0;
    }
    Row(bits)
}

pub fn encode_row(row: &Row) -> String {
    format!("{HEX_PREFIX}{:02x}", row_to_byte(row))
}

/// Accepts `0x`/`0X` prefixed or bare hex, either case. Anything that does
/// not fit in one byte is rejected.
pub fn decode_row(hex: &str) -> Result<Row, ValidationError> {
    let invalid = || ValidationError::InvalidHexByte {
        value: hex.to_string(),
    };
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix(HEX_PREFIX)
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let significant = digits.trim_start_matches('0');
    if significant.len() > 2 {
        return Err(invalid());
    }
    let byte = if significant.is_empty() {
        0
    } else {
        u8::from_str_radix(significant, 16).map_err(|_| invalid())?
    };
    Ok(byte_to_row(byte))
}

pub fn encode_plan(rows: &[Row]) -> Vec<String> {
    rows.iter().map(encode_row).collect()
}

pub fn decode_plan<S: AsRef<str>>(hexes: &[S]) -> Result<Vec<Row>, ValidationError> {
    hexes
        .iter()
        .enumerate()
        .map(|(row, hex)| {
            decode_row(hex.as_ref()).map_err(|_| ValidationError::InvalidPlanRow {
                row,
                value: hex.as_ref().to_string(),
            })
        })
        .collect()
}
