//! Numeric vector codecs
//!
//! Two textual encodings are used inside XDRZ documents: comma-separated
//! decimal lists for small vectors (matrix coefficients, per-channel
//! statistics) and Base64 of little-endian native arrays for the large
//! spline vectors. Rust's shortest-round-trip float formatting keeps the
//! comma-separated form bit-exact across a serialize/parse cycle.

use base64::prelude::*;
use byteorder::{ByteOrder, LittleEndian};

use super::DrizzleError;

/// Format a slice of reals as a comma-separated list.
pub(crate) fn to_comma_separated(values: &[f64]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out
}

/// Parse a comma-separated list of reals, requiring at least `min_count`
/// items.
pub(crate) fn parse_comma_separated(text: &str, min_count: usize) -> Result<Vec<f64>, DrizzleError> {
    let mut values = Vec::new();
    for item in text.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let v: f64 = item
            .parse()
            .map_err(|_| DrizzleError::InvalidData(format!("Invalid numeric literal '{}'", item)))?;
        values.push(v);
    }
    if values.len() < min_count {
        return Err(DrizzleError::InvalidData(format!(
            "Expected at least {} numeric items, got {}",
            min_count,
            values.len()
        )));
    }
    Ok(values)
}

/// Parse a comma-separated list of integers.
pub(crate) fn parse_comma_separated_ints(
    text: &str,
    min_count: usize,
) -> Result<Vec<i64>, DrizzleError> {
    let mut values = Vec::new();
    for item in text.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let v: i64 = item
            .parse()
            .map_err(|_| DrizzleError::InvalidData(format!("Invalid integer literal '{}'", item)))?;
        values.push(v);
    }
    if values.len() < min_count {
        return Err(DrizzleError::InvalidData(format!(
            "Expected at least {} integer items, got {}",
            min_count,
            values.len()
        )));
    }
    Ok(values)
}

/// Base64 of a little-endian `f64` array.
pub(crate) fn to_base64_f64(values: &[f64]) -> String {
    let mut bytes = vec![0u8; values.len() * 8];
    LittleEndian::write_f64_into(values, &mut bytes);
    BASE64_STANDARD.encode(bytes)
}

/// Base64 of a little-endian `f32` array.
pub(crate) fn to_base64_f32(values: &[f32]) -> String {
    let mut bytes = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut bytes);
    BASE64_STANDARD.encode(bytes)
}

/// Raw bytes from a Base64 payload, tolerating embedded whitespace (long
/// payloads are often line-wrapped by other writers).
pub(crate) fn from_base64(text: &str) -> Result<Vec<u8>, DrizzleError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(BASE64_STANDARD.decode(compact)?)
}

/// Decode a Base64-encoded little-endian `f64` array.
pub(crate) fn parse_base64_f64(text: &str) -> Result<Vec<f64>, DrizzleError> {
    let bytes = from_base64(text)?;
    if bytes.len() % 8 != 0 {
        return Err(DrizzleError::InvalidData(format!(
            "Invalid binary vector length: {} bytes is not a whole number of 64-bit items",
            bytes.len()
        )));
    }
    let mut values = vec![0f64; bytes.len() / 8];
    LittleEndian::read_f64_into(&bytes, &mut values);
    Ok(values)
}

/// Decode a Base64-encoded little-endian `f32` array.
pub(crate) fn parse_base64_f32(text: &str) -> Result<Vec<f32>, DrizzleError> {
    let bytes = from_base64(text)?;
    if bytes.len() % 4 != 0 {
        return Err(DrizzleError::InvalidData(format!(
            "Invalid binary vector length: {} bytes is not a whole number of 32-bit items",
            bytes.len()
        )));
    }
    let mut values = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(&bytes, &mut values);
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_separated_round_trip() {
        let values = vec![1.0, 0.0, -0.5, 4096.0, 0.123456789012345];
        let text = to_comma_separated(&values);
        let parsed = parse_comma_separated(&text, values.len()).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_comma_separated_min_count() {
        assert!(parse_comma_separated("1,2", 3).is_err());
        assert!(parse_comma_separated("", 1).is_err());
    }

    #[test]
    fn test_comma_separated_rejects_garbage() {
        assert!(parse_comma_separated("1,abc,3", 1).is_err());
    }

    #[test]
    fn test_base64_f64_round_trip() {
        let values = vec![0.5, -1.25, 1e300, f64::MIN_POSITIVE];
        let parsed = parse_base64_f64(&to_base64_f64(&values)).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_base64_f32_round_trip() {
        let values = vec![0.5f32, -1.25, 3.0e38];
        let parsed = parse_base64_f32(&to_base64_f32(&values)).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn test_base64_tolerates_line_wrapping() {
        let values = vec![1.0, 2.0, 3.0];
        let mut text = to_base64_f64(&values);
        text.insert(10, '\n');
        text.insert(4, ' ');
        assert_eq!(parse_base64_f64(&text).unwrap(), values);
    }

    #[test]
    fn test_base64_rejects_partial_items() {
        let bytes = BASE64_STANDARD.encode([0u8; 12]);
        assert!(parse_base64_f64(&bytes).is_err());
        assert!(parse_base64_f32(&bytes).is_ok());
    }
}
