//! Shared JSON parsing helpers for raw exchange payloads.
//!
//! Exchange feeds mix native JSON numbers with string-encoded numbers; these
//! helpers accept either. Book levels are decoded through a single
//! shape-checked function so a malformed tuple surfaces as a typed error at
//! the normalization boundary.

use mdx_core::MdxError;

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `i64`.
#[inline]
pub fn parse_i64(v: Option<&serde_json::Value>) -> Option<i64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_i64()
    }
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn parse_u64(v: Option<&serde_json::Value>) -> Option<u64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_u64()
    }
}

/// Decode one book level `[price, count, amount]`.
///
/// Any other arity, or a non-numeric member, violates the expected payload
/// shape and is reported as [`MdxError::MalformedPayload`].
pub fn level_tuple(v: &serde_json::Value) -> Result<(f64, i64, f64), MdxError> {
    let arr = v
        .as_array()
        .ok_or_else(|| MdxError::MalformedPayload(format!("book level is not an array: {v}")))?;
    if arr.len() != 3 {
        return Err(MdxError::MalformedPayload(format!(
            "book level has arity {}, expected 3: {v}",
            arr.len()
        )));
    }
    let price = parse_f64(arr.first())
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric level price: {v}")))?;
    let count = parse_i64(arr.get(1))
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric level count: {v}")))?;
    let amount = parse_f64(arr.get(2))
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric level amount: {v}")))?;
    Ok((price, count, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_accept_strings_and_numbers() {
        assert_eq!(parse_f64(Some(&json!("30000.5"))), Some(30000.5));
        assert_eq!(parse_f64(Some(&json!(30000.5))), Some(30000.5));
        assert_eq!(parse_i64(Some(&json!("-3"))), Some(-3));
        assert_eq!(parse_u64(Some(&json!(17))), Some(17));
        assert_eq!(parse_f64(None), None);
    }

    #[test]
    fn level_tuple_decodes() {
        assert_eq!(level_tuple(&json!([100.0, 3, -5.0])).unwrap(), (100.0, 3, -5.0));
    }

    #[test]
    fn level_tuple_rejects_wrong_arity() {
        assert!(matches!(
            level_tuple(&json!([100.0, 3])),
            Err(MdxError::MalformedPayload(_))
        ));
        assert!(matches!(
            level_tuple(&json!([100.0, 3, -5.0, 1])),
            Err(MdxError::MalformedPayload(_))
        ));
        assert!(matches!(level_tuple(&json!("book")), Err(MdxError::MalformedPayload(_))));
    }
}
