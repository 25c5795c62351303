//! Offset/limit pagination and the relay-style cursor encoding used by
//! connection fields.
//!
//! Cursors are opaque to clients: base64 over `offset:<n>` where `n` is the
//! zero-based index of the node the cursor points at. `after` resumes from
//! the following node.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::ast::arg::ArgValue;
use crate::error::TranslateError;

/// Resolved SKIP/LIMIT pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pagination {
    /// LIMIT, if any.
    pub limit: Option<i64>,
    /// SKIP, if any.
    pub offset: Option<i64>,
}

impl Pagination {
    /// True when neither bound is set.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Reads `limit`/`offset` keys out of an `options` object.
    pub fn from_options(options: &ArgValue) -> Self {
        let mut pagination = Pagination::default();
        if let Some(entries) = options.as_object() {
            for (key, value) in entries {
                match key.as_str() {
                    "limit" => pagination.limit = value.as_int(),
                    "offset" => pagination.offset = value.as_int(),
                    _ => {}
                }
            }
        }
        pagination
    }
}

/// Encodes a zero-based node index as an opaque cursor.
pub fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("offset:{offset}"))
}

/// Decodes an `after` cursor into the offset of the *next* node.
///
/// The empty string means "from the start".
pub fn decode_cursor(cursor: &str) -> Result<i64, TranslateError> {
    if cursor.is_empty() {
        return Ok(0);
    }
    let invalid = || TranslateError::InvalidCursor {
        cursor: cursor.to_owned(),
    };
    let bytes = BASE64.decode(cursor).map_err(|_| invalid())?;
    let decoded = String::from_utf8(bytes).map_err(|_| invalid())?;
    let offset = decoded
        .strip_prefix("offset:")
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    if offset < 0 {
        return Err(invalid());
    }
    // A cursor at i64::MAX has no next node; treat it like any other
    // out-of-domain cursor instead of wrapping.
    offset.checked_add(1).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip_points_past_the_node() {
        let cursor = encode_cursor(4);
        assert_eq!(decode_cursor(&cursor).unwrap(), 5);
    }

    #[test]
    fn empty_cursor_starts_at_zero() {
        assert_eq!(decode_cursor("").unwrap(), 0);
    }

    #[test]
    fn garbage_cursors_are_rejected() {
        for bad in ["not-base64!!!", &BASE64.encode("page:3"), &BASE64.encode("offset:-1")] {
            let err = decode_cursor(bad).unwrap_err();
            assert_eq!(err.code(), "InvalidCursor");
        }
    }

    #[test]
    fn cursor_at_the_end_of_the_domain_is_rejected() {
        let err = decode_cursor(&encode_cursor(i64::MAX)).unwrap_err();
        assert_eq!(err.code(), "InvalidCursor");
    }
}
