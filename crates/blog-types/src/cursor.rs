//! Opaque pagination cursors.
//!
//! A cursor is the creation timestamp of the last item on a page, rendered as
//! fixed-width epoch nanoseconds so that lexical and chronological order agree,
//! and bound to the filter (scope) it was issued for. The whole thing is
//! base64url encoded so clients treat it as opaque.
//!
//! Format before encoding: `<scope>|<20-digit key>`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Utc};

use crate::error::{BlogError, Result};

const KEY_WIDTH: usize = 20;

/// The filter a cursor belongs to. A cursor presented under a different
/// scope is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorScope<'a> {
    Posts,
    Comments {
        post_id: &'a str,
        parent_id: Option<&'a str>,
    },
}

impl<'a> CursorScope<'a> {
    pub fn comments(post_id: &'a str, parent_id: Option<&'a str>) -> Self {
        Self::Comments { post_id, parent_id }
    }

    fn tag(&self) -> String {
        match self {
            Self::Posts => "posts".to_string(),
            Self::Comments { post_id, parent_id } => {
                format!("comments:{}:{}", post_id, parent_id.unwrap_or(""))
            }
        }
    }
}

/// Epoch nanoseconds used as the sort key by every backend.
///
/// Saturates outside the representable range (years 1677..2262).
pub fn sort_key(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or(if ts.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

pub fn from_sort_key(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

pub fn encode(scope: &CursorScope<'_>, created_at: DateTime<Utc>) -> String {
    // Flipping the sign bit maps i64 onto u64 preserving order.
    let key = (sort_key(created_at) as u64) ^ (1 << 63);
    B64.encode(format!("{}|{:0width$}", scope.tag(), key, width = KEY_WIDTH))
}

pub fn decode(scope: &CursorScope<'_>, token: &str) -> Result<DateTime<Utc>> {
    let raw = B64
        .decode(token)
        .map_err(|e| BlogError::InvalidCursor(format!("not base64: {}", e)))?;
    let raw = String::from_utf8(raw)
        .map_err(|_| BlogError::InvalidCursor("not valid UTF-8".to_string()))?;

    let (tag, key) = raw
        .rsplit_once('|')
        .ok_or_else(|| BlogError::InvalidCursor("missing sort key".to_string()))?;

    if tag != scope.tag() {
        return Err(BlogError::InvalidCursor(
            "cursor was issued for a different listing".to_string(),
        ));
    }
    if key.len() != KEY_WIDTH || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BlogError::InvalidCursor(format!("malformed sort key '{}'", key)));
    }

    let key: u64 = key
        .parse()
        .map_err(|_| BlogError::InvalidCursor(format!("sort key out of range '{}'", key)))?;

    Ok(from_sort_key((key ^ (1 << 63)) as i64))
}
