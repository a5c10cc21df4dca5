//! Cursor pagination.
//!
//! Listings sort by `(created_at desc, id desc)`; events by `id desc`.
//! Cursors are opaque tokens: URL-safe base64 over a small JSON document
//! holding the sort-key values of the last item served. Keyset seeking
//! with a row-value comparison keeps pages stable under concurrent
//! inserts.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default page size when the caller gives no limit.
pub const DEFAULT_LIMIT: u32 = 50;
/// Upper bound on page size.
pub const MAX_LIMIT: u32 = 200;

/// Clamp a requested limit into `[1, MAX_LIMIT]`.
pub fn clamp_limit(limit: Option<u32>) -> i64 {
    i64::from(limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
}

/// Cursor for `(created_at, id)`-keyed listings. The timestamp is the
/// stored fixed-width RFC3339 text, compared lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCursor {
    pub created_at: String,
    pub id: String,
}

impl KeyCursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("cursor serialization cannot fail");
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self> {
        decode_token(token)
    }
}

/// Cursor for the event journal, keyed by the monotonic event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCursor {
    pub id: i64,
}

impl EventCursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("cursor serialization cannot fail");
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self> {
        decode_token(token)
    }
}

fn decode_token<T: serde::de::DeserializeOwned>(token: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::bad_request_field("cursor", "invalid cursor").with_source(e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::bad_request_field("cursor", "invalid cursor").with_source(e))
}

/// One page of a listing. `next_cursor` is empty when the listing is
/// exhausted and omitted from JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub next_cursor: String,
}

impl<T> Page<T> {
    /// Build a page from `limit + 1` fetched rows: the extra row, if
    /// present, only signals that another page exists.
    pub fn from_rows(mut rows: Vec<T>, limit: i64, cursor_of: impl Fn(&T) -> String) -> Self {
        let has_more = rows.len() as i64 > limit;
        if has_more {
            rows.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            rows.last().map(&cursor_of).unwrap_or_default()
        } else {
            String::new()
        };
        Self {
            items: rows,
            next_cursor,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
