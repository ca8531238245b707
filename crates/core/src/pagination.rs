//! Cursor pagination over newest-first collections.
//!
//! Collections are ordered by `(created_at DESC, id DESC)`. A cursor is the
//! `created_at` of the last item on the previous page, encoded as RFC 3339;
//! the next page holds items strictly older than it. Stores fetch one row
//! more than the limit so [`Page::from_overfetch`] can tell whether another
//! page exists without a count query.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest page a caller can ask for.
pub const MIN_PAGE_LIMIT: u32 = 1;
/// Largest page a caller can ask for.
pub const MAX_PAGE_LIMIT: u32 = 50;
/// Page size when the caller gives none.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// A cursor that is not an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid cursor")]
pub struct CursorError;

/// Page size, always within `MIN_PAGE_LIMIT..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageLimit(u32);

impl PageLimit {
    /// Clamp a requested limit into the allowed range.
    #[must_use]
    pub fn clamped(requested: Option<i64>) -> Self {
        let value = requested.map_or(DEFAULT_PAGE_LIMIT, |n| {
            let clamped = n.clamp(i64::from(MIN_PAGE_LIMIT), i64::from(MAX_PAGE_LIMIT));
            u32::try_from(clamped).unwrap_or(DEFAULT_PAGE_LIMIT)
        });
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Rows to fetch: one more than the page size.
    #[must_use]
    pub const fn fetch_count(self) -> u32 {
        self.0 + 1
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self(DEFAULT_PAGE_LIMIT)
    }
}

/// Position marker between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(DateTime<Utc>);

impl Cursor {
    /// Parse an optional cursor query value. Blank means "first page".
    ///
    /// # Errors
    ///
    /// Returns `CursorError` if the value is present but not RFC 3339.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, CursorError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }

    #[must_use]
    pub const fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Items on the next page are strictly older than this.
    #[must_use]
    pub const fn before(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::str::FromStr for Cursor {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s)
            .map(|at| Self(at.with_timezone(&Utc)))
            .map_err(|_| CursorError)
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

/// Anything listed newest-first.
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T: Timestamped> Page<T> {
    /// Build a page from `limit + 1` fetched rows.
    ///
    /// If the extra row is present it is dropped and the cursor points at
    /// the last kept row.
    #[must_use]
    pub fn from_overfetch(mut rows: Vec<T>, limit: PageLimit) -> Self {
        let limit = limit.get() as usize;
        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last()
                .map(|last| Cursor::from_timestamp(last.created_at()).to_string())
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }
}

impl<T> Page<T> {
    /// Convert items while keeping the cursor.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

impl Timestamped for crate::order::Order {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Timestamped for crate::types::Product {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
