//! Cursor pagination over timestamp-ordered collections.
//!
//! A page request carries a size and an optional exclusive upper bound on
//! `created_at`. Stores fetch one row more than the page size; the extra row
//! only signals that another page exists and is dropped by [`Page::from_overfetch`].

use std::num::IntErrorKind;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

/// Raw query parameters longer than this are rejected outright.
pub const PARAMETER_MAX_LEN: usize = 50;

pub const LIMIT_PARAM: &str = "limit";
pub const CURSOR_PARAM: &str = "cursor";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("invalid `{name}` parameter: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl PaginationError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        PaginationError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Default and maximum page size for one listing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl PageBounds {
    pub const FEED: PageBounds = PageBounds {
        default_limit: 10,
        max_limit: 20,
    };

    pub const PROFILE: PageBounds = PageBounds {
        default_limit: 10,
        max_limit: 15,
    };
}

/// A validated page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    /// Exclusive upper bound. `None` means start from the newest item.
    pub cursor: Option<DateTime<Utc>>,
}

impl PageRequest {
    pub fn first(bounds: PageBounds) -> Self {
        Self {
            limit: bounds.default_limit,
            cursor: None,
        }
    }

    /// Parses the raw `limit` and `cursor` query strings.
    ///
    /// Empty or missing values take the context default. A limit above the
    /// maximum is clamped, a zero or negative one falls back to the default.
    /// Anything unparseable or longer than [`PARAMETER_MAX_LEN`] is an error.
    pub fn parse(
        limit: Option<&str>,
        cursor: Option<&str>,
        bounds: PageBounds,
    ) -> Result<Self, PaginationError> {
        Ok(Self {
            limit: parse_limit(limit, bounds)?,
            cursor: parse_cursor(cursor)?,
        })
    }

    /// Number of rows a store should fetch: one extra to detect a next page.
    pub fn fetch_size(&self) -> usize {
        self.limit + 1
    }

    /// Whether an item created at `created_at` falls inside this window.
    pub fn admits(&self, created_at: DateTime<Utc>) -> bool {
        self.cursor.is_none_or(|cursor| created_at < cursor)
    }
}

fn bounded<'a>(
    name: &'static str,
    raw: Option<&'a str>,
) -> Result<Option<&'a str>, PaginationError> {
    match raw {
        None | Some("") => Ok(None),
        Some(value) if value.len() > PARAMETER_MAX_LEN => Err(PaginationError::invalid(
            name,
            format!("longer than {PARAMETER_MAX_LEN} characters"),
        )),
        Some(value) => Ok(Some(value)),
    }
}

fn parse_limit(raw: Option<&str>, bounds: PageBounds) -> Result<usize, PaginationError> {
    let Some(raw) = bounded(LIMIT_PARAM, raw)? else {
        return Ok(bounds.default_limit);
    };

    let parsed = match raw.parse::<i64>() {
        Ok(n) => n,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => return Ok(bounds.max_limit),
            IntErrorKind::NegOverflow => return Ok(bounds.default_limit),
            _ => return Err(PaginationError::invalid(LIMIT_PARAM, "not an integer")),
        },
    };

    if parsed < 1 {
        return Ok(bounds.default_limit);
    }
    Ok(usize::try_from(parsed)
        .unwrap_or(bounds.max_limit)
        .min(bounds.max_limit))
}

fn parse_cursor(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, PaginationError> {
    let Some(raw) = bounded(CURSOR_PARAM, raw)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| PaginationError::invalid(CURSOR_PARAM, e.to_string()))
}

/// Formats a timestamp the way cursors are exchanged with clients.
pub fn format_cursor(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Items that can be ordered for cursor pagination.
pub trait Cursored {
    fn created_at(&self) -> DateTime<Utc>;
    /// Stable tie-break between items sharing a timestamp.
    fn tie_break(&self) -> i64;
}

/// Sorts newest first, ties broken by descending id.
pub fn sort_newest_first<T: Cursored>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.tie_break().cmp(&a.tie_break()))
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T: Cursored> Page<T> {
    /// Builds a page from a store result of up to `request.fetch_size()` rows.
    pub fn from_overfetch(mut items: Vec<T>, request: &PageRequest) -> Self {
        if items.len() <= request.limit {
            return Self {
                items,
                next_cursor: None,
            };
        }

        items.truncate(request.limit);
        let next_cursor = items.last().map(|last| format_cursor(last.created_at()));
        Self { items, next_cursor }
    }
}
