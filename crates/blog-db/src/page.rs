//! Page assembly shared by both backends, so ordering, count and cursor
//! boundary behave identically whichever store is configured.

use std::cmp::Ordering;

use blog_types::Result;
use blog_types::cursor::{self, CursorScope, sort_key};
use blog_types::models::{Comment, Page, Post, Timestamped};

/// Decoded listing request: at most `limit` items strictly older than
/// `before` (an epoch-nanosecond sort key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub limit: usize,
    pub before: Option<i64>,
}

impl PageQuery {
    pub fn new(scope: &CursorScope<'_>, limit: usize, cursor: Option<&str>) -> Result<Self> {
        let before = cursor
            .map(|token| cursor::decode(scope, token).map(sort_key))
            .transpose()?;
        Ok(Self {
            limit: limit.max(1),
            before,
        })
    }

    /// Rows to fetch: one extra tells whether another page exists.
    pub fn fetch_limit(&self) -> usize {
        self.limit + 1
    }

    pub fn admits(&self, created_at: chrono::DateTime<chrono::Utc>) -> bool {
        self.before.is_none_or(|before| sort_key(created_at) < before)
    }
}

/// Tie-break for equal timestamps, matching `ORDER BY created_at DESC, id DESC`.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Post {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        &self.id
    }
}

pub fn newest_first<T: Timestamped + Keyed>(a: &T, b: &T) -> Ordering {
    sort_key(b.created_at())
        .cmp(&sort_key(a.created_at()))
        .then_with(|| b.key().cmp(a.key()))
}

/// Turns up to `fetch_limit()` newest-first rows into a page.
pub fn assemble<T: Timestamped>(
    mut rows: Vec<T>,
    query: &PageQuery,
    total_count: usize,
    scope: &CursorScope<'_>,
) -> Page<T> {
    let has_more = rows.len() > query.limit;
    rows.truncate(query.limit);

    let next_cursor = if has_more {
        rows.last().map(|last| cursor::encode(scope, last.created_at()))
    } else {
        None
    };

    Page {
        items: rows,
        total_count,
        next_cursor,
    }
}

/// Pages an unordered in-memory set.
pub fn paginate<'a, T, I>(items: I, query: &PageQuery, scope: &CursorScope<'_>) -> Page<T>
where
    T: Timestamped + Keyed + Clone + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut matching: Vec<&T> = items.into_iter().collect();
    let total_count = matching.len();
    matching.sort_by(|a, b| newest_first(*a, *b));

    let rows = matching
        .into_iter()
        .filter(|item| query.admits(item.created_at()))
        .take(query.fetch_limit())
        .cloned()
        .collect();

    assemble(rows, query, total_count, scope)
}
