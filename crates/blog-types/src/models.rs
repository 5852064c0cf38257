use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::{self, CursorScope};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Items that can be paged by creation time.
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub allow_comments: bool,
    pub created_at: DateTime<Utc>,
}

impl Timestamped for Post {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A comment on a post. `parent_id == None` marks a top-level comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Timestamped for Comment {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One page of a newest-first listing.
///
/// `total_count` covers every item matching the filter, not just this page.
/// `next_cursor` is present iff more items exist past the last one returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            next_cursor: None,
        }
    }
}

impl<T: Timestamped> Page<T> {
    /// Shrinks a first page to `limit` items, re-issuing the continuation
    /// cursor from the new last item when anything was cut off.
    pub fn truncate(mut self, limit: usize, scope: &CursorScope<'_>) -> Self {
        if self.items.len() > limit {
            self.items.truncate(limit);
            self.next_cursor = self
                .items
                .last()
                .map(|last| cursor::encode(scope, last.created_at()));
        }
        self
    }
}

/// Input for a post insert. Ids and timestamps are assigned by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub allow_comments: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: String,
    pub parent_id: Option<String>,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn comment(id: &str, secs: i64) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: "p1".to_string(),
            parent_id: None,
            author_id: "u1".to_string(),
            content: "hi".to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn truncate_reissues_cursor_from_new_last_item() {
        let scope = CursorScope::comments("p1", None);
        let page = Page {
            items: vec![comment("c3", 30), comment("c2", 20), comment("c1", 10)],
            total_count: 3,
            next_cursor: None,
        };

        let page = page.truncate(2, &scope);

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 3);
        let next = page.next_cursor.expect("cursor after truncation");
        assert_eq!(
            cursor::decode(&scope, &next).unwrap(),
            Utc.timestamp_opt(20, 0).unwrap()
        );
    }

    #[test]
    fn truncate_keeps_short_page_untouched() {
        let scope = CursorScope::comments("p1", None);
        let page = Page {
            items: vec![comment("c1", 10)],
            total_count: 1,
            next_cursor: None,
        };

        let page = page.truncate(5, &scope);
        assert_eq!(page.items.len(), 1);
        assert!(page.next_cursor.is_none());
    }
}
