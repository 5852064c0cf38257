//! Database row types, mapping directly to SQLite rows.
//! Distinct from blog-types models to keep the DB layer independent.

use rusqlite::Row;

use blog_types::cursor::from_sort_key;
use blog_types::models::{Comment, Post};

pub const POST_COLUMNS: &str = "id, title, content, author_id, allow_comments, created_at";
pub const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author_id, content, created_at";

pub struct PostRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub allow_comments: bool,
    pub created_at: i64,
}

impl PostRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            author_id: row.get(3)?,
            allow_comments: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            allow_comments: row.allow_comments,
            created_at: from_sort_key(row.created_at),
        }
    }
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub author_id: String,
    pub content: String,
    pub created_at: i64,
}

impl CommentRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            parent_id: row.get(2)?,
            author_id: row.get(3)?,
            content: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            author_id: row.author_id,
            content: row.content,
            created_at: from_sort_key(row.created_at),
        }
    }
}
