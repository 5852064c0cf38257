pub mod memory;
pub mod migrations;
pub mod models;
pub mod page;
pub mod queries;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use blog_types::models::{Comment, Page, Post};
use blog_types::{BlogError, Result};

pub use memory::MemoryStore;

/// Persistence contract for posts and comments.
///
/// Every implementation must agree on pagination: newest first by creation
/// timestamp (ties broken by id, descending), a cursor only admits items
/// strictly older than its timestamp, `total_count` ignores the cursor, and
/// `next_cursor` is set iff more items exist past the page.
///
/// Calls may block; async callers run them on the blocking pool.
pub trait EntityStore: Send + Sync {
    fn create_post(&self, post: &Post) -> Result<()>;

    fn get_post(&self, id: &str) -> Result<Post>;

    fn list_posts(&self, limit: usize, cursor: Option<&str>) -> Result<Page<Post>>;

    /// Fails with `NotFound` when the owning post does not exist.
    fn create_comment(&self, comment: &Comment) -> Result<()>;

    fn get_comment(&self, id: &str) -> Result<Comment>;

    /// Comments of `post_id` whose parent equals `parent_id` (`None` selects
    /// top-level comments).
    fn get_comments(
        &self,
        post_id: &str,
        parent_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Comment>>;

    /// First page of top-level comments for each post, keyed by post id.
    ///
    /// The outer error fails the whole batch; inner errors belong to one key.
    fn first_comment_pages(
        &self,
        post_ids: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Result<Page<Comment>>>> {
        Ok(post_ids
            .iter()
            .map(|id| (id.clone(), self.get_comments(id, None, limit, None)))
            .collect())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Relational backend on SQLite.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| BlogError::store("open database", e))?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BlogError::store("enable WAL", e))?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BlogError::store("open database", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| BlogError::store("enable foreign keys", e))?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` with the connection held, so multi-statement reads see one
    /// consistent state.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BlogError::store("lock database", e))?;
        f(&conn)
    }
}
