use rusqlite::Connection;
use tracing::info;

use blog_types::{BlogError, Result};

/// Timestamps are stored as epoch nanoseconds so `ORDER BY created_at`
/// matches the cursor encoding exactly.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS posts (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            content         TEXT NOT NULL,
            author_id       TEXT NOT NULL,
            allow_comments  INTEGER NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_created
            ON posts(created_at DESC, id DESC);

        CREATE TABLE IF NOT EXISTS comments (
            id          TEXT PRIMARY KEY,
            post_id     TEXT NOT NULL REFERENCES posts(id),
            parent_id   TEXT,
            author_id   TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_thread
            ON comments(post_id, parent_id, created_at DESC);
        ",
    )
    .map_err(|e| BlogError::store("run migrations", e))?;

    info!("Database migrations complete");
    Ok(())
}
