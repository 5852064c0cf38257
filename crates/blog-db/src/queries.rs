use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use blog_types::cursor::{CursorScope, sort_key};
use blog_types::models::{Comment, Page, Post};
use blog_types::{BlogError, Result};

use crate::models::{COMMENT_COLUMNS, CommentRow, POST_COLUMNS, PostRow};
use crate::page::{self, PageQuery};
use crate::{Database, EntityStore};

impl EntityStore for Database {
    // -- Posts --

    fn create_post(&self, post: &Post) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, title, content, author_id, allow_comments, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    post.id,
                    post.title,
                    post.content,
                    post.author_id,
                    post.allow_comments,
                    sort_key(post.created_at),
                ],
            )
            .map_err(|e| BlogError::store("insert post", e))?;
            debug!("Inserted post {}", post.id);
            Ok(())
        })
    }

    fn get_post(&self, id: &str) -> Result<Post> {
        self.with_conn(|conn| {
            query_post(conn, id)?.ok_or_else(|| BlogError::post_not_found(id))
        })
    }

    fn list_posts(&self, limit: usize, cursor: Option<&str>) -> Result<Page<Post>> {
        let scope = CursorScope::Posts;
        let query = PageQuery::new(&scope, limit, cursor)?;

        self.with_conn(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
                .map_err(|e| BlogError::store("count posts", e))?;

            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE (?1 IS NULL OR created_at < ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| BlogError::store("list posts", e))?;
            let rows = stmt
                .query_map(params![query.before, query.fetch_limit() as i64], PostRow::from_row)
                .and_then(|rows| rows.map(|r| r.map(Post::from)).collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| BlogError::store("list posts", e))?;

            Ok(page::assemble(rows, &query, total as usize, &scope))
        })
    }

    // -- Comments --

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        self.with_conn(|conn| {
            if query_post(conn, &comment.post_id)?.is_none() {
                return Err(BlogError::post_not_found(&comment.post_id));
            }

            conn.execute(
                "INSERT INTO comments (id, post_id, parent_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    comment.id,
                    comment.post_id,
                    comment.parent_id,
                    comment.author_id,
                    comment.content,
                    sort_key(comment.created_at),
                ],
            )
            .map_err(|e| BlogError::store("insert comment", e))?;
            debug!("Inserted comment {} on post {}", comment.id, comment.post_id);
            Ok(())
        })
    }

    fn get_comment(&self, id: &str) -> Result<Comment> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1");
            conn.query_row(&sql, [id], CommentRow::from_row)
                .optional()
                .map_err(|e| BlogError::store("get comment", e))?
                .map(Comment::from)
                .ok_or_else(|| BlogError::comment_not_found(id))
        })
    }

    fn get_comments(
        &self,
        post_id: &str,
        parent_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Comment>> {
        let scope = CursorScope::comments(post_id, parent_id);
        let query = PageQuery::new(&scope, limit, cursor)?;

        self.with_conn(|conn| {
            // `IS` compares NULL parents as equal, selecting top-level comments.
            let total: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND parent_id IS ?2",
                    params![post_id, parent_id],
                    |row| row.get(0),
                )
                .map_err(|e| BlogError::store("count comments", e))?;

            let sql = format!(
                "SELECT {COMMENT_COLUMNS} FROM comments
                 WHERE post_id = ?1 AND parent_id IS ?2
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| BlogError::store("list comments", e))?;
            let rows = stmt
                .query_map(
                    params![post_id, parent_id, query.before, query.fetch_limit() as i64],
                    CommentRow::from_row,
                )
                .and_then(|rows| rows.map(|r| r.map(Comment::from)).collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| BlogError::store("list comments", e))?;

            Ok(page::assemble(rows, &query, total as usize, &scope))
        })
    }

    /// One count query and one windowed query for the whole batch instead of
    /// two queries per post.
    fn first_comment_pages(
        &self,
        post_ids: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Result<Page<Comment>>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = PageQuery::new(&CursorScope::Posts, limit, None)?;

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=post_ids.len()).map(|i| format!("?{}", i)).collect();
            let placeholders = placeholders.join(", ");
            let ids: Vec<&dyn rusqlite::types::ToSql> = post_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let count_sql = format!(
                "SELECT post_id, COUNT(*) FROM comments
                 WHERE parent_id IS NULL AND post_id IN ({placeholders})
                 GROUP BY post_id"
            );
            let mut stmt = conn
                .prepare(&count_sql)
                .map_err(|e| BlogError::store("count comments", e))?;
            let totals: HashMap<String, i64> = stmt
                .query_map(ids.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))
                .and_then(|rows| rows.collect::<rusqlite::Result<HashMap<_, _>>>())
                .map_err(|e| BlogError::store("count comments", e))?;

            let fetch_limit = query.fetch_limit() as i64;
            let mut row_params = ids.clone();
            row_params.push(&fetch_limit);

            let rows_sql = format!(
                "SELECT {COMMENT_COLUMNS} FROM (
                    SELECT *, ROW_NUMBER() OVER (
                        PARTITION BY post_id ORDER BY created_at DESC, id DESC
                    ) AS rn
                    FROM comments
                    WHERE parent_id IS NULL AND post_id IN ({placeholders})
                 )
                 WHERE rn <= ?{}
                 ORDER BY post_id, rn",
                post_ids.len() + 1
            );
            let mut stmt = conn
                .prepare(&rows_sql)
                .map_err(|e| BlogError::store("list comments", e))?;
            let rows = stmt
                .query_map(row_params.as_slice(), CommentRow::from_row)
                .and_then(|rows| rows.map(|r| r.map(Comment::from)).collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| BlogError::store("list comments", e))?;

            let mut grouped: HashMap<String, Vec<Comment>> = HashMap::new();
            for comment in rows {
                grouped.entry(comment.post_id.clone()).or_default().push(comment);
            }

            debug!("Batched first comment pages for {} posts", post_ids.len());

            Ok(post_ids
                .iter()
                .map(|id| {
                    let scope = CursorScope::comments(id, None);
                    let rows = grouped.remove(id).unwrap_or_default();
                    let total = totals.get(id).copied().unwrap_or(0) as usize;
                    (id.clone(), Ok(page::assemble(rows, &query, total, &scope)))
                })
                .collect())
        })
    }
}

fn query_post(conn: &Connection, id: &str) -> Result<Option<Post>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
    conn.query_row(&sql, [id], PostRow::from_row)
        .optional()
        .map(|row| row.map(Post::from))
        .map_err(|e| BlogError::store("get post", e))
}
