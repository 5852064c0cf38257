use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use blog_types::cursor::CursorScope;
use blog_types::models::{Comment, Page, Post};
use blog_types::{BlogError, Result};

use crate::EntityStore;
use crate::page::{self, PageQuery};

/// In-process backend. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    posts: HashMap<String, Post>,
    comments: HashMap<String, Comment>,
    /// post_id -> comment ids, in insertion order
    post_comments: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Initialised in-memory store");
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryInner>> {
        self.inner
            .read()
            .map_err(|e| BlogError::store("lock memory store", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryInner>> {
        self.inner
            .write()
            .map_err(|e| BlogError::store("lock memory store", e))
    }
}

impl EntityStore for MemoryStore {
    fn create_post(&self, post: &Post) -> Result<()> {
        let mut inner = self.write()?;
        if inner.posts.contains_key(&post.id) {
            return Err(BlogError::store("insert post", "duplicate post id"));
        }
        inner.posts.insert(post.id.clone(), post.clone());
        debug!("Inserted post {}", post.id);
        Ok(())
    }

    fn get_post(&self, id: &str) -> Result<Post> {
        self.read()?
            .posts
            .get(id)
            .cloned()
            .ok_or_else(|| BlogError::post_not_found(id))
    }

    fn list_posts(&self, limit: usize, cursor: Option<&str>) -> Result<Page<Post>> {
        let scope = CursorScope::Posts;
        let query = PageQuery::new(&scope, limit, cursor)?;
        let inner = self.read()?;
        Ok(page::paginate(inner.posts.values(), &query, &scope))
    }

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.posts.contains_key(&comment.post_id) {
            return Err(BlogError::post_not_found(&comment.post_id));
        }
        if inner.comments.contains_key(&comment.id) {
            return Err(BlogError::store("insert comment", "duplicate comment id"));
        }

        inner.comments.insert(comment.id.clone(), comment.clone());
        inner
            .post_comments
            .entry(comment.post_id.clone())
            .or_default()
            .push(comment.id.clone());
        debug!("Inserted comment {} on post {}", comment.id, comment.post_id);
        Ok(())
    }

    fn get_comment(&self, id: &str) -> Result<Comment> {
        self.read()?
            .comments
            .get(id)
            .cloned()
            .ok_or_else(|| BlogError::comment_not_found(id))
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
        let inner = self.read()?;

        let Some(ids) = inner.post_comments.get(post_id) else {
            return Ok(Page::empty());
        };

        let thread = ids
            .iter()
            .filter_map(|id| inner.comments.get(id))
            .filter(|c| c.parent_id.as_deref() == parent_id);

        Ok(page::paginate(thread, &query, &scope))
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.write()?;
        *inner = MemoryInner::default();
        info!("In-memory store cleared");
        Ok(())
    }
}
