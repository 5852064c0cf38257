//! Store wrapper that records how comment pages are fetched.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use blog_db::{EntityStore, MemoryStore};
use blog_types::models::{Comment, Page, Post};
use blog_types::{BlogError, Result};

#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    single_calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
}

impl CountingStore {
    /// Batched loads report a per-key store failure for this post id.
    pub const FAILING_POST: &'static str = "failing-post";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl EntityStore for CountingStore {
    fn create_post(&self, post: &Post) -> Result<()> {
        self.inner.create_post(post)
    }

    fn get_post(&self, id: &str) -> Result<Post> {
        self.inner.get_post(id)
    }

    fn list_posts(&self, limit: usize, cursor: Option<&str>) -> Result<Page<Post>> {
        self.inner.list_posts(limit, cursor)
    }

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        self.inner.create_comment(comment)
    }

    fn get_comment(&self, id: &str) -> Result<Comment> {
        self.inner.get_comment(id)
    }

    fn get_comments(
        &self,
        post_id: &str,
        parent_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Comment>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_comments(post_id, parent_id, limit, cursor)
    }

    fn first_comment_pages(
        &self,
        post_ids: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Result<Page<Comment>>>> {
        self.batches.lock().unwrap().push(post_ids.to_vec());

        let mut pages = self.inner.first_comment_pages(post_ids, limit)?;
        if pages.contains_key(Self::FAILING_POST) {
            pages.insert(
                Self::FAILING_POST.to_string(),
                Err(BlogError::store("list comments", "disk on fire")),
            );
        }
        Ok(pages)
    }
}
