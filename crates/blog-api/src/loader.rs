//! Per-request batch loading of first comment pages.
//!
//! Resolving N sibling posts asks for N comment pages; the loader collects
//! those keys for a short window and issues one batched store call. Every key
//! is loaded at most once per loader, and concurrent callers for the same key
//! share one result. A loader lives exactly as long as the request that
//! created it, so nothing is cached across requests.

use std::collections::HashMap;

use async_graphql::dataloader::{DataLoader, HashMapCache, Loader};
use tracing::debug;

use blog_types::models::{Comment, Page};
use blog_types::{BlogError, Result};

use crate::service::ContentService;

pub type CommentLoader = DataLoader<CommentPages, HashMapCache>;

/// A fresh loader bound to one request.
pub fn comment_loader(service: ContentService, page_size: usize) -> CommentLoader {
    DataLoader::with_cache(
        CommentPages::new(service, page_size),
        tokio::task::spawn,
        HashMapCache::default(),
    )
}

/// Load one post's first page. A store failure for that post only reaches
/// callers waiting on it.
pub async fn load_first_page(loader: &CommentLoader, post_id: &str) -> Result<Page<Comment>> {
    loader
        .load_one(post_id.to_string())
        .await?
        .unwrap_or_else(|| {
            Err(BlogError::store(
                "load comment page",
                format!("no result for post {}", post_id),
            ))
        })
}

/// First page of top-level comments, keyed by post id.
pub struct CommentPages {
    service: ContentService,
    page_size: usize,
}

impl CommentPages {
    pub fn new(service: ContentService, page_size: usize) -> Self {
        Self { service, page_size }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Loader<String> for CommentPages {
    /// Per-key outcome, so one failing post does not fail its siblings.
    type Value = Result<Page<Comment>>;
    /// Failure of the whole batch.
    type Error = BlogError;

    async fn load(&self, keys: &[String]) -> Result<HashMap<String, Self::Value>> {
        debug!("Batch loading comment pages for {} posts", keys.len());
        self.service
            .first_comment_pages(keys.to_vec(), self.page_size)
            .await
    }
}
