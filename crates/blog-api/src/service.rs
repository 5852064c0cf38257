use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use blog_db::EntityStore;
use blog_gateway::hub::CommentHub;
use blog_types::clock::MonotonicClock;
use blog_types::models::{
    Comment, MAX_CONTENT_CHARS, MAX_TITLE_CHARS, NewComment, NewPost, Page, Post,
};
use blog_types::{BlogError, Result};

use crate::auth::Identity;
use crate::loader::{self, CommentLoader};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Tunables that vary by deployment.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Author recorded when the caller has no identity.
    pub fallback_author: String,
    /// Size of the first comment page fetched in batches per request.
    pub comment_page_size: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            fallback_author: "anonymous".to_string(),
            comment_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Validation, persistence and notification for posts and comments.
#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn EntityStore>,
    hub: CommentHub,
    clock: Arc<MonotonicClock>,
    settings: Arc<ServiceSettings>,
}

/// Normalise a client page size: missing means the default, anything else is
/// clamped into `1..=MAX_PAGE_SIZE`.
pub fn page_size(limit: Option<i32>) -> usize {
    match limit {
        Some(n) => (n.max(1) as usize).min(MAX_PAGE_SIZE),
        None => DEFAULT_PAGE_SIZE,
    }
}

impl ContentService {
    pub fn new(store: Arc<dyn EntityStore>, hub: CommentHub, settings: ServiceSettings) -> Self {
        Self {
            store,
            hub,
            clock: Arc::new(MonotonicClock::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn hub(&self) -> &CommentHub {
        &self.hub
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// A fresh loader, scoped to one inbound request.
    pub fn comment_loader(&self) -> CommentLoader {
        loader::comment_loader(self.clone(), self.settings.comment_page_size)
    }

    // -- Mutations --

    pub async fn create_post(&self, identity: &Identity, input: NewPost) -> Result<Post> {
        check_length("title", &input.title, MAX_TITLE_CHARS)?;
        check_length("content", &input.content, MAX_CONTENT_CHARS)?;

        let post = Post {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            content: input.content,
            author_id: self.author_of(identity),
            allow_comments: input.allow_comments,
            created_at: self.clock.now(),
        };

        let stored = post.clone();
        self.blocking("create post", move |store| store.create_post(&stored))
            .await?;

        info!("Post {} created by {}", post.id, post.author_id);
        Ok(post)
    }

    /// Persists the comment, then offers it to the post's live subscribers.
    pub async fn create_comment(&self, identity: &Identity, input: NewComment) -> Result<Comment> {
        check_length("content", &input.content, MAX_CONTENT_CHARS)?;

        let post_id = input.post_id.clone();
        let post = self
            .blocking("get post", move |store| store.get_post(&post_id))
            .await?;
        if !post.allow_comments {
            return Err(BlogError::CommentsDisabled { post_id: post.id });
        }

        if let Some(parent_id) = input.parent_id.clone() {
            let parent = self
                .blocking("get comment", move |store| store.get_comment(&parent_id))
                .await?;
            if parent.post_id != post.id {
                return Err(BlogError::Validation(format!(
                    "parent comment {} belongs to another post",
                    parent.id
                )));
            }
        }

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post.id,
            parent_id: input.parent_id,
            author_id: self.author_of(identity),
            content: input.content,
            created_at: self.clock.now(),
        };

        let stored = comment.clone();
        self.blocking("create comment", move |store| store.create_comment(&stored))
            .await?;

        let delivered = self.hub.publish(&comment.post_id, &comment).await;
        info!(
            "Comment {} created on post {} ({} live subscribers notified)",
            comment.id, comment.post_id, delivered
        );
        Ok(comment)
    }

    // -- Queries --

    pub async fn get_post(&self, id: &str) -> Result<Post> {
        let id = id.to_string();
        self.blocking("get post", move |store| store.get_post(&id)).await
    }

    pub async fn list_posts(&self, limit: Option<i32>, cursor: Option<String>) -> Result<Page<Post>> {
        let limit = page_size(limit);
        self.blocking("list posts", move |store| store.list_posts(limit, cursor.as_deref()))
            .await
    }

    /// Top-level comments of a post.
    pub async fn comments(
        &self,
        post_id: &str,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> Result<Page<Comment>> {
        let limit = page_size(limit);
        let post_id = post_id.to_string();
        self.blocking("list comments", move |store| {
            store.get_post(&post_id)?;
            store.get_comments(&post_id, None, limit, cursor.as_deref())
        })
        .await
    }

    /// Direct replies to a comment.
    pub async fn replies(
        &self,
        comment_id: &str,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> Result<Page<Comment>> {
        let limit = page_size(limit);
        let comment_id = comment_id.to_string();
        self.blocking("list replies", move |store| {
            let parent = store.get_comment(&comment_id)?;
            store.get_comments(&parent.post_id, Some(&parent.id), limit, cursor.as_deref())
        })
        .await
    }

    /// Replies when the parent is already in hand, saving a lookup.
    pub async fn replies_of(
        &self,
        parent: &Comment,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> Result<Page<Comment>> {
        let limit = page_size(limit);
        let post_id = parent.post_id.clone();
        let parent_id = parent.id.clone();
        self.blocking("list replies", move |store| {
            store.get_comments(&post_id, Some(&parent_id), limit, cursor.as_deref())
        })
        .await
    }

    /// One store round trip for the first comment page of many posts.
    pub async fn first_comment_pages(
        &self,
        post_ids: Vec<String>,
        limit: usize,
    ) -> Result<HashMap<String, Result<Page<Comment>>>> {
        debug!("Loading first comment pages for {} posts", post_ids.len());
        self.blocking("batch comments", move |store| {
            store.first_comment_pages(&post_ids, limit)
        })
        .await
    }

    // -- Subscriptions --

    pub async fn subscribe(&self, post_id: &str, cancel: CancellationToken) -> mpsc::Receiver<Comment> {
        self.hub.subscribe(post_id, cancel).await
    }

    /// Close every subscription and release the store.
    pub async fn shutdown(&self) -> Result<()> {
        self.hub.unsubscribe_all().await;
        self.blocking("close store", |store| store.close()).await
    }

    fn author_of(&self, identity: &Identity) -> String {
        match identity {
            Identity::User(id) => id.clone(),
            Identity::Anonymous => self.settings.fallback_author.clone(),
        }
    }

    /// Run a store call off the async runtime.
    async fn blocking<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn EntityStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error during {}: {}", op, e);
                BlogError::store(op, e)
            })?
    }
}

fn check_length(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(BlogError::Validation(format!(
            "{} exceeds {} characters ({} given)",
            field, max, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blog_db::MemoryStore;

    fn service() -> ContentService {
        ContentService::new(
            Arc::new(MemoryStore::new()),
            CommentHub::new(),
            ServiceSettings::default(),
        )
    }

    fn new_post(title: &str, allow_comments: bool) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "body".to_string(),
            allow_comments,
        }
    }

    fn new_comment(post_id: &str, parent_id: Option<&str>, content: &str) -> NewComment {
        NewComment {
            post_id: post_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            content: content.to_string(),
        }
    }

    #[test]
    fn page_size_defaults_and_clamps() {
        assert_eq!(page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(page_size(Some(0)), 1);
        assert_eq!(page_size(Some(-4)), 1);
        assert_eq!(page_size(Some(25)), 25);
        assert_eq!(page_size(Some(10_000)), MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn title_boundary_is_200_characters() {
        let svc = service();
        let user = Identity::User("alice".to_string());

        assert!(svc.create_post(&user, new_post(&"a".repeat(200), true)).await.is_ok());

        let err = svc
            .create_post(&user, new_post(&"a".repeat(201), true))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn limits_count_characters_not_bytes() {
        let svc = service();
        let title = "ж".repeat(200);
        assert!(title.len() > 200);
        assert!(svc.create_post(&Identity::Anonymous, new_post(&title, true)).await.is_ok());
    }

    #[tokio::test]
    async fn post_content_over_2000_characters_is_rejected() {
        let svc = service();
        let input = NewPost {
            title: "t".to_string(),
            content: "x".repeat(2001),
            allow_comments: true,
        };
        let err = svc.create_post(&Identity::Anonymous, input).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn created_post_reads_back_identically() {
        let svc = service();
        let post = svc
            .create_post(&Identity::User("alice".to_string()), new_post("Hello", false))
            .await
            .unwrap();

        assert_eq!(post.author_id, "alice");
        assert_eq!(svc.get_post(&post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn anonymous_caller_gets_fallback_author() {
        let svc = service();
        let post = svc
            .create_post(&Identity::Anonymous, new_post("Hello", true))
            .await
            .unwrap();
        assert_eq!(post.author_id, "anonymous");
    }

    #[tokio::test]
    async fn comments_disabled_wins_over_content_checks_passing() {
        let svc = service();
        let post = svc
            .create_post(&Identity::Anonymous, new_post("closed", false))
            .await
            .unwrap();

        let longest = "y".repeat(2000);
        for content in ["", "hi", longest.as_str()] {
            let err = svc
                .create_comment(&Identity::Anonymous, new_comment(&post.id, None, content))
                .await
                .unwrap_err();
            assert_eq!(err, BlogError::CommentsDisabled { post_id: post.id.clone() });
        }
    }

    #[tokio::test]
    async fn comment_content_over_2000_characters_is_rejected() {
        let svc = service();
        let post = svc
            .create_post(&Identity::Anonymous, new_post("open", true))
            .await
            .unwrap();
        let err = svc
            .create_comment(&Identity::Anonymous, new_comment(&post.id, None, &"y".repeat(2001)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let svc = service();
        let err = svc
            .create_comment(&Identity::Anonymous, new_comment("ghost", None, "hi"))
            .await
            .unwrap_err();
        assert_eq!(err, BlogError::post_not_found("ghost"));
    }

    #[tokio::test]
    async fn parent_must_exist_and_share_the_post() {
        let svc = service();
        let who = Identity::Anonymous;
        let a = svc.create_post(&who, new_post("a", true)).await.unwrap();
        let b = svc.create_post(&who, new_post("b", true)).await.unwrap();
        let on_a = svc
            .create_comment(&who, new_comment(&a.id, None, "root"))
            .await
            .unwrap();

        let missing = svc
            .create_comment(&who, new_comment(&a.id, Some("nope"), "reply"))
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");

        let cross = svc
            .create_comment(&who, new_comment(&b.id, Some(&on_a.id), "reply"))
            .await
            .unwrap_err();
        assert_eq!(cross.code(), "VALIDATION_ERROR");

        let reply = svc
            .create_comment(&who, new_comment(&a.id, Some(&on_a.id), "reply"))
            .await
            .unwrap();
        let replies = svc.replies(&on_a.id, None, None).await.unwrap();
        assert_eq!(replies.items, vec![reply]);

        let top = svc.comments(&a.id, None, None).await.unwrap();
        assert_eq!(top.items, vec![on_a]);
    }

    #[tokio::test]
    async fn listing_comments_of_unknown_post_is_not_found() {
        let svc = service();
        assert_eq!(
            svc.comments("ghost", None, None).await.unwrap_err().code(),
            "NOT_FOUND"
        );
        assert_eq!(
            svc.replies("ghost", None, None).await.unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn following_cursors_yields_every_post_once() {
        let svc = service();
        let mut created = Vec::new();
        for i in 0..23 {
            let post = svc
                .create_post(&Identity::Anonymous, new_post(&format!("post {}", i), true))
                .await
                .unwrap();
            created.push(post.id);
        }

        for limit in [1, 5, 10, 23, 40] {
            let mut seen = Vec::new();
            let mut cursor = None;
            loop {
                let page = svc.list_posts(Some(limit), cursor).await.unwrap();
                assert_eq!(page.total_count, 23);
                seen.extend(page.items);
                cursor = page.next_cursor;
                if cursor.is_none() {
                    break;
                }
            }

            assert!(seen.windows(2).all(|w| w[0].created_at > w[1].created_at));
            let ids: Vec<String> = seen.into_iter().map(|p| p.id).collect();
            let newest_first: Vec<String> = created.iter().rev().cloned().collect();
            assert_eq!(ids, newest_first, "limit {}", limit);
        }
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let svc = service();
        let err = svc
            .list_posts(Some(5), Some("2024-01-01T00:00:00Z".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CURSOR");
    }
}
