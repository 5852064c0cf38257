//! GraphQL schema: posts and threaded comments, with a live `commentAdded`
//! subscription per post.
//!
//! Per-request collaborators travel as request data: the caller's
//! [`Identity`] always, and a [`CommentLoader`] for plain HTTP requests.
//! WebSocket connections carry only the identity, so nested comment pages
//! there go straight to the store instead of sharing a loader across
//! operations.

use async_graphql::{
    Context, ErrorExtensions, Object, Result as GraphQLResult, Schema, SimpleObject, Subscription,
};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use blog_types::BlogError;
use blog_types::cursor::CursorScope;
use blog_types::models::{self, NewComment, NewPost, Page};

use crate::auth::Identity;
use crate::loader::{CommentLoader, load_first_page};
use crate::service::{ContentService, page_size};

pub type BlogSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

pub fn build_schema(service: ContentService) -> BlogSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(service)
        .finish()
}

/// Carry the error's machine code into the response `extensions`.
fn gql(err: BlogError) -> async_graphql::Error {
    let code = err.code();
    async_graphql::Error::new(err.to_string()).extend_with(|_, ext| ext.set("code", code))
}

fn service<'a>(ctx: &Context<'a>) -> GraphQLResult<&'a ContentService> {
    ctx.data::<ContentService>()
}

static ANONYMOUS: Identity = Identity::Anonymous;

fn identity<'a>(ctx: &Context<'a>) -> &'a Identity {
    ctx.data_opt::<Identity>().unwrap_or(&ANONYMOUS)
}

// -- Objects --

pub struct Post(pub models::Post);

#[Object]
impl Post {
    async fn id(&self) -> &str {
        &self.0.id
    }

    async fn title(&self) -> &str {
        &self.0.title
    }

    async fn content(&self) -> &str {
        &self.0.content
    }

    async fn author_id(&self) -> &str {
        &self.0.author_id
    }

    async fn allow_comments(&self) -> bool {
        self.0.allow_comments
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    /// Top-level comments, newest first. The first page of sibling posts is
    /// fetched in one batch.
    async fn comments(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> GraphQLResult<PaginatedComments> {
        let limit = page_size(limit);
        if cursor.is_none() {
            if let Some(loader) = ctx.data_opt::<CommentLoader>() {
                if limit <= loader.loader().page_size() {
                    let scope = CursorScope::comments(&self.0.id, None);
                    let page = load_first_page(loader, &self.0.id).await.map_err(gql)?;
                    return Ok(page.truncate(limit, &scope).into());
                }
            }
        }

        let page = service(ctx)?
            .comments(&self.0.id, Some(limit as i32), cursor)
            .await
            .map_err(gql)?;
        Ok(page.into())
    }
}

pub struct Comment(pub models::Comment);

#[Object]
impl Comment {
    async fn id(&self) -> &str {
        &self.0.id
    }

    async fn post_id(&self) -> &str {
        &self.0.post_id
    }

    async fn parent_id(&self) -> Option<&str> {
        self.0.parent_id.as_deref()
    }

    async fn author_id(&self) -> &str {
        &self.0.author_id
    }

    async fn content(&self) -> &str {
        &self.0.content
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    /// Direct replies, newest first.
    async fn replies(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> GraphQLResult<PaginatedComments> {
        let page = service(ctx)?
            .replies_of(&self.0, limit, cursor)
            .await
            .map_err(gql)?;
        Ok(page.into())
    }
}

#[derive(SimpleObject)]
pub struct PaginatedPosts {
    pub posts: Vec<Post>,
    pub total_count: usize,
    pub next_cursor: Option<String>,
}

impl From<Page<models::Post>> for PaginatedPosts {
    fn from(page: Page<models::Post>) -> Self {
        Self {
            posts: page.items.into_iter().map(Post).collect(),
            total_count: page.total_count,
            next_cursor: page.next_cursor,
        }
    }
}

#[derive(SimpleObject)]
pub struct PaginatedComments {
    pub comments: Vec<Comment>,
    pub total_count: usize,
    pub next_cursor: Option<String>,
}

impl From<Page<models::Comment>> for PaginatedComments {
    fn from(page: Page<models::Comment>) -> Self {
        Self {
            comments: page.items.into_iter().map(Comment).collect(),
            total_count: page.total_count,
            next_cursor: page.next_cursor,
        }
    }
}

// -- Roots --

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn posts(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> GraphQLResult<PaginatedPosts> {
        let page = service(ctx)?.list_posts(limit, cursor).await.map_err(gql)?;
        Ok(page.into())
    }

    async fn post(&self, ctx: &Context<'_>, id: String) -> GraphQLResult<Post> {
        let post = service(ctx)?.get_post(&id).await.map_err(gql)?;
        Ok(Post(post))
    }

    async fn comments(
        &self,
        ctx: &Context<'_>,
        post_id: String,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> GraphQLResult<PaginatedComments> {
        let page = service(ctx)?
            .comments(&post_id, limit, cursor)
            .await
            .map_err(gql)?;
        Ok(page.into())
    }

    async fn replies(
        &self,
        ctx: &Context<'_>,
        comment_id: String,
        limit: Option<i32>,
        cursor: Option<String>,
    ) -> GraphQLResult<PaginatedComments> {
        let page = service(ctx)?
            .replies(&comment_id, limit, cursor)
            .await
            .map_err(gql)?;
        Ok(page.into())
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_post(
        &self,
        ctx: &Context<'_>,
        title: String,
        content: String,
        allow_comments: bool,
    ) -> GraphQLResult<Post> {
        let input = NewPost {
            title,
            content,
            allow_comments,
        };
        let post = service(ctx)?
            .create_post(identity(ctx), input)
            .await
            .map_err(gql)?;
        Ok(Post(post))
    }

    async fn create_comment(
        &self,
        ctx: &Context<'_>,
        post_id: String,
        parent_id: Option<String>,
        content: String,
    ) -> GraphQLResult<Comment> {
        let input = NewComment {
            post_id,
            parent_id,
            content,
        };
        let comment = service(ctx)?
            .create_comment(identity(ctx), input)
            .await
            .map_err(gql)?;
        Ok(Comment(comment))
    }
}

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Comments created on `post_id` from now on. Delivery is best effort: a
    /// client that falls behind skips comments rather than slowing writers.
    async fn comment_added(
        &self,
        ctx: &Context<'_>,
        post_id: String,
    ) -> async_graphql::Result<impl Stream<Item = Comment>> {
        let service = service(ctx)?;
        let cancel = CancellationToken::new();
        let mut rx = service.subscribe(&post_id, cancel.clone()).await;

        // Dropping the stream (client stop, disconnect) cancels the registration.
        let guard = cancel.drop_guard();
        debug!("commentAdded stream opened for post {}", post_id);

        Ok(async_stream::stream! {
            let _guard = guard;
            while let Some(comment) = rx.recv().await {
                yield Comment(comment);
            }
        })
    }
}
