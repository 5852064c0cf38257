//! In-process fan-out of newly created comments to live subscribers.
//!
//! Each subscription owns a capacity-1 channel registered under its post id.
//! Publishing never waits: a subscriber whose buffer still holds an undelivered
//! comment simply misses the new one. Delivery is best effort and in publish
//! order, with gaps.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use blog_types::models::Comment;

/// Buffered comments per subscriber.
const SUBSCRIBER_BUFFER: usize = 1;

/// post_id -> (subscription id -> sender)
type Registry = HashMap<String, HashMap<Uuid, mpsc::Sender<Comment>>>;

/// Registry of comment subscribers keyed by post id.
#[derive(Clone)]
pub struct CommentHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    topics: RwLock<Registry>,

    /// Fired by `unsubscribe_all`; releases every lifecycle watcher.
    shutdown: CancellationToken,
}

impl Default for CommentHub {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Register a new delivery channel for `post_id`.
    ///
    /// The channel stays registered until `cancel` fires, at which point it is
    /// removed and closed; the receiver yields any buffered comment and then
    /// `None`. The post's entry disappears with its last subscriber.
    pub async fn subscribe(&self, post_id: &str, cancel: CancellationToken) -> mpsc::Receiver<Comment> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        if self.inner.shutdown.is_cancelled() {
            // Dropping tx hands back an already-closed channel.
            return rx;
        }

        let sub_id = Uuid::new_v4();
        {
            let mut topics = self.inner.topics.write().await;
            // `unsubscribe_all` may have cleared the registry while we waited.
            if self.inner.shutdown.is_cancelled() {
                return rx;
            }
            topics.entry(post_id.to_string()).or_default().insert(sub_id, tx);
        }
        debug!("Subscription {} registered for post {}", sub_id, post_id);

        let hub = self.clone();
        let post_id = post_id.to_string();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => hub.unsubscribe(&post_id, sub_id).await,
                _ = shutdown.cancelled() => {}
            }
        });

        rx
    }

    /// Offer `comment` to every subscriber of `post_id` without waiting.
    /// Returns how many subscribers accepted it.
    pub async fn publish(&self, post_id: &str, comment: &Comment) -> usize {
        // Deregistration needs the write lock, so no sender can be closed by
        // the hub while this loop runs.
        let topics = self.inner.topics.read().await;
        let Some(subscribers) = topics.get(post_id) else {
            trace!("No subscribers for post {}", post_id);
            return 0;
        };

        let mut delivered = 0;
        for (sub_id, tx) in subscribers {
            match tx.try_send(comment.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("Subscription {} still has a pending comment, skipping {}", sub_id, comment.id);
                }
                Err(TrySendError::Closed(_)) => {
                    trace!("Subscription {} receiver already dropped", sub_id);
                }
            }
        }

        debug!(
            "Published comment {} to {}/{} subscribers of post {}",
            comment.id,
            delivered,
            subscribers.len(),
            post_id
        );
        delivered
    }

    /// Drop every registration and close every channel. Later subscriptions
    /// receive closed channels.
    pub async fn unsubscribe_all(&self) {
        self.inner.shutdown.cancel();
        let mut topics = self.inner.topics.write().await;
        let count: usize = topics.values().map(HashMap::len).sum();
        topics.clear();
        info!("Comment hub shut down, closed {} subscriptions", count);
    }

    pub async fn subscriber_count(&self, post_id: &str) -> usize {
        self.inner
            .topics
            .read()
            .await
            .get(post_id)
            .map_or(0, HashMap::len)
    }

    /// Number of posts with at least one live subscriber.
    pub async fn topic_count(&self) -> usize {
        self.inner.topics.read().await.len()
    }

    async fn unsubscribe(&self, post_id: &str, sub_id: Uuid) {
        let mut topics = self.inner.topics.write().await;
        let Some(subscribers) = topics.get_mut(post_id) else {
            return;
        };

        // Removing the sender is what closes the channel.
        if subscribers.remove(&sub_id).is_some() {
            debug!("Subscription {} for post {} cancelled", sub_id, post_id);
        }
        if subscribers.is_empty() {
            topics.remove(post_id);
            debug!("Post {} has no subscribers left", post_id);
        }
    }
}
