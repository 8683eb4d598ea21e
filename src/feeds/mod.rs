// ABOUTME: Feed client interfaces and checkpoint adapters for the background pollers.
// ABOUTME: Adapters turn integration items into JSON payloads and compute the next cursor.

pub mod share;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use valet_core::{AssistantEvent, Checkpoint, Deliver, EventSink, FeedSource, FetchBatch};

pub use share::{ShareStore, ShareWatcher};

/// A message observed in the mailbox
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub date: DateTime<Utc>,
    pub body: String,
}

/// Narrow interface to the mailbox integration.
///
/// The wire protocol (IMAP or otherwise) lives entirely behind this trait.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Fetch messages newer than `since`, oldest first
    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<MailMessage>>;

    /// Mark a message as read
    async fn mark_read(&self, message_id: &str) -> Result<()>;
}

/// A post observed on a social timeline
#[derive(Debug, Clone)]
pub struct SocialPost {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub likes: u64,
}

/// Narrow interface to the social-media integration
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Fetch timeline posts newer than `since_id`, oldest first
    async fn timeline_since(&self, since_id: Option<&str>) -> Result<Vec<SocialPost>>;

    /// Publish a post
    async fn post(&self, text: &str) -> Result<SocialPost>;
}

/// Mailbox feed: timestamp cursor over `fetch_since`
pub struct MailboxFeed {
    client: Arc<dyn MailboxClient>,
}

impl MailboxFeed {
    pub fn new(client: Arc<dyn MailboxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for MailboxFeed {
    type Item = Value;

    fn name(&self) -> &str {
        "mailbox"
    }

    async fn poll(&mut self, since: &Checkpoint) -> Result<FetchBatch<Value>> {
        let messages = self.client.fetch_since(since.as_timestamp()).await?;
        // The cursor never regresses, even if the client replays old mail.
        let newest = messages.iter().map(|m| m.date).max();
        let checkpoint = match (newest, since.as_timestamp()) {
            (Some(n), Some(s)) if n <= s => since.clone(),
            (Some(n), _) => Checkpoint::Timestamp(n),
            (None, _) => since.clone(),
        };
        let items = messages.iter().map(mail_payload).collect();
        Ok(FetchBatch { items, checkpoint })
    }
}

fn mail_payload(message: &MailMessage) -> Value {
    json!({
        "message_id": message.message_id,
        "subject": message.subject,
        "from": message.from,
        "date": message.date.to_rfc3339(),
        "body": message.body,
    })
}

/// Social feed: last-seen-id cursor over `timeline_since`
pub struct SocialFeed {
    client: Arc<dyn SocialClient>,
}

impl SocialFeed {
    pub fn new(client: Arc<dyn SocialClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for SocialFeed {
    type Item = Value;

    fn name(&self) -> &str {
        "social"
    }

    async fn poll(&mut self, since: &Checkpoint) -> Result<FetchBatch<Value>> {
        let posts = self.client.timeline_since(since.as_last_id()).await?;
        let checkpoint = posts
            .last()
            .map(|p| Checkpoint::LastId(p.id.clone()))
            .unwrap_or_else(|| since.clone());
        let items = posts.iter().map(social_payload).collect();
        Ok(FetchBatch { items, checkpoint })
    }
}

fn social_payload(post: &SocialPost) -> Value {
    json!({
        "id": post.id,
        "author": post.author,
        "text": post.text,
        "created_at": post.created_at.to_rfc3339(),
        "likes": post.likes,
    })
}

/// Delivery callback that publishes every feed item to the event sink.
///
/// Publishing is fire-and-forget and the sink dedupes nothing; subscribers
/// get at-least-once delivery keyed by the item payload's own identity.
pub struct SinkDeliver {
    feed: String,
    sink: EventSink,
}

impl SinkDeliver {
    pub fn new(feed: impl Into<String>, sink: EventSink) -> Self {
        Self {
            feed: feed.into(),
            sink,
        }
    }
}

#[async_trait]
impl Deliver<Value> for SinkDeliver {
    async fn deliver(&self, item: Value) -> Result<()> {
        self.sink.publish(AssistantEvent::feed_item(&self.feed, item));
        Ok(())
    }
}
