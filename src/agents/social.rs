// ABOUTME: Social agent: drafts posts, publishes them, digests the timeline.
// ABOUTME: Drafting never publishes; posting takes explicit text.

use crate::agents::require_str;
use crate::feeds::SocialClient;
use crate::llm::LanguageModel;
use crate::memory::MemoryStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use valet_core::{AgentHandler, Task};

/// Task category served by this agent
pub const CATEGORY: &str = "social";

/// Timeline posts considered by a digest
const DIGEST_POST_LIMIT: usize = 20;

pub struct SocialAgent {
    llm: Arc<dyn LanguageModel>,
    memory: Arc<dyn MemoryStore>,
    client: Arc<dyn SocialClient>,
}

impl SocialAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        memory: Arc<dyn MemoryStore>,
        client: Arc<dyn SocialClient>,
    ) -> Self {
        Self {
            llm,
            memory,
            client,
        }
    }

    async fn draft(&self, task: &Task) -> Result<Value> {
        let topic = require_str(task, "topic")?;
        let prompt = format!(
            "Draft a short, friendly social media post about: {}. \
             Keep it under 280 characters and do not use hashtags.",
            topic
        );
        let draft = self.llm.generate(&prompt).await?;
        Ok(json!({"topic": topic, "draft": draft}))
    }

    async fn post(&self, task: &Task) -> Result<Value> {
        let text = require_str(task, "text")?;
        let posted = self.client.post(text).await?;
        self.memory
            .store(
                &format!("Posted to timeline: {}", posted.text),
                json!({
                    "kind": "social_post",
                    "task_id": task.id(),
                    "post_id": posted.id,
                }),
            )
            .await?;
        Ok(json!({"id": posted.id, "text": posted.text}))
    }

    async fn digest(&self, task: &Task) -> Result<Value> {
        let posts = self.client.timeline_since(None).await?;
        if posts.is_empty() {
            return Ok(json!({"digest": "Timeline is quiet.", "post_count": 0}));
        }

        let mut listing = String::new();
        for post in posts.iter().rev().take(DIGEST_POST_LIMIT) {
            listing.push_str(&format!("- {}: {}\n", post.author, post.text));
        }
        let prompt = format!(
            "Summarize what is happening on this timeline in three sentences.\n\n{}",
            listing
        );
        let digest = self.llm.generate(&prompt).await?;

        self.memory
            .store(
                &format!("Timeline digest: {}", digest),
                json!({
                    "kind": "social_digest",
                    "task_id": task.id(),
                    "post_count": posts.len(),
                }),
            )
            .await?;

        Ok(json!({"digest": digest, "post_count": posts.len()}))
    }
}

#[async_trait]
impl AgentHandler for SocialAgent {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        match require_str(task, "action")? {
            "draft" => self.draft(task).await,
            "post" => self.post(task).await,
            "digest" => self.digest(task).await,
            other => bail!("unsupported social action: {}", other),
        }
    }
}
