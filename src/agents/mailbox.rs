// ABOUTME: Mailbox agent: summarizes and triages messages, marks them read.
// ABOUTME: Outcomes are recorded to memory so later queries can recall them.

use crate::agents::require_str;
use crate::feeds::MailboxClient;
use crate::llm::LanguageModel;
use crate::memory::MemoryStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use valet_core::{AgentHandler, Task};

/// Task category served by this agent
pub const CATEGORY: &str = "mailbox";

pub struct MailboxAgent {
    llm: Arc<dyn LanguageModel>,
    memory: Arc<dyn MemoryStore>,
    client: Arc<dyn MailboxClient>,
}

impl MailboxAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        memory: Arc<dyn MemoryStore>,
        client: Arc<dyn MailboxClient>,
    ) -> Self {
        Self {
            llm,
            memory,
            client,
        }
    }

    async fn summarize(&self, task: &Task) -> Result<Value> {
        let from = require_str(task, "from")?;
        let subject = require_str(task, "subject")?;
        let body = require_str(task, "body")?;

        let prompt = format!(
            "Summarize this email in two sentences and say whether it needs a reply.\n\n\
             From: {}\nSubject: {}\n\n{}",
            from, subject, body
        );
        let summary = self.llm.generate(&prompt).await?;

        self.memory
            .store(
                &format!("Email from {} ({}): {}", from, subject, summary),
                json!({
                    "kind": "mail_summary",
                    "task_id": task.id(),
                    "from": from,
                    "subject": subject,
                }),
            )
            .await?;

        Ok(json!({"summary": summary}))
    }

    async fn mark_read(&self, task: &Task) -> Result<Value> {
        let message_id = require_str(task, "message_id")?;
        self.client.mark_read(message_id).await?;
        tracing::debug!(message_id = %message_id, "message marked read");
        Ok(json!({"message_id": message_id, "marked_read": true}))
    }
}

#[async_trait]
impl AgentHandler for MailboxAgent {
    fn name(&self) -> &'static str {
        "mailbox"
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        match require_str(task, "action")? {
            "summarize" => self.summarize(task).await,
            "mark_read" => self.mark_read(task).await,
            other => bail!("unsupported mailbox action: {}", other),
        }
    }
}
