// ABOUTME: Document agent: summarizes and lists files on the mounted share.
// ABOUTME: Large documents are excerpted before being handed to the model.

use crate::agents::{optional_str, require_str};
use crate::feeds::ShareStore;
use crate::llm::LanguageModel;
use crate::memory::MemoryStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use valet_core::{AgentHandler, Task};

/// Task category served by this agent
pub const CATEGORY: &str = "document";

/// Documents are truncated to this many characters before prompting
const DOC_EXCERPT_CHARS: usize = 8000;

pub struct DocumentAgent {
    llm: Arc<dyn LanguageModel>,
    memory: Arc<dyn MemoryStore>,
    files: Arc<ShareStore>,
}

impl DocumentAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        memory: Arc<dyn MemoryStore>,
        files: Arc<ShareStore>,
    ) -> Self {
        Self { llm, memory, files }
    }

    async fn summarize(&self, task: &Task) -> Result<Value> {
        let path = require_str(task, "path")?;
        let contents = self.files.read_file(path).await?;
        let text = String::from_utf8_lossy(&contents);
        let excerpt: String = text.chars().take(DOC_EXCERPT_CHARS).collect();
        let truncated = text.chars().count() > DOC_EXCERPT_CHARS;

        let prompt = format!(
            "Summarize the key points of this document in a short paragraph.\n\n\
             Document ({}):\n{}",
            path, excerpt
        );
        let summary = self.llm.generate(&prompt).await?;

        self.memory
            .store(
                &format!("Document {}: {}", path, summary),
                json!({
                    "kind": "document_summary",
                    "task_id": task.id(),
                    "path": path,
                }),
            )
            .await?;

        Ok(json!({"path": path, "summary": summary, "truncated": truncated}))
    }

    async fn list(&self, task: &Task) -> Result<Value> {
        let path = optional_str(task, "path").unwrap_or("");
        let entries = self.files.list_dir(path).await?;
        Ok(json!({"path": path, "entries": entries}))
    }
}

#[async_trait]
impl AgentHandler for DocumentAgent {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        match require_str(task, "action")? {
            "summarize" => self.summarize(task).await,
            "list" => self.list(task).await,
            other => bail!("unsupported document action: {}", other),
        }
    }
}
