// ABOUTME: Language-model interface with a rolling, trimmed conversation context.
// ABOUTME: OllamaEngine talks to an Ollama-compatible local server over HTTP.

use crate::config::LlmConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Rolling conversation context.
///
/// Keeps at most `max_turns` turns, dropping the oldest. The limit is
/// configuration (`llm.context_turns`), not a constant.
#[derive(Debug)]
pub struct ContextWindow {
    max_turns: usize,
    turns: Vec<ChatTurn>,
}

impl ContextWindow {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            turns: Vec::new(),
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Narrow interface to the language model: prompt in, text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &'static str;

    /// Generate a response to the prompt, using the engine's own context
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
struct GenerationOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for an Ollama-compatible `/api/chat` server.
///
/// Maintains its own rolling context window across `generate` calls.
pub struct OllamaEngine {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    options: GenerationOptions,
    context: Mutex<ContextWindow>,
}

impl OllamaEngine {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: GenerationOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
            },
            context: Mutex::new(ContextWindow::new(config.context_turns)),
        }
    }

    /// List models available on the server
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .context("model server unreachable")?
            .error_for_status()
            .context("model server rejected tag listing")?;
        let tags: TagsResponse = response.json().await.context("malformed tag listing")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Drop the rolling conversation context
    pub async fn clear_context(&self) {
        self.context.lock().await.clear();
    }
}

#[async_trait]
impl LanguageModel for OllamaEngine {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let messages = {
            let context = self.context.lock().await;
            let mut messages = context.turns().to_vec();
            messages.push(ChatTurn::user(prompt));
            messages
        };

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: &self.options,
        };
        let response = self
            .http
            .post(format!("{}/api/chat", self.endpoint))
            .json(&request)
            .send()
            .await
            .context("model server unreachable")?
            .error_for_status()
            .context("model server returned an error")?;
        let body: ChatResponse = response.json().await.context("malformed model response")?;
        let reply = body.message.content;

        // Only a successful exchange enters the rolling context.
        let mut context = self.context.lock().await;
        context.push(ChatTurn::user(prompt));
        context.push(ChatTurn::assistant(reply.clone()));

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_window_trims_oldest() {
        let mut window = ContextWindow::new(3);
        for n in 0..5 {
            window.push(ChatTurn::user(format!("msg {}", n)));
        }
        let turns = window.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].content, "msg 2");
        assert_eq!(turns[2].content, "msg 4");
    }

    #[test]
    fn test_context_window_clear() {
        let mut window = ContextWindow::new(4);
        window.push(ChatTurn::user("hello"));
        window.push(ChatTurn::assistant("hi"));
        window.clear();
        assert!(window.turns().is_empty());
    }

    #[test]
    fn test_zero_turn_window_clamped() {
        let mut window = ContextWindow::new(0);
        window.push(ChatTurn::user("a"));
        window.push(ChatTurn::user("b"));
        assert_eq!(window.turns().len(), 1);
        assert_eq!(window.turns()[0].content, "b");
    }

    #[test]
    fn test_chat_request_shape() {
        let options = GenerationOptions {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        };
        let request = ChatRequest {
            model: "llama3",
            messages: vec![ChatTurn::user("hello")],
            stream: false,
            options: &options,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["options"]["top_k"], 40);
    }
}
