// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates everything once at startup; credentials are redacted from Debug output

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use valet_core::{DispatcherConfig, PollerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<MailboxConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<SocialConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the local model server
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Rolling conversation context kept per engine, in turns
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum hits returned by a memory search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DispatcherSection {
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    pub server: String,
    #[serde(default = "default_mailbox_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_mailbox_folder")]
    pub folder: String,
    #[serde(default = "default_feed_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_feed_backoff_secs")]
    pub backoff_secs: u64,
}

// Custom Debug impl to redact the account password
impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("folder", &self.folder)
            .field("poll_secs", &self.poll_secs)
            .field("backoff_secs", &self.backoff_secs)
            .finish()
    }
}

impl MailboxConfig {
    pub fn poller_config(&self) -> Result<PollerConfig> {
        PollerConfig::new(
            Duration::from_secs(self.poll_secs),
            Duration::from_secs(self.backoff_secs),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Local path where the network share is mounted
    pub mount_point: PathBuf,
    #[serde(default = "default_share_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_share_backoff_secs")]
    pub backoff_secs: u64,
}

impl ShareConfig {
    pub fn poller_config(&self) -> Result<PollerConfig> {
        PollerConfig::new(
            Duration::from_secs(self.poll_secs),
            Duration::from_secs(self.backoff_secs),
        )
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_feed_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_feed_backoff_secs")]
    pub backoff_secs: u64,
}

// Custom Debug impl to redact the API token
impl std::fmt::Debug for SocialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialConfig")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("poll_secs", &self.poll_secs)
            .field("backoff_secs", &self.backoff_secs)
            .finish()
    }
}

impl SocialConfig {
    pub fn poller_config(&self) -> Result<PollerConfig> {
        PollerConfig::new(
            Duration::from_secs(self.poll_secs),
            Duration::from_secs(self.backoff_secs),
        )
    }
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

fn default_context_turns() -> usize {
    10
}

fn default_search_limit() -> usize {
    5
}

fn default_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    256
}

fn default_mailbox_port() -> u16 {
    993
}

fn default_mailbox_folder() -> String {
    "INBOX".to_string()
}

fn default_feed_poll_secs() -> u64 {
    300
}

fn default_feed_backoff_secs() -> u64 {
    600
}

fn default_share_poll_secs() -> u64 {
    60
}

fn default_share_backoff_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Resolution order: explicit path argument, `VALET_CONFIG` env var,
    /// `valet.toml` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("VALET_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("valet.toml")),
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw)
    }

    /// Parse, apply env overrides, and validate
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(raw).context("invalid config file")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("VALET_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("VALET_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(mailbox) = self.mailbox.as_mut() {
            if let Ok(password) = std::env::var("VALET_MAILBOX_PASSWORD") {
                mailbox.password = password;
            }
        }
        if let Some(social) = self.social.as_mut() {
            if let Ok(token) = std::env::var("VALET_SOCIAL_ACCESS_TOKEN") {
                social.access_token = Some(token);
            }
        }
    }

    /// Validate the whole configuration once, at startup
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.llm.context_turns == 0 {
            bail!("llm.context_turns must be at least 1");
        }
        if self.dispatcher.workers == 0 {
            bail!("dispatcher.workers must be at least 1");
        }
        if let Some(mailbox) = &self.mailbox {
            if mailbox.server.trim().is_empty() || mailbox.username.trim().is_empty() {
                bail!("mailbox.server and mailbox.username must not be empty");
            }
            mailbox.poller_config().context("mailbox polling config")?;
        }
        if let Some(share) = &self.share {
            if share.mount_point.as_os_str().is_empty() {
                bail!("share.mount_point must not be empty");
            }
            share.poller_config().context("share polling config")?;
        }
        if let Some(social) = &self.social {
            social.poller_config().context("social polling config")?;
        }
        Ok(())
    }
}
