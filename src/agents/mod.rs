// ABOUTME: Capability agents executed by the dispatcher, one per task category.
// ABOUTME: Shared accessors for the opaque task parameter bag.

pub mod document;
pub mod mailbox;
pub mod social;

pub use document::DocumentAgent;
pub use mailbox::MailboxAgent;
pub use social::SocialAgent;

use anyhow::{bail, Result};
use serde_json::Value;
use valet_core::Task;

/// Required string parameter from the task's parameter bag
pub(crate) fn require_str<'a>(task: &'a Task, key: &str) -> Result<&'a str> {
    match task.parameters().get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => bail!("task parameter '{}' is missing or empty", key),
    }
}

/// Optional string parameter
pub(crate) fn optional_str<'a>(task: &'a Task, key: &str) -> Option<&'a str> {
    task.parameters().get(key).and_then(Value::as_str)
}
