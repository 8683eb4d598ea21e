// ABOUTME: AgentHandler capability trait implemented once per task category.
// ABOUTME: Handlers return a payload or an error; the dispatcher builds the TaskResult.

use crate::task::Task;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Capability interface for one task category.
///
/// Handlers hold no state beyond injected collaborators. A returned `Err`
/// (or a panic) is converted by the dispatcher into a failed `TaskResult`;
/// it never terminates the dispatch loop.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Handler name for logging and metrics
    fn name(&self) -> &'static str;

    /// Execute one task, returning the result payload
    async fn execute(&self, task: &Task) -> Result<Value>;
}
