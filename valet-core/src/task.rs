// ABOUTME: Task and TaskResult model for the dispatch engine.
// ABOUTME: Status transitions are monotonic; exactly one result per task.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Lifecycle status of a task.
///
/// Transitions are monotonic along
/// `Submitted -> Queued -> Running -> {Succeeded | Failed}`;
/// a backward transition is never allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Submitted,
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Queued)
                | (Self::Queued, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    /// Status name for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// A unit of work routed to a capability handler by category.
///
/// The parameter bag is opaque to the dispatcher; only the handler
/// selected by `category` interprets it.
#[derive(Debug, Clone)]
pub struct Task {
    id: String,
    category: String,
    parameters: Value,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in `Submitted` state with a fresh unique id
    pub fn new(category: impl Into<String>, parameters: Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category: category.into(),
            parameters,
            status: TaskStatus::Submitted,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Advance the status, rejecting any non-monotonic transition
    pub fn advance(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            bail!(
                "invalid task status transition: {} -> {}",
                self.status.as_str(),
                next.as_str()
            );
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Typed error codes carried in a failed TaskResult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorCode {
    /// No handler registered for the task category
    HandlerNotFound,
    /// The handler returned an error or panicked
    HandlerFailed,
}

impl TaskErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandlerNotFound => "handler_not_found",
            Self::HandlerFailed => "handler_failed",
        }
    }
}

/// Failure description attached to a failed TaskResult
#[derive(Debug, Clone)]
pub struct TaskError {
    pub code: TaskErrorCode,
    pub message: String,
}

impl TaskError {
    pub fn handler_not_found(category: &str) -> Self {
        Self {
            code: TaskErrorCode::HandlerNotFound,
            message: format!("unknown task category: {}", category),
        }
    }

    pub fn handler_failed(message: impl Into<String>) -> Self {
        Self {
            code: TaskErrorCode::HandlerFailed,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

/// Outcome of a task that reached a terminal status.
///
/// The payload is present iff the task succeeded; the error iff it failed.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub payload: Option<Value>,
    pub error: Option<TaskError>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn succeeded(task_id: impl Into<String>, payload: Value) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            payload: Some(payload),
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(task_id: impl Into<String>, error: TaskError) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            payload: None,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }

    /// Error message, or empty string for successful results
    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or("")
    }
}
