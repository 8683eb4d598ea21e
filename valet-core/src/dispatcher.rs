// ABOUTME: Queue-backed task dispatcher routing work to capability handlers.
// ABOUTME: Oneshot completion tickets, FIFO consumption, drain-on-stop semantics.

use crate::{
    events::{AssistantEvent, EventSink},
    metrics,
    registry::HandlerRegistry,
    task::{Task, TaskError, TaskResult, TaskStatus},
};
use anyhow::{anyhow, bail, Context, Result};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent consumption workers. With one worker tasks start
    /// strictly in submission order; with more, start order is respected but
    /// completion order is unspecified.
    pub workers: usize,
    /// Bounded queue capacity; a full queue applies backpressure on submit
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 256,
        }
    }
}

/// Completion handle returned by `submit`.
///
/// Resolved exactly once by the dispatcher when the task reaches a terminal
/// status. This replaces any polling of the task's status field.
#[derive(Debug)]
pub struct TaskTicket {
    task_id: String,
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskTicket {
    /// ID of the submitted task
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the task's result
    pub async fn wait(self) -> Result<TaskResult> {
        self.rx
            .await
            .context("dispatcher dropped the result channel")
    }
}

struct QueuedTask {
    task: Task,
    reply: oneshot::Sender<TaskResult>,
}

/// Owns the task queue and drives submitted tasks through their handlers.
///
/// One logical FIFO queue feeds `config.workers` consumption tasks. Every
/// submitted task produces exactly one `TaskResult`, delivered to the
/// submitter's ticket and to the event sink; handler failures and unknown
/// categories are reported there, never allowed to kill the loop.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    sink: EventSink,
    worker_count: usize,
    tx: Mutex<Option<mpsc::Sender<QueuedTask>>>,
    rx: Mutex<Option<mpsc::Receiver<QueuedTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher over a finished registry. Call `start` to begin
    /// consuming.
    pub fn new(registry: Arc<HandlerRegistry>, sink: EventSink, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            registry,
            sink,
            worker_count: config.workers.max(1),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue a task and return its completion ticket.
    ///
    /// Blocks only for enqueue (backpressure on a full queue). Errors if the
    /// dispatcher has been stopped.
    pub async fn submit(&self, mut task: Task) -> Result<TaskTicket> {
        let tx = {
            let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        let Some(tx) = tx else {
            bail!("dispatcher is stopped");
        };

        task.advance(TaskStatus::Queued)?;
        metrics::record_task_submitted(task.category());
        tracing::debug!(task_id = %task.id(), category = %task.category(), "task queued");

        let task_id = task.id().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(QueuedTask {
            task,
            reply: reply_tx,
        })
        .await
        .map_err(|_| anyhow!("dispatch queue closed while enqueuing"))?;

        Ok(TaskTicket {
            task_id,
            rx: reply_rx,
        })
    }

    /// Start the consumption worker(s). Idempotent; a second call is a no-op.
    pub fn start(&self) {
        let rx = {
            let mut guard = self.rx.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        let Some(rx) = rx else {
            tracing::debug!("dispatcher already started");
            return;
        };

        let queue = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for worker in 0..self.worker_count {
            workers.push(tokio::spawn(run_worker(
                worker,
                Arc::clone(&queue),
                Arc::clone(&self.registry),
                self.sink.clone(),
            )));
        }
        tracing::info!(workers = self.worker_count, "dispatcher started");
    }

    /// Stop accepting submissions, drain every queued task to a terminal
    /// status, and return once all workers have exited.
    pub async fn stop(&self) {
        let tx = {
            let mut guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        // Dropping the sender closes the queue; workers drain what is
        // buffered and then observe the close.
        drop(tx);

        let handles = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "dispatch worker terminated abnormally");
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

async fn run_worker(
    worker: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
    registry: Arc<HandlerRegistry>,
    sink: EventSink,
) {
    tracing::debug!(worker, "dispatch worker started");
    loop {
        // Hold the queue lock only while waiting for the next task, so other
        // workers can dequeue while this one is executing a handler.
        let next = { queue.lock().await.recv().await };
        let Some(queued) = next else {
            break;
        };
        process_task(queued, &registry, &sink).await;
    }
    tracing::debug!(worker, "dispatch worker drained and exited");
}

/// Drive one task to a terminal status and deliver its result.
///
/// The ticket is resolved and the event published before the worker takes
/// the next task.
async fn process_task(queued: QueuedTask, registry: &HandlerRegistry, sink: &EventSink) {
    let QueuedTask { mut task, reply } = queued;
    if let Err(err) = task.advance(TaskStatus::Running) {
        tracing::error!(task_id = %task.id(), error = %err, "task arrived in unexpected state");
    }
    let task_id = task.id().to_string();
    let category = task.category().to_string();

    let result = match registry.lookup(&category) {
        None => {
            tracing::warn!(task_id = %task_id, category = %category, "no handler registered for task category");
            TaskResult::failed(&task_id, TaskError::handler_not_found(&category))
        }
        Some(handler) => {
            let started = std::time::Instant::now();
            let outcome = AssertUnwindSafe(handler.execute(&task)).catch_unwind().await;
            metrics::record_task_duration(&category, started.elapsed().as_secs_f64());

            match outcome {
                Ok(Ok(payload)) => TaskResult::succeeded(&task_id, payload),
                Ok(Err(err)) => {
                    tracing::warn!(
                        task_id = %task_id,
                        category = %category,
                        handler = handler.name(),
                        error = %err,
                        "handler returned error"
                    );
                    TaskResult::failed(&task_id, TaskError::handler_failed(format!("{:#}", err)))
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    tracing::error!(
                        task_id = %task_id,
                        category = %category,
                        handler = handler.name(),
                        panic = %message,
                        "handler panicked"
                    );
                    TaskResult::failed(
                        &task_id,
                        TaskError::handler_failed(format!("handler panicked: {}", message)),
                    )
                }
            }
        }
    };

    let terminal = if result.success {
        TaskStatus::Succeeded
    } else {
        TaskStatus::Failed
    };
    if let Err(err) = task.advance(terminal) {
        tracing::error!(task_id = %task_id, error = %err, "failed to record terminal status");
    }
    metrics::record_task_finished(&category, result.success);

    let event = if result.success {
        AssistantEvent::task_completed(&task_id, &category, payload_preview(result.payload.as_ref()))
    } else {
        AssistantEvent::task_failed(&task_id, &category, result.error_message())
    };

    if reply.send(result).is_err() {
        tracing::debug!(task_id = %task_id, "submitter dropped the result ticket");
    }
    sink.publish(event);
}

fn payload_preview(payload: Option<&Value>) -> String {
    let rendered = match payload {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    rendered.chars().take(120).collect()
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let dispatcher = Dispatcher::new(
            Arc::new(HandlerRegistry::new()),
            EventSink::default(),
            DispatcherConfig {
                workers: 0,
                queue_capacity: 0,
            },
        );
        assert_eq!(dispatcher.worker_count, 1);
    }

    #[test]
    fn test_payload_preview_truncates() {
        let long = Value::String("x".repeat(500));
        assert_eq!(payload_preview(Some(&long)).len(), 120);
        assert_eq!(payload_preview(None), "");
    }
}
