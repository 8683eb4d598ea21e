// ABOUTME: Integration tests for the task dispatcher.
// ABOUTME: Covers routing, failure isolation, FIFO ordering, and drain-on-stop.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use valet_core::{
    AgentHandler, AssistantEvent, Dispatcher, DispatcherConfig, EventSink, HandlerRegistry, Task,
    TaskErrorCode,
};

/// Handler that records the order tasks start in
struct RecordingHandler {
    starts: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl RecordingHandler {
    fn new(starts: Arc<Mutex<Vec<String>>>, delay: Duration) -> Self {
        Self { starts, delay }
    }
}

#[async_trait]
impl AgentHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn execute(&self, task: &Task) -> Result<Value> {
        self.starts.lock().unwrap().push(task.id().to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(json!({"ok": true}))
    }
}

struct FailingHandler;

#[async_trait]
impl AgentHandler for FailingHandler {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn execute(&self, _task: &Task) -> Result<Value> {
        bail!("mailbox backend unreachable")
    }
}

struct PanickingHandler;

#[async_trait]
impl AgentHandler for PanickingHandler {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn execute(&self, _task: &Task) -> Result<Value> {
        panic!("handler blew up");
    }
}

fn started(registry: HandlerRegistry, config: DispatcherConfig) -> (Dispatcher, EventSink) {
    let sink = EventSink::new(64);
    let dispatcher = Dispatcher::new(Arc::new(registry), sink.clone(), config);
    dispatcher.start();
    (dispatcher, sink)
}

#[tokio::test]
async fn test_handler_invoked_exactly_once_with_matching_id() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new().register(
        "echo",
        RecordingHandler::new(Arc::clone(&starts), Duration::ZERO),
    );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    let task = Task::new("echo", json!({"k": "v"}));
    let task_id = task.id().to_string();
    let ticket = dispatcher.submit(task).await.unwrap();
    assert_eq!(ticket.task_id(), task_id);

    let result = ticket.wait().await.unwrap();
    assert!(result.success);
    assert_eq!(result.task_id, task_id);
    assert_eq!(starts.lock().unwrap().as_slice(), &[task_id]);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_unknown_category_fails_without_halting_loop() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new().register(
        "known",
        RecordingHandler::new(Arc::clone(&starts), Duration::ZERO),
    );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    let bad = dispatcher
        .submit(Task::new("nonexistent", json!({})))
        .await
        .unwrap();
    let good = dispatcher
        .submit(Task::new("known", json!({})))
        .await
        .unwrap();

    let bad_result = bad.wait().await.unwrap();
    assert!(!bad_result.success);
    let error = bad_result.error.unwrap();
    assert_eq!(error.code, TaskErrorCode::HandlerNotFound);
    assert!(error.message.contains("nonexistent"));

    // The loop kept going: the valid task still completes.
    let good_result = good.wait().await.unwrap();
    assert!(good_result.success);

    dispatcher.stop().await;
}

#[tokio::test]
async fn test_handler_error_is_contained() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new()
        .register("failing", FailingHandler)
        .register(
            "echo",
            RecordingHandler::new(Arc::clone(&starts), Duration::ZERO),
        );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    let failed = dispatcher
        .submit(Task::new("failing", json!({})))
        .await
        .unwrap();
    let ok = dispatcher.submit(Task::new("echo", json!({}))).await.unwrap();

    let result = failed.wait().await.unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, TaskErrorCode::HandlerFailed);
    assert!(error.message.contains("mailbox backend unreachable"));

    assert!(ok.wait().await.unwrap().success);
    dispatcher.stop().await;
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new()
        .register("panicking", PanickingHandler)
        .register(
            "echo",
            RecordingHandler::new(Arc::clone(&starts), Duration::ZERO),
        );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    let panicked = dispatcher
        .submit(Task::new("panicking", json!({})))
        .await
        .unwrap();
    let ok = dispatcher.submit(Task::new("echo", json!({}))).await.unwrap();

    let result = panicked.wait().await.unwrap();
    assert!(!result.success);
    assert!(result.error_message().contains("handler blew up"));

    assert!(ok.wait().await.unwrap().success);
    dispatcher.stop().await;
}

#[tokio::test]
async fn test_single_worker_starts_tasks_in_submission_order() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new().register(
        "echo",
        RecordingHandler::new(Arc::clone(&starts), Duration::from_millis(20)),
    );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    let first = Task::new("echo", json!({"n": 1}));
    let second = Task::new("echo", json!({"n": 2}));
    let first_id = first.id().to_string();
    let second_id = second.id().to_string();

    let ticket_a = dispatcher.submit(first).await.unwrap();
    let ticket_b = dispatcher.submit(second).await.unwrap();
    ticket_a.wait().await.unwrap();
    ticket_b.wait().await.unwrap();

    assert_eq!(starts.lock().unwrap().as_slice(), &[first_id, second_id]);
    dispatcher.stop().await;
}

#[tokio::test]
async fn test_stop_drains_queued_tasks() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new().register(
        "slow",
        RecordingHandler::new(Arc::clone(&starts), Duration::from_millis(30)),
    );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    let mut tickets = Vec::new();
    for n in 0..4 {
        tickets.push(
            dispatcher
                .submit(Task::new("slow", json!({"n": n})))
                .await
                .unwrap(),
        );
    }

    dispatcher.stop().await;

    // Every task queued before stop reached a terminal status; the tickets
    // resolve without further waiting.
    assert_eq!(starts.lock().unwrap().len(), 4);
    for ticket in tickets {
        let result = tokio::time::timeout(Duration::from_millis(10), ticket.wait())
            .await
            .expect("ticket should already be resolved")
            .unwrap();
        assert!(result.success);
    }
}

#[tokio::test]
async fn test_submit_after_stop_is_rejected() {
    let registry = HandlerRegistry::new().register(
        "echo",
        RecordingHandler::new(Arc::new(Mutex::new(Vec::new())), Duration::ZERO),
    );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());

    dispatcher.stop().await;
    let result = dispatcher.submit(Task::new("echo", json!({}))).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("stopped"));
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new().register(
        "echo",
        RecordingHandler::new(Arc::clone(&starts), Duration::ZERO),
    );
    let (dispatcher, _sink) = started(registry, DispatcherConfig::default());
    dispatcher.start();
    dispatcher.start();

    let ticket = dispatcher.submit(Task::new("echo", json!({}))).await.unwrap();
    assert!(ticket.wait().await.unwrap().success);
    assert_eq!(starts.lock().unwrap().len(), 1);
    dispatcher.stop().await;
}

#[tokio::test]
async fn test_results_reach_the_event_sink() {
    let registry = HandlerRegistry::new().register(
        "echo",
        RecordingHandler::new(Arc::new(Mutex::new(Vec::new())), Duration::ZERO),
    );
    let (dispatcher, sink) = started(registry, DispatcherConfig::default());
    let mut events = sink.subscribe();

    let ok = dispatcher.submit(Task::new("echo", json!({}))).await.unwrap();
    let ok_id = ok.task_id().to_string();
    ok.wait().await.unwrap();

    match events.recv().await.unwrap() {
        AssistantEvent::TaskCompleted { task_id, category, .. } => {
            assert_eq!(task_id, ok_id);
            assert_eq!(category, "echo");
        }
        other => panic!("expected TaskCompleted, got {:?}", other),
    }

    let bad = dispatcher
        .submit(Task::new("missing", json!({})))
        .await
        .unwrap();
    let bad_id = bad.task_id().to_string();
    bad.wait().await.unwrap();

    match events.recv().await.unwrap() {
        AssistantEvent::TaskFailed { task_id, error, .. } => {
            assert_eq!(task_id, bad_id);
            assert!(error.contains("missing"));
        }
        other => panic!("expected TaskFailed, got {:?}", other),
    }

    dispatcher.stop().await;
}

/// Handler that tracks how many executions overlap
struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl AgentHandler for ConcurrencyProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn execute(&self, _task: &Task) -> Result<Value> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({}))
    }
}

#[tokio::test]
async fn test_worker_pool_executes_concurrently() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry = HandlerRegistry::new().register(
        "probe",
        ConcurrencyProbe {
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
        },
    );
    let (dispatcher, _sink) = started(
        registry,
        DispatcherConfig {
            workers: 2,
            queue_capacity: 16,
        },
    );

    let mut tickets = Vec::new();
    for _ in 0..4 {
        tickets.push(dispatcher.submit(Task::new("probe", json!({}))).await.unwrap());
    }
    for ticket in tickets {
        assert!(ticket.wait().await.unwrap().success);
    }

    assert!(peak.load(Ordering::SeqCst) >= 2, "workers never overlapped");
    dispatcher.stop().await;
}
