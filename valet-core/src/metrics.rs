// ABOUTME: Metrics recording helpers for the dispatch engine and feed pollers.
// ABOUTME: Thin wrappers over the metrics facade; no exporter is wired here.

/// Record a task submitted to the dispatcher
pub fn record_task_submitted(category: &str) {
    metrics::counter!("valet_tasks_submitted_total", "category" => category.to_string())
        .increment(1);
}

/// Record a task reaching a terminal status
pub fn record_task_finished(category: &str, success: bool) {
    let outcome = if success { "succeeded" } else { "failed" };
    metrics::counter!(
        "valet_tasks_finished_total",
        "category" => category.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record handler execution time in seconds
pub fn record_task_duration(category: &str, seconds: f64) {
    metrics::histogram!("valet_task_duration_seconds", "category" => category.to_string())
        .record(seconds);
}

/// Record items delivered by one successful poll cycle
pub fn record_feed_items(feed: &str, count: usize) {
    metrics::counter!("valet_feed_items_total", "feed" => feed.to_string())
        .increment(count as u64);
}

/// Record a failed poll cycle (fetch or delivery error)
pub fn record_feed_error(feed: &str) {
    metrics::counter!("valet_feed_errors_total", "feed" => feed.to_string()).increment(1);
}

/// Record an event published to the sink
pub fn record_event_published(event_type: &'static str) {
    metrics::counter!("valet_events_published_total", "event_type" => event_type).increment(1);
}
