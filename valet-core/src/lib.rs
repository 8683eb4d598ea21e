// ABOUTME: Task dispatch engine and generic background polling for valet.
// ABOUTME: Queue-backed dispatcher, handler registry, feed poller, event fan-out.

pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod metrics;
pub mod poller;
pub mod registry;
pub mod task;

pub use dispatcher::{Dispatcher, DispatcherConfig, TaskTicket};
pub use events::{AssistantEvent, EventSink};
pub use handler::AgentHandler;
pub use poller::{BackgroundPoller, Checkpoint, Deliver, FeedSource, FetchBatch, PollerConfig};
pub use registry::HandlerRegistry;
pub use task::{Task, TaskError, TaskErrorCode, TaskResult, TaskStatus};
