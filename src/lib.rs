// ABOUTME: Personal-assistant backend built on the valet-core dispatch engine.
// ABOUTME: Config, model/memory interfaces, capability agents, feed adapters, runtime wiring.

pub mod agents;
pub mod config;
pub mod feeds;
pub mod llm;
pub mod memory;
pub mod runtime;

pub use config::Config;
pub use runtime::{Assistant, AssistantBuilder};

// Re-export engine types for convenient access
pub use valet_core::{
    AssistantEvent, Checkpoint, Dispatcher, EventSink, HandlerRegistry, Task, TaskResult,
    TaskStatus, TaskTicket,
};
