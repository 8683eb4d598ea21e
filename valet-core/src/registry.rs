// ABOUTME: Registry mapping task categories to capability handlers.
// ABOUTME: Built once at startup; lookups from the dispatch loop are read-only.

use crate::handler::AgentHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Category -> handler map, immutable once the dispatcher starts.
///
/// Registration consumes the registry (builder style), so there is no way
/// to mutate it behind a running dispatch loop.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a task category
    pub fn register(mut self, category: &str, handler: impl AgentHandler + 'static) -> Self {
        self.handlers.insert(category.to_string(), Arc::new(handler));
        self
    }

    /// Register an already-shared handler for a task category
    pub fn register_arc(mut self, category: &str, handler: Arc<dyn AgentHandler>) -> Self {
        self.handlers.insert(category.to_string(), handler);
        self
    }

    /// Look up the handler for a category
    pub fn lookup(&self, category: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(category).cloned()
    }

    /// List registered categories
    pub fn available(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
