// ABOUTME: Assistant runtime: wires registry, dispatcher, event sink, and feed pollers.
// ABOUTME: Collaborators are injected through the builder; shutdown drains everything.

use crate::agents::{document, mailbox, social, DocumentAgent, MailboxAgent, SocialAgent};
use crate::config::Config;
use crate::feeds::{MailboxClient, MailboxFeed, ShareStore, ShareWatcher, SinkDeliver, SocialClient, SocialFeed};
use crate::llm::{LanguageModel, OllamaEngine};
use crate::memory::{InMemoryStore, MemoryStore};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use valet_core::{
    AssistantEvent, BackgroundPoller, Dispatcher, EventSink, HandlerRegistry, Task, TaskResult,
    TaskTicket,
};

/// Builder for a running assistant.
///
/// The model, memory store, and integration clients can all be injected;
/// anything not provided falls back to the config-driven default (Ollama
/// engine, in-process memory) or is left unwired (mailbox/social, whose
/// protocol clients live outside this crate).
pub struct AssistantBuilder {
    config: Config,
    model: Option<Arc<dyn LanguageModel>>,
    memory: Option<Arc<dyn MemoryStore>>,
    mailbox_client: Option<Arc<dyn MailboxClient>>,
    social_client: Option<Arc<dyn SocialClient>>,
}

impl AssistantBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            model: None,
            memory: None,
            mailbox_client: None,
            social_client: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_mailbox_client(mut self, client: Arc<dyn MailboxClient>) -> Self {
        self.mailbox_client = Some(client);
        self
    }

    pub fn with_social_client(mut self, client: Arc<dyn SocialClient>) -> Self {
        self.social_client = Some(client);
        self
    }

    /// Wire everything up and start the dispatcher and feed pollers
    pub fn start(self) -> Result<Assistant> {
        let model = self
            .model
            .unwrap_or_else(|| Arc::new(OllamaEngine::new(&self.config.llm)));
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let sink = EventSink::new(256);

        let mut registry = HandlerRegistry::new();
        if let Some(share) = &self.config.share {
            let files = Arc::new(ShareStore::new(&share.mount_point));
            registry = registry.register(
                document::CATEGORY,
                DocumentAgent::new(Arc::clone(&model), Arc::clone(&memory), files),
            );
        }
        if let Some(client) = &self.mailbox_client {
            registry = registry.register(
                mailbox::CATEGORY,
                MailboxAgent::new(Arc::clone(&model), Arc::clone(&memory), Arc::clone(client)),
            );
        }
        if let Some(client) = &self.social_client {
            registry = registry.register(
                social::CATEGORY,
                SocialAgent::new(Arc::clone(&model), Arc::clone(&memory), Arc::clone(client)),
            );
        }
        if registry.is_empty() {
            tracing::warn!("no agents registered; every task will fail as unknown category");
        }
        let mut categories = registry.available().join(", ");
        if categories.is_empty() {
            categories = "none".to_string();
        }

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            sink.clone(),
            self.config.dispatcher.to_dispatcher_config(),
        ));
        dispatcher.start();

        let mut pollers = Vec::new();
        if let Some(share) = &self.config.share {
            pollers.push(BackgroundPoller::spawn(
                ShareWatcher::new(&share.mount_point),
                SinkDeliver::new("share", sink.clone()),
                share.poller_config()?,
            ));
        }
        if let Some(client) = &self.mailbox_client {
            let poller_config = match &self.config.mailbox {
                Some(section) => section.poller_config()?,
                None => Default::default(),
            };
            pollers.push(BackgroundPoller::spawn(
                MailboxFeed::new(Arc::clone(client)),
                SinkDeliver::new("mailbox", sink.clone()),
                poller_config,
            ));
        }
        if let Some(client) = &self.social_client {
            let poller_config = match &self.config.social {
                Some(section) => section.poller_config()?,
                None => Default::default(),
            };
            pollers.push(BackgroundPoller::spawn(
                SocialFeed::new(Arc::clone(client)),
                SinkDeliver::new("social", sink.clone()),
                poller_config,
            ));
        }

        tracing::info!(
            agents = %categories,
            feeds = pollers.len(),
            "assistant started"
        );

        Ok(Assistant {
            dispatcher,
            sink,
            pollers,
        })
    }
}

/// A running assistant: dispatcher plus the feed pollers.
pub struct Assistant {
    dispatcher: Arc<Dispatcher>,
    sink: EventSink,
    pollers: Vec<BackgroundPoller>,
}

impl Assistant {
    pub fn builder(config: Config) -> AssistantBuilder {
        AssistantBuilder::new(config)
    }

    /// Subscribe to task and feed events
    pub fn events(&self) -> broadcast::Receiver<AssistantEvent> {
        self.sink.subscribe()
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Submit a task and get its completion ticket
    pub async fn submit(&self, category: &str, parameters: Value) -> Result<TaskTicket> {
        self.dispatcher.submit(Task::new(category, parameters)).await
    }

    /// Submit a task and wait for its result
    pub async fn run_task(&self, category: &str, parameters: Value) -> Result<TaskResult> {
        self.submit(category, parameters).await?.wait().await
    }

    /// Stop the feed pollers, then drain and stop the dispatcher
    pub async fn shutdown(self) {
        for poller in self.pollers {
            poller.stop().await;
        }
        self.dispatcher.stop().await;
        tracing::info!("assistant stopped");
    }
}
