//! The squad handle
//!
//! One `Squad` owns the coordination components over a shared store and
//! event bus. Director and specialist behaviour live in `impl Squad`
//! blocks in their own modules.

use crate::checkpoints::CheckpointStore;
use crate::messages::MessageBus;
use crate::registry::{AgentConfig, AgentContext, AgentRegistry};
use crate::tasks::TaskBoard;
use squad_core::{short_id, CoordinationConfig, SquadResult};
use squad_events::EventBus;
use squad_llm::CompletionRunner;
use squad_sandbox::SandboxManager;
use squad_storage::{Collections, DocumentStore};
use std::fmt;
use std::sync::Arc;
use tracing::info;

struct SquadInner {
    collections: Collections,
    events: EventBus,
    config: CoordinationConfig,
    messages: MessageBus,
    checkpoints: CheckpointStore,
    tasks: TaskBoard,
    registry: AgentRegistry,
    sandboxes: Option<Arc<SandboxManager>>,
    runner: Arc<dyn CompletionRunner>,
}

/// Cheaply cloneable handle onto a squad.
#[derive(Clone)]
pub struct Squad {
    inner: Arc<SquadInner>,
}

impl fmt::Debug for Squad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Squad")
            .field("config", &self.inner.config)
            .field("sandboxes", &self.inner.sandboxes.is_some())
            .finish_non_exhaustive()
    }
}

impl Squad {
    pub fn builder(store: Arc<dyn DocumentStore>, runner: Arc<dyn CompletionRunner>) -> SquadBuilder {
        SquadBuilder {
            store,
            runner,
            events: None,
            sandboxes: None,
            config: CoordinationConfig::default(),
        }
    }

    pub fn collections(&self) -> &Collections {
        &self.inner.collections
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.inner.config
    }

    pub fn messages(&self) -> &MessageBus {
        &self.inner.messages
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.inner.checkpoints
    }

    pub fn tasks(&self) -> &TaskBoard {
        &self.inner.tasks
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    pub fn sandboxes(&self) -> Option<&Arc<SandboxManager>> {
        self.inner.sandboxes.as_ref()
    }

    pub fn runner(&self) -> &Arc<dyn CompletionRunner> {
        &self.inner.runner
    }

    /// Register an agent and rehydrate its resume context.
    pub async fn initialize_agent(&self, config: AgentConfig) -> SquadResult<AgentContext> {
        let agent = self.registry().register_agent(config).await?;
        let resume_context = self
            .checkpoints()
            .get_resume_context(agent.agent_id)
            .await?;
        if resume_context.is_some() {
            info!(agent_id = %short_id(&agent.agent_id), "Resuming from checkpoint");
        }
        Ok(AgentContext {
            agent,
            resume_context,
        })
    }
}

/// Builder for [`Squad`].
pub struct SquadBuilder {
    store: Arc<dyn DocumentStore>,
    runner: Arc<dyn CompletionRunner>,
    events: Option<EventBus>,
    sandboxes: Option<Arc<SandboxManager>>,
    config: CoordinationConfig,
}

impl SquadBuilder {
    /// Share an existing bus, e.g. the one a sandbox manager publishes to.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_sandboxes(mut self, sandboxes: Arc<SandboxManager>) -> Self {
        self.sandboxes = Some(sandboxes);
        self
    }

    pub fn with_config(mut self, config: CoordinationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SquadResult<Squad> {
        self.config.validate()?;
        let events = self.events.unwrap_or_default();
        let collections = Collections::new(self.store);
        let inner = SquadInner {
            messages: MessageBus::new(
                collections.messages.clone(),
                events.clone(),
                self.config.clone(),
            ),
            checkpoints: CheckpointStore::new(collections.checkpoints.clone(), events.clone()),
            tasks: TaskBoard::new(collections.tasks.clone(), events.clone()),
            registry: AgentRegistry::new(collections.agents.clone(), events.clone()),
            collections,
            events,
            config: self.config,
            sandboxes: self.sandboxes,
            runner: self.runner,
        };
        Ok(Squad {
            inner: Arc::new(inner),
        })
    }
}
