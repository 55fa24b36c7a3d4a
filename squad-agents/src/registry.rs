//! Agent registry
//!
//! Registration, status, heartbeat and hierarchy queries over the `agents`
//! collection. The parent invariant (specialists have a director parent,
//! directors have none) is checked here before anything is written.

use chrono::Utc;
use squad_core::{
    short_id, Agent, AgentError, AgentId, AgentRole, AgentSandboxStatus, AgentStatus,
    SandboxId, Specialization, SquadResult, TaskId,
};
use squad_events::{EventBus, SquadEvent};
use squad_storage::{Collection, Filter, FindOptions, SortKey, Update};
use tracing::{debug, info};

/// Registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub role: AgentRole,
    pub specialization: Option<Specialization>,
    pub parent_id: Option<AgentId>,
}

impl AgentConfig {
    pub fn director() -> Self {
        Self {
            role: AgentRole::Director,
            specialization: None,
            parent_id: None,
        }
    }

    pub fn specialist(parent_id: AgentId, specialization: Specialization) -> Self {
        Self {
            role: AgentRole::Specialist,
            specialization: Some(specialization),
            parent_id: Some(parent_id),
        }
    }
}

/// A registered agent together with its rehydrated resume context.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentContext {
    pub agent: Agent,
    pub resume_context: Option<String>,
}

impl AgentContext {
    pub fn agent_id(&self) -> AgentId {
        self.agent.agent_id
    }
}

/// Handle onto the `agents` collection.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Collection<Agent>,
    events: EventBus,
}

impl AgentRegistry {
    pub fn new(agents: Collection<Agent>, events: EventBus) -> Self {
        Self { agents, events }
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Insert an idle agent with no sandbox.
    pub async fn register_agent(&self, config: AgentConfig) -> SquadResult<Agent> {
        if config.role == AgentRole::Specialist {
            let parent_id = config.parent_id.ok_or(AgentError::MissingParent)?;
            match self.get_agent(parent_id).await? {
                Some(parent) if parent.is_director() => {}
                _ => return Err(AgentError::InvalidParent { parent_id }.into()),
            }
        }

        let agent = Agent::new(config.role, config.specialization, config.parent_id);
        agent.validate()?;
        self.agents.insert(&agent).await?;

        info!(
            agent_id = %short_id(&agent.agent_id),
            role = %agent.role,
            specialization = ?agent.specialization,
            "Agent registered"
        );
        self.events.publish(SquadEvent::AgentCreated {
            agent_id: agent.agent_id,
            agent_type: agent.role,
            specialization: agent.specialization,
            parent_id: agent.parent_id,
            sandbox_id: agent.sandbox_id.clone(),
            timestamp: agent.created_at,
        });
        Ok(agent)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn get_agent(&self, agent_id: AgentId) -> SquadResult<Option<Agent>> {
        self.agents.get(agent_id).await
    }

    pub async fn require_agent(&self, agent_id: AgentId) -> SquadResult<Agent> {
        self.get_agent(agent_id)
            .await?
            .ok_or_else(|| AgentError::AgentNotFound { agent_id }.into())
    }

    /// Every agent, oldest first.
    pub async fn list_agents(&self) -> SquadResult<Vec<Agent>> {
        self.agents
            .find_many(&Filter::new(), &FindOptions::new().sort(SortKey::asc("created_at")))
            .await
    }

    /// Specialists spawned by `director_id`, oldest first.
    pub async fn get_specialists(&self, director_id: AgentId) -> SquadResult<Vec<Agent>> {
        self.agents
            .find_many(
                &Filter::new()
                    .eq("parent_id", director_id)
                    .eq("role", AgentRole::Specialist),
                &FindOptions::new().sort(SortKey::asc("created_at")),
            )
            .await
    }

    /// Live agents sharing a parent with `agent_id`. A parentless agent's
    /// peers are the live agents working the same task.
    pub async fn get_peer_agents(&self, agent_id: AgentId) -> SquadResult<Vec<Agent>> {
        let agent = self.require_agent(agent_id).await?;
        let filter = match (agent.parent_id, agent.task_id) {
            (Some(parent_id), _) => Filter::new().eq("parent_id", parent_id),
            (None, Some(task_id)) => Filter::new().eq("task_id", task_id),
            (None, None) => return Ok(Vec::new()),
        };
        let peers = self
            .agents
            .find_many(
                &filter
                    .ne("agent_id", agent_id)
                    .is_in("status", [AgentStatus::Idle, AgentStatus::Working, AgentStatus::Waiting]),
                &FindOptions::new().sort(SortKey::asc("created_at")),
            )
            .await?;
        Ok(peers)
    }

    // ========================================================================
    // UPDATES
    // ========================================================================

    /// Set status and current task (cleared when `None`), refresh the
    /// heartbeat and announce the change.
    pub async fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: AgentStatus,
        task_id: Option<TaskId>,
    ) -> SquadResult<Agent> {
        let update = Update::new()
            .set("status", status)
            .set("task_id", task_id)
            .set("last_heartbeat", Utc::now());
        let agent = self.apply(agent_id, &update).await?;

        info!(agent_id = %short_id(&agent_id), status = %status, "Agent status changed");
        self.events.publish(SquadEvent::agent_status(
            agent_id,
            agent.status,
            agent.sandbox_status,
        ));
        Ok(agent)
    }

    pub async fn heartbeat(&self, agent_id: AgentId) -> SquadResult<()> {
        self.apply(agent_id, &Update::new().set("last_heartbeat", Utc::now()))
            .await?;
        debug!(agent_id = %short_id(&agent_id), "Heartbeat");
        Ok(())
    }

    /// Record the agent's sandbox binding.
    pub async fn attach_sandbox(
        &self,
        agent_id: AgentId,
        sandbox_id: Option<SandboxId>,
        sandbox_status: AgentSandboxStatus,
    ) -> SquadResult<Agent> {
        let update = Update::new()
            .set("sandbox_id", &sandbox_id)
            .set("sandbox_status", sandbox_status)
            .set("last_heartbeat", Utc::now());
        let agent = self.apply(agent_id, &update).await?;
        self.events.publish(SquadEvent::agent_status(
            agent_id,
            agent.status,
            agent.sandbox_status,
        ));
        Ok(agent)
    }

    /// Retire an agent.
    pub async fn shutdown_agent(&self, agent_id: AgentId) -> SquadResult<Agent> {
        let agent = self
            .update_agent_status(agent_id, AgentStatus::Completed, None)
            .await?;
        info!(agent_id = %short_id(&agent_id), "Agent shut down");
        Ok(agent)
    }

    /// Write `update` and return the fresh record.
    pub(crate) async fn apply(&self, agent_id: AgentId, update: &Update) -> SquadResult<Agent> {
        let outcome = self
            .agents
            .update_one(&Collection::<Agent>::key_filter(agent_id), update)
            .await?;
        if outcome.matched == 0 {
            return Err(AgentError::AgentNotFound { agent_id }.into());
        }
        self.require_agent(agent_id).await
    }
}
