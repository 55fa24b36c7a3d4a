//! Operator kill and restart of agents, and sandbox controls
//!
//! Killing an agent captures an `interrupted` checkpoint first, so a later
//! restart hands the agent a briefing listing the unfinished task.
//! Sandbox controls address one sandbox by id and mirror each transition
//! onto the owning agent's `sandbox_status`.

use crate::registry::AgentContext;
use crate::squad::Squad;
use chrono::Utc;
use squad_core::{
    short_id, Agent, AgentId, AgentSandboxStatus, AgentStatus, CheckpointId, CheckpointSummary,
    ResumePointer, SandboxError, SandboxState, SquadResult, TaskStatus,
};
use squad_events::SquadEvent;
use squad_sandbox::{SandboxConfig, SandboxManager};
use std::sync::Arc;
use squad_storage::Update;
use tracing::{debug, info};

impl Squad {
    /// Give `agent` a sandbox when provisioning is enabled. Returns the
    /// agent as stored afterwards.
    pub(crate) async fn provision_sandbox(&self, agent: Agent) -> SquadResult<Agent> {
        let Some(sandboxes) = self.sandboxes() else {
            return Ok(agent);
        };
        if !self.config().provision_sandboxes {
            return Ok(agent);
        }
        let mut config = SandboxConfig::new(agent.agent_id, agent.role);
        if let Some(specialization) = agent.specialization {
            config = config.with_specialization(specialization);
        }
        let instance = sandboxes.create(config).await?;
        self.registry()
            .attach_sandbox(
                agent.agent_id,
                Some(instance.sandbox_id),
                AgentSandboxStatus::Active,
            )
            .await
    }

    /// Checkpoint, kill the sandbox and retire the agent. Returns the
    /// interruption checkpoint id.
    pub async fn kill_agent(&self, agent_id: AgentId) -> SquadResult<CheckpointId> {
        let agent = self.registry().require_agent(agent_id).await?;
        let task = match agent.task_id {
            Some(task_id) => self.tasks().get_task(task_id).await?,
            None => None,
        };

        let unfinished = task.as_ref().filter(|t| !t.status.is_terminal());
        let summary = match (&task, unfinished) {
            (_, Some(t)) => CheckpointSummary::new(&t.title).with_pending([t.title.clone()]),
            (Some(t), None) => CheckpointSummary::new(&t.title).with_completed([t.title.clone()]),
            (None, None) => CheckpointSummary::new("Awaiting work"),
        };
        let next_action = match unfinished {
            Some(t) => format!("Resume task: {}", t.title),
            None => "Await next assignment".to_string(),
        };
        let checkpoint = self
            .checkpoints()
            .create_checkpoint(
                agent_id,
                summary,
                ResumePointer::new(next_action, "interrupted")
                    .with_context(format!("Killed while {}", agent.status)),
                0,
            )
            .await?;

        if let Some(sandboxes) = self.sandboxes() {
            if sandboxes.is_running(agent_id) {
                sandboxes.kill(agent_id).await?;
            }
        }

        self.registry()
            .apply(
                agent_id,
                &Update::new()
                    .set("status", AgentStatus::Completed)
                    .set("sandbox_status", AgentSandboxStatus::Killed)
                    .set("last_heartbeat", Utc::now()),
            )
            .await?;

        info!(
            agent_id = %short_id(&agent_id),
            checkpoint_id = %short_id(&checkpoint.checkpoint_id),
            "Agent killed"
        );
        self.events().publish(SquadEvent::AgentKilled {
            agent_id,
            checkpoint_id: Some(checkpoint.checkpoint_id),
            timestamp: Utc::now(),
        });
        Ok(checkpoint.checkpoint_id)
    }

    /// Bring an agent back to `idle`, re-queue its interrupted task and
    /// hand back its resume context.
    pub async fn restart_agent(&self, agent_id: AgentId) -> SquadResult<AgentContext> {
        let agent = self.registry().require_agent(agent_id).await?;

        if let Some(task_id) = agent.task_id {
            if let Some(task) = self.tasks().get_task(task_id).await? {
                if task.status == TaskStatus::InProgress {
                    self.tasks()
                        .update_task_status(task_id, TaskStatus::Assigned, None)
                        .await?;
                    info!(task_id = %short_id(&task_id), "Re-queued interrupted task");
                }
            }
        }

        let mut agent = self
            .registry()
            .update_agent_status(agent_id, AgentStatus::Idle, agent.task_id)
            .await?;

        if let Some(sandboxes) = self.sandboxes() {
            match sandboxes.get(agent_id).map(|i| i.status) {
                Some(SandboxState::Paused) => {
                    sandboxes.resume(agent_id).await?;
                    agent = self
                        .registry()
                        .attach_sandbox(agent_id, agent.sandbox_id.clone(), AgentSandboxStatus::Active)
                        .await?;
                }
                Some(_) => {}
                None => agent = self.provision_sandbox(agent).await?,
            }
        }

        let resume_context = self.checkpoints().get_resume_context(agent_id).await?;
        info!(agent_id = %short_id(&agent_id), "Agent restarted");
        Ok(AgentContext {
            agent,
            resume_context,
        })
    }

    // ========================================================================
    // SANDBOX CONTROLS
    // ========================================================================

    /// Manager and owning agent of the live sandbox `sandbox_id`.
    fn live_sandbox(&self, sandbox_id: &str) -> SquadResult<(&Arc<SandboxManager>, AgentId)> {
        self.sandboxes()
            .and_then(|sandboxes| {
                sandboxes
                    .find_by_sandbox_id(sandbox_id)
                    .map(|instance| (sandboxes, instance.agent_id))
            })
            .ok_or_else(|| {
                SandboxError::UnknownSandbox {
                    sandbox_id: sandbox_id.to_string(),
                }
                .into()
            })
    }

    /// Record a sandbox transition on its agent. Skipped when the agent is
    /// unregistered or already bound to a different sandbox.
    async fn sync_agent_sandbox(
        &self,
        agent_id: AgentId,
        sandbox_id: &str,
        status: AgentSandboxStatus,
    ) -> SquadResult<()> {
        let Some(agent) = self.registry().get_agent(agent_id).await? else {
            return Ok(());
        };
        if agent.sandbox_id.as_deref() != Some(sandbox_id) {
            return Ok(());
        }
        self.registry()
            .attach_sandbox(agent_id, agent.sandbox_id, status)
            .await?;
        Ok(())
    }

    /// Hibernate the sandbox `sandbox_id`. Returns its agent.
    pub async fn pause_sandbox(&self, sandbox_id: &str) -> SquadResult<AgentId> {
        let (sandboxes, agent_id) = self.live_sandbox(sandbox_id)?;
        sandboxes.pause(agent_id).await?;
        self.sync_agent_sandbox(agent_id, sandbox_id, AgentSandboxStatus::Paused)
            .await?;
        Ok(agent_id)
    }

    /// Reconnect the hibernated sandbox `sandbox_id`. Returns its agent.
    pub async fn resume_sandbox(&self, sandbox_id: &str) -> SquadResult<AgentId> {
        let (sandboxes, agent_id) = self.live_sandbox(sandbox_id)?;
        sandboxes.resume(agent_id).await?;
        self.sync_agent_sandbox(agent_id, sandbox_id, AgentSandboxStatus::Active)
            .await?;
        Ok(agent_id)
    }

    /// Destroy the sandbox `sandbox_id`. An id with no live sandbox is a
    /// no-op and yields `None`.
    pub async fn kill_sandbox(&self, sandbox_id: &str) -> SquadResult<Option<AgentId>> {
        let Ok((sandboxes, agent_id)) = self.live_sandbox(sandbox_id) else {
            debug!(sandbox_id = %sandbox_id, "Kill for sandbox with no live instance ignored");
            return Ok(None);
        };
        sandboxes.kill(agent_id).await?;
        self.sync_agent_sandbox(agent_id, sandbox_id, AgentSandboxStatus::Killed)
            .await?;
        Ok(Some(agent_id))
    }
}
