//! Boundary operations over a [`Squad`]
//!
//! Transport-free: each method is one request/response operation returning
//! a response shape or an [`ApiError`]. The push events for each mutation
//! are published by the core operation it delegates to.

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::types::{
    iso, AgentListResponse, AgentResponse, HealthResponse, KillAgentResponse,
    MessageListResponse, MessageResponse, SandboxActionResponse, SandboxListResponse,
    SandboxResponse, SpawnAgentRequest, SubmitTaskRequest, SubmitTaskResponse,
    TaskListResponse, TaskResponse,
};
use chrono::Utc;
use squad_agents::Squad;
use squad_core::{short_id, Agent, AgentId, AgentRole, SandboxTracking, TaskId, TrackingStatus};
use squad_sandbox::SandboxManager;
use squad_storage::{Filter, FindOptions, SortKey};
use std::sync::Arc;
use tracing::info;

/// Default page size for message listings.
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Maximum characters of a submitted task used as its title.
const TITLE_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct SquadService {
    squad: Squad,
}

impl SquadService {
    pub fn new(squad: Squad) -> Self {
        Self { squad }
    }

    pub fn squad(&self) -> &Squad {
        &self.squad
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            timestamp: iso(&Utc::now()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    // ========================================================================
    // AGENTS
    // ========================================================================

    pub async fn list_agents(&self) -> ApiResult<AgentListResponse> {
        let agents = self.squad.registry().list_agents().await?;
        Ok(AgentListResponse {
            agents: agents.iter().map(AgentResponse::from).collect(),
        })
    }

    /// Spawn a director, or a specialist under `parent_id`.
    pub async fn spawn_agent(&self, request: SpawnAgentRequest) -> ApiResult<AgentResponse> {
        let ctx = match request.agent_type.unwrap_or(AgentRole::Director) {
            AgentRole::Director => self.squad.create_director().await,
            AgentRole::Specialist => {
                let parent_id = request.parent_id.ok_or_else(|| {
                    ApiError::validation_failed("parentId is required for a specialist")
                })?;
                self.squad
                    .spawn_specialist(parent_id, request.specialization.unwrap_or_default())
                    .await
            }
        }
        .map_err(|e| ApiError::from_squad(ErrorCode::SpawnFailed, e))?;
        Ok(AgentResponse::from(&ctx.agent))
    }

    pub async fn get_agent_status(&self, agent_id: AgentId) -> ApiResult<AgentResponse> {
        let agent = self.require_agent(agent_id).await?;
        Ok(AgentResponse::from(&agent))
    }

    /// Create a task from free text and assign it to the agent.
    pub async fn submit_task(
        &self,
        agent_id: AgentId,
        request: SubmitTaskRequest,
    ) -> ApiResult<SubmitTaskResponse> {
        self.require_agent(agent_id).await?;

        let title: String = request.task.chars().take(TITLE_CHARS).collect();
        let tasks = self.squad.tasks();
        let task = tasks
            .create_task(&title, &request.task, None)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::TaskFailed, e))?;
        let task = tasks
            .assign_task(task.task_id, agent_id)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::TaskFailed, e))?;

        info!(
            task_id = %short_id(&task.task_id),
            agent_id = %short_id(&agent_id),
            "Task submitted"
        );
        Ok(SubmitTaskResponse {
            task_id: task.task_id,
            status: task.status,
            agent_id,
        })
    }

    /// Checkpoint and retire the agent, killing its sandbox.
    pub async fn kill_agent(&self, agent_id: AgentId) -> ApiResult<KillAgentResponse> {
        self.require_agent(agent_id).await?;
        let checkpoint_id = self
            .squad
            .kill_agent(agent_id)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::KillFailed, e))?;
        Ok(KillAgentResponse {
            agent_id,
            status: "killed".to_string(),
            checkpoint_id: Some(checkpoint_id),
        })
    }

    pub async fn restart_agent(&self, agent_id: AgentId) -> ApiResult<AgentResponse> {
        self.require_agent(agent_id).await?;
        let ctx = self
            .squad
            .restart_agent(agent_id)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::RestartFailed, e))?;
        Ok(AgentResponse::from(&ctx.agent))
    }

    async fn require_agent(&self, agent_id: AgentId) -> ApiResult<Agent> {
        self.squad
            .registry()
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Agent", agent_id))
    }

    // ========================================================================
    // TASKS AND MESSAGES
    // ========================================================================

    /// All tasks, newest first.
    pub async fn list_tasks(&self) -> ApiResult<TaskListResponse> {
        let tasks = self.squad.tasks().list_tasks().await?;
        Ok(TaskListResponse {
            tasks: tasks.iter().map(TaskResponse::from).collect(),
        })
    }

    pub async fn get_task(&self, task_id: TaskId) -> ApiResult<TaskResponse> {
        let task = self
            .squad
            .tasks()
            .get_task(task_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Task", task_id))?;
        Ok(TaskResponse::from(&task))
    }

    /// Most recent messages across all agents, newest first.
    pub async fn list_messages(&self, limit: Option<usize>) -> ApiResult<MessageListResponse> {
        let messages = self
            .squad
            .messages()
            .list_messages(limit.unwrap_or(DEFAULT_MESSAGE_LIMIT))
            .await?;
        Ok(MessageListResponse {
            messages: messages.iter().map(MessageResponse::from).collect(),
        })
    }

    // ========================================================================
    // SANDBOXES
    // ========================================================================

    /// Every tracked sandbox, including tombstones, newest first.
    pub async fn list_sandboxes(&self) -> ApiResult<SandboxListResponse> {
        let records = self
            .squad
            .collections()
            .sandbox_tracking
            .find_many(
                &Filter::new(),
                &FindOptions::new().sort(SortKey::desc("lifecycle.created_at")),
            )
            .await?;
        Ok(SandboxListResponse {
            sandboxes: records.iter().map(SandboxResponse::from).collect(),
        })
    }

    pub async fn get_sandbox(&self, sandbox_id: &str) -> ApiResult<SandboxResponse> {
        let record = self.require_sandbox(sandbox_id).await?;
        Ok(SandboxResponse::from(&record))
    }

    /// Hibernate a live sandbox. Tombstoned ids are not found.
    pub async fn pause_sandbox(&self, sandbox_id: &str) -> ApiResult<SandboxActionResponse> {
        let record = self.require_sandbox(sandbox_id).await?;
        self.manager()?;
        self.squad
            .pause_sandbox(&record.sandbox_id)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::PauseFailed, e))?;
        Ok(SandboxActionResponse {
            sandbox_id: record.sandbox_id,
            status: TrackingStatus::Paused,
        })
    }

    pub async fn resume_sandbox(&self, sandbox_id: &str) -> ApiResult<SandboxActionResponse> {
        let record = self.require_sandbox(sandbox_id).await?;
        self.manager()?;
        self.squad
            .resume_sandbox(&record.sandbox_id)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::ResumeFailed, e))?;
        Ok(SandboxActionResponse {
            sandbox_id: record.sandbox_id,
            status: TrackingStatus::Active,
        })
    }

    /// Kill a sandbox. Killing a tombstone is a no-op.
    pub async fn kill_sandbox(&self, sandbox_id: &str) -> ApiResult<SandboxActionResponse> {
        let record = self.require_sandbox(sandbox_id).await?;
        self.manager()?;
        self.squad
            .kill_sandbox(&record.sandbox_id)
            .await
            .map_err(|e| ApiError::from_squad(ErrorCode::KillFailed, e))?;
        Ok(SandboxActionResponse {
            sandbox_id: record.sandbox_id,
            status: TrackingStatus::Killed,
        })
    }

    async fn require_sandbox(&self, sandbox_id: &str) -> ApiResult<SandboxTracking> {
        self.squad
            .collections()
            .sandbox_tracking
            .get(sandbox_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sandbox", sandbox_id))
    }

    fn manager(&self) -> ApiResult<&Arc<SandboxManager>> {
        self.squad
            .sandboxes()
            .ok_or_else(|| ApiError::internal_error("No sandbox provider configured"))
    }
}
