//! Request and response shapes for the boundary operations.
//!
//! All shapes serialize with camelCase keys and ISO-8601 timestamps.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use squad_core::{
    Agent, AgentId, AgentRole, AgentSandboxStatus, AgentStatus, CheckpointId, Message,
    MessageId, MessagePriority, MessageType, SandboxCosts, SandboxId, SandboxLifecycle,
    SandboxResources, SandboxTracking, Specialization, Task, TaskId, TaskStatus, Timestamp,
    TrackingStatus,
};

/// Render a timestamp as ISO-8601 with millisecond precision.
pub fn iso(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// AGENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub agent_id: AgentId,
    #[serde(rename = "type")]
    pub agent_type: AgentRole,
    pub specialization: Option<Specialization>,
    pub status: AgentStatus,
    pub sandbox_id: Option<SandboxId>,
    pub sandbox_status: AgentSandboxStatus,
    pub parent_id: Option<AgentId>,
    pub task_id: Option<TaskId>,
    pub created_at: String,
    pub last_heartbeat: String,
}

impl From<&Agent> for AgentResponse {
    fn from(agent: &Agent) -> Self {
        Self {
            agent_id: agent.agent_id,
            agent_type: agent.role,
            specialization: agent.specialization,
            status: agent.status,
            sandbox_id: agent.sandbox_id.clone(),
            sandbox_status: agent.sandbox_status,
            parent_id: agent.parent_id,
            task_id: agent.task_id,
            created_at: iso(&agent.created_at),
            last_heartbeat: iso(&agent.last_heartbeat),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentResponse>,
}

/// Spawn request. Without a type a director is spawned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnAgentRequest {
    #[serde(rename = "type", default)]
    pub agent_type: Option<AgentRole>,
    #[serde(default)]
    pub specialization: Option<Specialization>,
    #[serde(default)]
    pub parent_id: Option<AgentId>,
}

impl SpawnAgentRequest {
    pub fn director() -> Self {
        Self {
            agent_type: Some(AgentRole::Director),
            ..Default::default()
        }
    }

    pub fn specialist(parent_id: AgentId, specialization: Specialization) -> Self {
        Self {
            agent_type: Some(AgentRole::Specialist),
            specialization: Some(specialization),
            parent_id: Some(parent_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub task: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub agent_id: AgentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillAgentResponse {
    pub agent_id: AgentId,
    /// Always `killed`
    pub status: String,
    pub checkpoint_id: Option<CheckpointId>,
}

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: TaskId,
    pub parent_task_id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assigned_to: Option<AgentId>,
    pub result: Option<String>,
    pub created_at: String,
    /// Set once the task has completed
    pub completed_at: Option<String>,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            parent_task_id: task.parent_task_id,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            assigned_to: task.assigned_to,
            result: task.result.clone(),
            created_at: iso(&task.created_at),
            completed_at: (task.status == TaskStatus::Completed).then(|| iso(&task.updated_at)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
}

// ============================================================================
// MESSAGES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message_id: MessageId,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub thread_id: Option<TaskId>,
    pub created_at: String,
    pub read: bool,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.message_id,
            from_agent: message.from_agent,
            to_agent: message.to_agent,
            content: message.content.clone(),
            message_type: message.message_type,
            priority: message.priority,
            thread_id: message.thread_id,
            created_at: iso(&message.created_at),
            read: message.read_at.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageResponse>,
}

// ============================================================================
// SANDBOXES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleResponse {
    pub created_at: String,
    pub paused_at: Option<String>,
    pub resumed_at: Option<String>,
    pub killed_at: Option<String>,
    pub last_heartbeat: String,
}

impl From<&SandboxLifecycle> for LifecycleResponse {
    fn from(lifecycle: &SandboxLifecycle) -> Self {
        Self {
            created_at: iso(&lifecycle.created_at),
            paused_at: lifecycle.paused_at.as_ref().map(iso),
            resumed_at: lifecycle.resumed_at.as_ref().map(iso),
            killed_at: lifecycle.killed_at.as_ref().map(iso),
            last_heartbeat: iso(&lifecycle.last_heartbeat),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesResponse {
    pub cpu_count: i32,
    #[serde(rename = "memoryMB")]
    pub memory_mb: i32,
    pub timeout_ms: i64,
}

impl From<SandboxResources> for ResourcesResponse {
    fn from(resources: SandboxResources) -> Self {
        Self {
            cpu_count: resources.cpu_count,
            memory_mb: resources.memory_mb,
            timeout_ms: resources.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostsResponse {
    pub estimated_cost: f64,
    pub runtime_seconds: i64,
}

impl From<SandboxCosts> for CostsResponse {
    fn from(costs: SandboxCosts) -> Self {
        Self {
            estimated_cost: costs.estimated_cost,
            runtime_seconds: costs.runtime_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResponse {
    pub sandbox_id: SandboxId,
    pub agent_id: AgentId,
    pub status: TrackingStatus,
    pub lifecycle: LifecycleResponse,
    pub resources: ResourcesResponse,
    pub costs: CostsResponse,
}

impl From<&SandboxTracking> for SandboxResponse {
    fn from(tracking: &SandboxTracking) -> Self {
        Self {
            sandbox_id: tracking.sandbox_id.clone(),
            agent_id: tracking.agent_id,
            status: tracking.status,
            lifecycle: LifecycleResponse::from(&tracking.lifecycle),
            resources: tracking.resources.into(),
            costs: tracking.costs.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxListResponse {
    pub sandboxes: Vec<SandboxResponse>,
}

/// Result of a pause, resume or kill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxActionResponse {
    pub sandbox_id: SandboxId,
    pub status: TrackingStatus,
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_iso_millis() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(iso(&ts), "2025-03-01T12:30:05.000Z");
    }

    #[test]
    fn test_agent_response_shape() {
        let agent = Agent::director();
        let value = serde_json::to_value(AgentResponse::from(&agent)).unwrap();
        assert_eq!(value["type"], "director");
        assert_eq!(value["status"], "idle");
        assert_eq!(value["sandboxStatus"], "none");
        assert!(value["sandboxId"].is_null());
        assert!(value["createdAt"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_completed_at_only_for_completed_tasks() {
        let mut task = Task::new("Write", "words");
        assert!(TaskResponse::from(&task).completed_at.is_none());
        task.status = TaskStatus::Completed;
        task.result = Some("done".to_string());
        assert_eq!(
            TaskResponse::from(&task).completed_at,
            Some(iso(&task.updated_at))
        );
    }

    #[test]
    fn test_spawn_request_defaults() {
        let request: SpawnAgentRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, SpawnAgentRequest::default());

        let request: SpawnAgentRequest = serde_json::from_str(
            r#"{"type":"specialist","specialization":"writer","parentId":"0190a0b0-0000-7000-8000-000000000000"}"#,
        )
        .unwrap();
        assert_eq!(request.agent_type, Some(AgentRole::Specialist));
        assert_eq!(request.specialization, Some(Specialization::Writer));
        assert!(request.parent_id.is_some());
    }

    #[test]
    fn test_resources_use_memory_mb_key() {
        let value = serde_json::to_value(ResourcesResponse::from(SandboxResources::default())).unwrap();
        assert_eq!(value["memoryMB"], 512);
        assert_eq!(value["cpuCount"], 2);
    }
}
