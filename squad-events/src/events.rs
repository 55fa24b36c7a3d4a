//! Event types
//!
//! Serialized as `{"type": "<name>", "data": {...}}` with camelCase payload
//! fields. Every payload carries the relevant entity ids and an ISO-8601
//! timestamp.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use squad_core::{
    AgentId, AgentRole, AgentSandboxStatus, AgentStatus, CheckpointId, MessageId, MessageType,
    OutputStream, SandboxId, Specialization, TaskId, TaskStatus, Timestamp,
};

/// Maximum characters of message content carried in a `message:new` preview.
const PREVIEW_CHARS: usize = 100;

/// Lifecycle transition reported by `sandbox:event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxEventKind {
    Created,
    Paused,
    Resumed,
    Killed,
}

/// Push notifications emitted by the squad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum SquadEvent {
    // ========================================================================
    // AGENT EVENTS
    // ========================================================================
    /// An agent was registered.
    #[serde(rename = "agent:created")]
    AgentCreated {
        agent_id: AgentId,
        agent_type: AgentRole,
        specialization: Option<Specialization>,
        parent_id: Option<AgentId>,
        sandbox_id: Option<SandboxId>,
        timestamp: Timestamp,
    },

    /// An agent's status or sandbox status changed.
    #[serde(rename = "agent:status")]
    AgentStatus {
        agent_id: AgentId,
        status: AgentStatus,
        sandbox_status: AgentSandboxStatus,
        timestamp: Timestamp,
    },

    /// A chunk of command output streamed from an agent's sandbox.
    #[serde(rename = "agent:output")]
    AgentOutput {
        agent_id: AgentId,
        stream: OutputStream,
        content: String,
        timestamp: Timestamp,
    },

    /// An agent was killed by an operator.
    #[serde(rename = "agent:killed")]
    AgentKilled {
        agent_id: AgentId,
        checkpoint_id: Option<CheckpointId>,
        timestamp: Timestamp,
    },

    // ========================================================================
    // COORDINATION EVENTS
    // ========================================================================
    #[serde(rename = "message:new")]
    MessageNew {
        message_id: MessageId,
        from_agent: AgentId,
        to_agent: AgentId,
        message_type: MessageType,
        preview: String,
        timestamp: Timestamp,
    },

    #[serde(rename = "checkpoint:new")]
    CheckpointNew {
        checkpoint_id: CheckpointId,
        agent_id: AgentId,
        phase: String,
        timestamp: Timestamp,
    },

    #[serde(rename = "task:created")]
    TaskCreated {
        task_id: TaskId,
        title: String,
        parent_task_id: Option<TaskId>,
        assigned_to: Option<AgentId>,
        timestamp: Timestamp,
    },

    #[serde(rename = "task:status")]
    TaskStatus {
        task_id: TaskId,
        status: TaskStatus,
        assigned_to: Option<AgentId>,
        timestamp: Timestamp,
    },

    // ========================================================================
    // SANDBOX EVENTS
    // ========================================================================
    #[serde(rename = "sandbox:event")]
    SandboxEvent {
        sandbox_id: SandboxId,
        agent_id: AgentId,
        event: SandboxEventKind,
        timestamp: Timestamp,
    },
}

impl SquadEvent {
    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            SquadEvent::AgentCreated { .. } => "agent:created",
            SquadEvent::AgentStatus { .. } => "agent:status",
            SquadEvent::AgentOutput { .. } => "agent:output",
            SquadEvent::AgentKilled { .. } => "agent:killed",
            SquadEvent::MessageNew { .. } => "message:new",
            SquadEvent::CheckpointNew { .. } => "checkpoint:new",
            SquadEvent::TaskCreated { .. } => "task:created",
            SquadEvent::TaskStatus { .. } => "task:status",
            SquadEvent::SandboxEvent { .. } => "sandbox:event",
        }
    }

    /// Timestamp carried by the payload.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SquadEvent::AgentCreated { timestamp, .. }
            | SquadEvent::AgentStatus { timestamp, .. }
            | SquadEvent::AgentOutput { timestamp, .. }
            | SquadEvent::AgentKilled { timestamp, .. }
            | SquadEvent::MessageNew { timestamp, .. }
            | SquadEvent::CheckpointNew { timestamp, .. }
            | SquadEvent::TaskCreated { timestamp, .. }
            | SquadEvent::TaskStatus { timestamp, .. }
            | SquadEvent::SandboxEvent { timestamp, .. } => *timestamp,
        }
    }

    pub fn agent_status(
        agent_id: AgentId,
        status: AgentStatus,
        sandbox_status: AgentSandboxStatus,
    ) -> Self {
        SquadEvent::AgentStatus {
            agent_id,
            status,
            sandbox_status,
            timestamp: Utc::now(),
        }
    }

    pub fn agent_output(agent_id: AgentId, stream: OutputStream, content: impl Into<String>) -> Self {
        SquadEvent::AgentOutput {
            agent_id,
            stream,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn message_new(
        message_id: MessageId,
        from_agent: AgentId,
        to_agent: AgentId,
        message_type: MessageType,
        content: &str,
    ) -> Self {
        SquadEvent::MessageNew {
            message_id,
            from_agent,
            to_agent,
            message_type,
            preview: content.chars().take(PREVIEW_CHARS).collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_status(task_id: TaskId, status: TaskStatus, assigned_to: Option<AgentId>) -> Self {
        SquadEvent::TaskStatus {
            task_id,
            status,
            assigned_to,
            timestamp: Utc::now(),
        }
    }

    pub fn sandbox(sandbox_id: impl Into<SandboxId>, agent_id: AgentId, event: SandboxEventKind) -> Self {
        SquadEvent::SandboxEvent {
            sandbox_id: sandbox_id.into(),
            agent_id,
            event,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use squad_core::new_entity_id;

    #[test]
    fn test_wire_shape() {
        let agent_id = new_entity_id();
        let event = SquadEvent::sandbox("sbx-1", agent_id, SandboxEventKind::Paused);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("sandbox:event"));
        assert_eq!(value["data"]["sandboxId"], json!("sbx-1"));
        assert_eq!(value["data"]["event"], json!("paused"));
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = SquadEvent::task_status(new_entity_id(), TaskStatus::InProgress, None);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!(event.event_type()));
        assert_eq!(value["data"]["status"], json!("in_progress"));
    }

    #[test]
    fn test_message_preview_is_truncated() {
        let content = "x".repeat(500);
        let event = SquadEvent::message_new(
            new_entity_id(),
            new_entity_id(),
            new_entity_id(),
            MessageType::Result,
            &content,
        );
        match event {
            SquadEvent::MessageNew { preview, .. } => assert_eq!(preview.len(), 100),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_deserialize() {
        let event = SquadEvent::agent_status(
            new_entity_id(),
            AgentStatus::Working,
            AgentSandboxStatus::Active,
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: SquadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
