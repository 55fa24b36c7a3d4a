//! Core entity structures
//!
//! Every record persisted by the squad has a strongly-typed shape here and a
//! `validate()` that the store adapter runs on read and on write.

use crate::{
    new_entity_id, AgentId, AgentRole, AgentSandboxStatus, AgentStatus, CheckpointId,
    EntityId, MessageId, MessagePriority, MessageType, SandboxId, Specialization, TaskId,
    TaskStatus, Timestamp, TrackingStatus, ValidationError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// AGENT
// ============================================================================

/// An agent registered with the squad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub role: AgentRole,
    pub specialization: Option<Specialization>,
    pub status: AgentStatus,
    pub sandbox_id: Option<SandboxId>,
    pub sandbox_status: AgentSandboxStatus,
    /// Director that spawned this agent. Null for directors.
    pub parent_id: Option<AgentId>,
    pub task_id: Option<TaskId>,
    pub created_at: Timestamp,
    pub last_heartbeat: Timestamp,
}

impl Agent {
    /// Create an idle agent with no sandbox.
    pub fn new(
        role: AgentRole,
        specialization: Option<Specialization>,
        parent_id: Option<AgentId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: new_entity_id(),
            role,
            specialization,
            status: AgentStatus::Idle,
            sandbox_id: None,
            sandbox_status: AgentSandboxStatus::None,
            parent_id,
            task_id: None,
            created_at: now,
            last_heartbeat: now,
        }
    }

    /// Create a director (no parent).
    pub fn director() -> Self {
        Self::new(AgentRole::Director, None, None)
    }

    /// Create a specialist under `parent_id`.
    pub fn specialist(parent_id: AgentId, specialization: Specialization) -> Self {
        Self::new(AgentRole::Specialist, Some(specialization), Some(parent_id))
    }

    /// Parent id is present iff the agent is a specialist.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.role, self.parent_id) {
            (AgentRole::Director, Some(_)) => Err(ValidationError::ConstraintViolation {
                constraint: "agent_parent".to_string(),
                reason: "director must not have a parent".to_string(),
            }),
            (AgentRole::Specialist, None) => Err(ValidationError::ConstraintViolation {
                constraint: "agent_parent".to_string(),
                reason: "specialist must have a parent director".to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn is_director(&self) -> bool {
        self.role == AgentRole::Director
    }
}

// ============================================================================
// MESSAGE
// ============================================================================

/// A directed message between two agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub content: String,
    pub message_type: MessageType,
    /// Conversation grouping, usually the related task id.
    pub thread_id: Option<EntityId>,
    pub priority: MessagePriority,
    /// Set once when read, never cleared.
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        from_agent: AgentId,
        to_agent: AgentId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            message_id: new_entity_id(),
            from_agent,
            to_agent,
            content: content.into(),
            message_type,
            thread_id: None,
            priority: MessagePriority::default(),
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_thread(mut self, thread_id: EntityId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("content", &self.content)
    }
}

// ============================================================================
// CHECKPOINT
// ============================================================================

/// Progress summary captured in a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub goal: String,
    pub completed: Vec<String>,
    pub pending: Vec<String>,
    pub decisions: Vec<String>,
}

impl CheckpointSummary {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Default::default()
        }
    }

    pub fn with_completed(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.completed = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pending(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pending = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_decisions(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.decisions = items.into_iter().map(Into::into).collect();
        self
    }
}

/// Where to pick up after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePointer {
    pub next_action: String,
    pub current_context: Option<String>,
    pub phase: String,
}

impl ResumePointer {
    pub fn new(next_action: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            next_action: next_action.into(),
            current_context: None,
            phase: phase.into(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.current_context = Some(context.into());
        self
    }
}

/// Immutable snapshot of an agent's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: CheckpointId,
    pub agent_id: AgentId,
    pub summary: CheckpointSummary,
    pub resume_pointer: ResumePointer,
    pub tokens_used: i64,
    /// Per-agent monotonic counter, breaks `created_at` ties.
    pub sequence: u64,
    pub created_at: Timestamp,
}

impl Checkpoint {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("summary.goal", &self.summary.goal)?;
        require_non_empty("resume_pointer.next_action", &self.resume_pointer.next_action)?;
        require_non_empty("resume_pointer.phase", &self.resume_pointer.phase)?;
        if self.tokens_used < 0 {
            return Err(ValidationError::InvalidValue {
                field: "tokens_used".to_string(),
                reason: format!("must be non-negative, got {}", self.tokens_used),
            });
        }
        Ok(())
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub parent_task_id: Option<TaskId>,
    pub assigned_to: Option<AgentId>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Only present on terminal tasks.
    pub result: Option<String>,
    /// Bumped on every write, used for conditional updates.
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Create a pending, unassigned task.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: new_entity_id(),
            parent_task_id: None,
            assigned_to: None,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            result: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_task_id: TaskId) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("title", &self.title)?;
        if self.result.is_some() && !self.status.is_terminal() {
            return Err(ValidationError::ConstraintViolation {
                constraint: "task_result".to_string(),
                reason: format!("result set on {} task", self.status),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SANDBOX TRACKING
// ============================================================================

/// Agent metadata attached to a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub agent_type: AgentRole,
    pub specialization: Specialization,
}

/// Lifecycle timestamps for a sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxLifecycle {
    pub created_at: Timestamp,
    pub paused_at: Option<Timestamp>,
    pub resumed_at: Option<Timestamp>,
    pub killed_at: Option<Timestamp>,
    pub last_heartbeat: Timestamp,
}

/// Resource shape requested for a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxResources {
    pub cpu_count: i32,
    pub memory_mb: i32,
    pub timeout_ms: i64,
}

impl Default for SandboxResources {
    fn default() -> Self {
        Self {
            cpu_count: 2,
            memory_mb: 512,
            timeout_ms: 600_000,
        }
    }
}

/// Accrued cost for a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SandboxCosts {
    pub estimated_cost: f64,
    pub runtime_seconds: i64,
}

/// Persisted mirror of a sandbox instance. Upserted by `sandbox_id`,
/// survives as a tombstone after kill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxTracking {
    pub sandbox_id: SandboxId,
    pub agent_id: AgentId,
    pub task_id: Option<TaskId>,
    pub status: TrackingStatus,
    pub metadata: SandboxMetadata,
    pub lifecycle: SandboxLifecycle,
    pub resources: SandboxResources,
    pub costs: SandboxCosts,
}

impl SandboxTracking {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("sandbox_id", &self.sandbox_id)?;
        let r = &self.resources;
        if r.cpu_count <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "resources.cpu_count".to_string(),
                reason: format!("must be positive, got {}", r.cpu_count),
            });
        }
        if r.memory_mb <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "resources.memory_mb".to_string(),
                reason: format!("must be positive, got {}", r.memory_mb),
            });
        }
        if r.timeout_ms <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "resources.timeout_ms".to_string(),
                reason: format!("must be positive, got {}", r.timeout_ms),
            });
        }
        if self.costs.estimated_cost < 0.0 || self.costs.runtime_seconds < 0 {
            return Err(ValidationError::InvalidValue {
                field: "costs".to_string(),
                reason: "costs must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_director_has_no_parent() {
        let director = Agent::director();
        assert!(director.parent_id.is_none());
        assert!(director.validate().is_ok());
        assert_eq!(director.sandbox_status, AgentSandboxStatus::None);
    }

    #[test]
    fn test_specialist_without_parent_is_rejected() {
        let mut specialist = Agent::specialist(new_entity_id(), Specialization::Writer);
        assert!(specialist.validate().is_ok());
        specialist.parent_id = None;
        assert!(matches!(
            specialist.validate(),
            Err(ValidationError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_task_result_requires_terminal_status() {
        let mut task = Task::new("Research X", "find things");
        task.result = Some("early".to_string());
        assert!(task.validate().is_err());
        task.status = TaskStatus::Completed;
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_negative_resources_fail_validation() {
        let now = Utc::now();
        let tracking = SandboxTracking {
            sandbox_id: "sbx-1".to_string(),
            agent_id: new_entity_id(),
            task_id: None,
            status: TrackingStatus::Active,
            metadata: SandboxMetadata {
                agent_type: AgentRole::Specialist,
                specialization: Specialization::General,
            },
            lifecycle: SandboxLifecycle {
                created_at: now,
                paused_at: None,
                resumed_at: None,
                killed_at: None,
                last_heartbeat: now,
            },
            resources: SandboxResources {
                cpu_count: -1,
                ..Default::default()
            },
            costs: SandboxCosts::default(),
        };
        let err = tracking.validate().unwrap_err();
        assert!(err.to_string().contains("cpu_count"));
    }

    #[test]
    fn test_checkpoint_requires_phase() {
        let checkpoint = Checkpoint {
            checkpoint_id: new_entity_id(),
            agent_id: new_entity_id(),
            summary: CheckpointSummary::new("goal"),
            resume_pointer: ResumePointer::new("next", " "),
            tokens_used: 0,
            sequence: 0,
            created_at: Utc::now(),
        };
        assert!(matches!(
            checkpoint.validate(),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_message_defaults() {
        let msg = Message::new(new_entity_id(), new_entity_id(), "hi", MessageType::Status);
        assert_eq!(msg.priority, MessagePriority::Normal);
        assert!(!msg.is_read());
        assert!(msg.thread_id.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parent_iff_specialist(is_director in any::<bool>(), has_parent in any::<bool>()) {
            let mut agent = if is_director {
                Agent::director()
            } else {
                Agent::specialist(new_entity_id(), Specialization::General)
            };
            agent.parent_id = if has_parent { Some(new_entity_id()) } else { None };
            prop_assert_eq!(agent.validate().is_ok(), is_director != has_parent);
        }
    }
}
