//! Enum types for squad entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// ============================================================================
// AGENT ENUMS
// ============================================================================

/// Role an agent plays in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Decomposes a goal and coordinates specialists
    Director,
    /// Executes one scoped subtask
    Specialist,
}

impl AgentRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentRole::Director => "director",
            AgentRole::Specialist => "specialist",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "director" => Ok(AgentRole::Director),
            "specialist" => Ok(AgentRole::Specialist),
            _ => Err(ParseEnumError::new("agent role", s)),
        }
    }
}

/// Specialization tag for specialist agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Researcher,
    Writer,
    Analyst,
    #[default]
    General,
}

impl Specialization {
    /// All specializations, in keyword-match order.
    pub const ALL: [Specialization; 4] = [
        Specialization::Researcher,
        Specialization::Writer,
        Specialization::Analyst,
        Specialization::General,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Specialization::Researcher => "researcher",
            Specialization::Writer => "writer",
            Specialization::Analyst => "analyst",
            Specialization::General => "general",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "researcher" => Ok(Specialization::Researcher),
            "writer" => Ok(Specialization::Writer),
            "analyst" => Ok(Specialization::Analyst),
            "general" => Ok(Specialization::General),
            _ => Err(ParseEnumError::new("specialization", s)),
        }
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, not doing anything
    #[default]
    Idle,
    /// Executing a task
    Working,
    /// Blocked on other agents
    Waiting,
    /// Retired, either finished or killed
    Completed,
    /// Last task failed
    Error,
}

impl AgentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(AgentStatus::Idle),
            "working" => Ok(AgentStatus::Working),
            "waiting" => Ok(AgentStatus::Waiting),
            "completed" => Ok(AgentStatus::Completed),
            "error" => Ok(AgentStatus::Error),
            _ => Err(ParseEnumError::new("agent status", s)),
        }
    }

    /// Whether the agent is still part of the live squad.
    pub fn is_live(&self) -> bool {
        !matches!(self, AgentStatus::Completed | AgentStatus::Error)
    }
}

/// Sandbox status as recorded on the agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentSandboxStatus {
    #[default]
    None,
    Active,
    Paused,
    Killed,
}

impl AgentSandboxStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentSandboxStatus::None => "none",
            AgentSandboxStatus::Active => "active",
            AgentSandboxStatus::Paused => "paused",
            AgentSandboxStatus::Killed => "killed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AgentSandboxStatus::None),
            "active" => Ok(AgentSandboxStatus::Active),
            "paused" => Ok(AgentSandboxStatus::Paused),
            "killed" => Ok(AgentSandboxStatus::Killed),
            _ => Err(ParseEnumError::new("agent sandbox status", s)),
        }
    }
}

// ============================================================================
// SANDBOX ENUMS
// ============================================================================

/// Status of a live in-memory sandbox instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Active,
    Paused,
    Killed,
}

impl SandboxState {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SandboxState::Active => "active",
            SandboxState::Paused => "paused",
            SandboxState::Killed => "killed",
        }
    }

    /// The matching status for the agent record.
    pub fn to_agent_status(self) -> AgentSandboxStatus {
        match self {
            SandboxState::Active => AgentSandboxStatus::Active,
            SandboxState::Paused => AgentSandboxStatus::Paused,
            SandboxState::Killed => AgentSandboxStatus::Killed,
        }
    }
}

/// Status of a persisted sandbox tracking record.
///
/// `Resuming` only exists in the store, for the duration of a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Creating,
    Active,
    Paused,
    Resuming,
    Killed,
}

impl TrackingStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TrackingStatus::Creating => "creating",
            TrackingStatus::Active => "active",
            TrackingStatus::Paused => "paused",
            TrackingStatus::Resuming => "resuming",
            TrackingStatus::Killed => "killed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "creating" => Ok(TrackingStatus::Creating),
            "active" => Ok(TrackingStatus::Active),
            "paused" => Ok(TrackingStatus::Paused),
            "resuming" => Ok(TrackingStatus::Resuming),
            "killed" => Ok(TrackingStatus::Killed),
            _ => Err(ParseEnumError::new("tracking status", s)),
        }
    }

    /// Whether a sandbox with this status may still be reconnected.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrackingStatus::Active | TrackingStatus::Paused | TrackingStatus::Resuming
        )
    }
}

impl From<SandboxState> for TrackingStatus {
    fn from(state: SandboxState) -> Self {
        match state {
            SandboxState::Active => TrackingStatus::Active,
            SandboxState::Paused => TrackingStatus::Paused,
            SandboxState::Killed => TrackingStatus::Killed,
        }
    }
}

/// Which output stream a chunk of command output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

// ============================================================================
// MESSAGE ENUMS
// ============================================================================

/// Type of message passed between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Task,
    Result,
    Status,
    Error,
}

impl MessageType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MessageType::Task => "task",
            MessageType::Result => "result",
            MessageType::Status => "status",
            MessageType::Error => "error",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "task" => Ok(MessageType::Task),
            "result" => Ok(MessageType::Result),
            "status" => Ok(MessageType::Status),
            "error" => Ok(MessageType::Error),
            _ => Err(ParseEnumError::new("message type", s)),
        }
    }
}

/// Advisory message priority. Delivery order is never affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    High,
    #[default]
    Normal,
    Low,
}

impl MessagePriority {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MessagePriority::High => "high",
            MessagePriority::Normal => "normal",
            MessagePriority::Low => "low",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "high" => Ok(MessagePriority::High),
            "normal" => Ok(MessagePriority::Normal),
            "low" => Ok(MessagePriority::Low),
            _ => Err(ParseEnumError::new("message priority", s)),
        }
    }
}

// ============================================================================
// TASK ENUMS
// ============================================================================

/// Status of a task in the coordination engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(ParseEnumError::new("task status", s)),
        }
    }

    /// Check if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a task may move from `self` to `next`.
    ///
    /// Progress is monotonic except for the explicit re-queue
    /// `InProgress -> Assigned` used when an interrupted agent restarts.
    /// Terminal statuses never change.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (a, b) if *a == b => true,
            (Pending, Assigned | InProgress | Completed | Failed) => true,
            (Assigned, InProgress | Completed | Failed) => true,
            (InProgress, Assigned | Completed | Failed) => true,
            _ => false,
        }
    }
}

macro_rules! impl_display_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.as_db_str())
                }
            }
        )*
    };
}

impl_display_from_str!(
    AgentRole,
    Specialization,
    AgentStatus,
    AgentSandboxStatus,
    SandboxState,
    TrackingStatus,
    OutputStream,
    MessageType,
    MessagePriority,
    TaskStatus,
);

macro_rules! impl_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromStr for $ty {
                type Err = ParseEnumError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::from_db_str(s)
                }
            }
        )*
    };
}

impl_from_str!(
    AgentRole,
    Specialization,
    AgentStatus,
    AgentSandboxStatus,
    TrackingStatus,
    MessageType,
    MessagePriority,
    TaskStatus,
);

// =============================================================================
// TESTS
// =============================================================================
