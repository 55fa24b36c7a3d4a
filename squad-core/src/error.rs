//! Error types for squad operations

use crate::{AgentId, TaskId, TaskStatus};
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found in {collection}: {key}")]
    NotFound { collection: String, key: String },

    #[error("Duplicate key in {collection}: {field}={key}")]
    DuplicateKey {
        collection: String,
        field: String,
        key: String,
    },

    #[error("Serialization failed for {collection}: {reason}")]
    Serialization { collection: String, reason: String },

    #[error("Concurrent modification of {collection} record {key}")]
    ConcurrentModification { collection: String, key: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },
}

/// Validation errors raised before a record crosses the store boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("Invalid task transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Sandbox lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("No sandbox found for agent {agent_id}")]
    NotFound { agent_id: AgentId },

    #[error("No live sandbox with id {sandbox_id}")]
    UnknownSandbox { sandbox_id: String },

    #[error("Agent {agent_id} already has live sandbox {sandbox_id}")]
    AlreadyExists { agent_id: AgentId, sandbox_id: String },

    #[error("Sandbox creation failed: {reason}")]
    CreationFailed { reason: String },

    #[error("Command failed in sandbox {sandbox_id} (exit code {exit_code}): {command}: {stderr}")]
    CommandFailed {
        sandbox_id: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Command timed out in sandbox {sandbox_id}: {command}")]
    CommandTimeout { sandbox_id: String, command: String },

    #[error("Sandbox provider error for {sandbox_id}: {message}")]
    Provider { sandbox_id: String, message: String },
}

/// Completion provider errors. Propagated unchanged, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No completion provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Invalid API key for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Agent coordination errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: AgentId },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    #[error("Specialist requires a parent director")]
    MissingParent,

    #[error("Parent {parent_id} is not a director")]
    InvalidParent { parent_id: AgentId },
}

/// Master error type for all squad errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SquadError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

impl SquadError {
    /// Whether this error means an unknown id was referenced.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SquadError::Storage(StorageError::NotFound { .. })
                | SquadError::Sandbox(SandboxError::NotFound { .. })
                | SquadError::Sandbox(SandboxError::UnknownSandbox { .. })
                | SquadError::Agent(AgentError::AgentNotFound { .. })
                | SquadError::Agent(AgentError::TaskNotFound { .. })
        )
    }

    /// Whether this error is a command timeout, which callers may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SquadError::Sandbox(SandboxError::CommandTimeout { .. }))
    }
}

/// Result type alias for squad operations.
pub type SquadResult<T> = Result<T, SquadError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_sandbox_error_display_command_failed() {
        let err = SandboxError::CommandFailed {
            sandbox_id: "sbx-1".to_string(),
            command: "ls".to_string(),
            exit_code: 2,
            stderr: "no such file".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("sbx-1"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_validation_error_display_transition() {
        let err = ValidationError::InvalidTransition {
            task_id: Uuid::nil(),
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("completed -> pending"));
    }

    #[test]
    fn test_squad_error_from_variants() {
        let storage = SquadError::from(StorageError::Backend {
            reason: "down".to_string(),
        });
        assert!(matches!(storage, SquadError::Storage(_)));

        let sandbox = SquadError::from(SandboxError::NotFound {
            agent_id: Uuid::nil(),
        });
        assert!(matches!(sandbox, SquadError::Sandbox(_)));

        let llm = SquadError::from(LlmError::ProviderNotConfigured);
        assert!(matches!(llm, SquadError::Llm(_)));

        let agent = SquadError::from(AgentError::MissingParent);
        assert!(matches!(agent, SquadError::Agent(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(SquadError::from(SandboxError::NotFound {
            agent_id: Uuid::nil()
        })
        .is_not_found());
        assert!(SquadError::from(SandboxError::UnknownSandbox {
            sandbox_id: "sbx-old".to_string()
        })
        .is_not_found());
        assert!(SquadError::from(AgentError::TaskNotFound {
            task_id: Uuid::nil()
        })
        .is_not_found());
        assert!(!SquadError::from(LlmError::RateLimited {
            provider: "anthropic".to_string()
        })
        .is_not_found());
    }

    #[test]
    fn test_is_timeout() {
        let err = SquadError::from(SandboxError::CommandTimeout {
            sandbox_id: "sbx".to_string(),
            command: "sleep 100".to_string(),
        });
        assert!(err.is_timeout());
        assert!(!err.is_not_found());
    }
}
