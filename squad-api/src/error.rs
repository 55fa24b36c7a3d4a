//! Error Types for the Squad Boundary
//!
//! Every boundary operation fails with an [`ApiError`]: a machine-readable
//! `error` tag, a human `message` that may embed the underlying cause, and
//! an HTTP-style `statusCode`. Unknown ids are always 404, rejected input
//! 400, and everything else 500 under the operation's own tag.

use serde::{Deserialize, Serialize};
use squad_core::{AgentError, ConfigError, SquadError};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error tags for boundary responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown agent, task or sandbox id
    NotFound,
    /// Request or record failed validation
    ValidationFailed,
    SpawnFailed,
    TaskFailed,
    KillFailed,
    RestartFailed,
    PauseFailed,
    ResumeFailed,
    InternalError,
}

impl ErrorCode {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            ErrorCode::ValidationFailed => 400,
            ErrorCode::SpawnFailed
            | ErrorCode::TaskFailed
            | ErrorCode::KillFailed
            | ErrorCode::RestartFailed
            | ErrorCode::PauseFailed
            | ErrorCode::ResumeFailed
            | ErrorCode::InternalError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::SpawnFailed => "spawn_failed",
            ErrorCode::TaskFailed => "task_failed",
            ErrorCode::KillFailed => "kill_failed",
            ErrorCode::RestartFailed => "restart_failed",
            ErrorCode::PauseFailed => "pause_failed",
            ErrorCode::ResumeFailed => "resume_failed",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error body returned by every boundary operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorCode,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl ApiError {
    pub fn new(error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            status_code: error.status_code(),
        }
    }

    /// `<Kind> <id> not found`.
    pub fn not_found(kind: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} {} not found", kind, id))
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Map a core failure for an operation tagged `fallback`. Not-found and
    /// validation failures keep their own tags.
    pub fn from_squad(fallback: ErrorCode, err: SquadError) -> Self {
        let code = if err.is_not_found() {
            ErrorCode::NotFound
        } else if matches!(
            err,
            SquadError::Validation(_)
                | SquadError::Config(_)
                | SquadError::Agent(AgentError::MissingParent | AgentError::InvalidParent { .. })
        ) {
            ErrorCode::ValidationFailed
        } else {
            fallback
        };
        Self::new(code, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error, self.status_code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<SquadError> for ApiError {
    fn from(err: SquadError) -> Self {
        ApiError::from_squad(ErrorCode::InternalError, err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::validation_failed(err.to_string())
    }
}

/// Result type alias for boundary operations.
pub type ApiResult<T> = Result<T, ApiError>;
