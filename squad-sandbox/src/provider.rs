//! Remote sandbox provider capability.
//!
//! A provider allocates isolated remote sessions; a session runs commands
//! with streamed output and can be hibernated or destroyed. Reconnecting to
//! a hibernated session by id resumes it.

use async_trait::async_trait;
use squad_core::OutputStream;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a sandbox provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Operation timed out")]
    Timeout,

    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("Provider request failed: {0}")]
    Request(String),
}

/// Parameters for allocating a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub timeout_ms: i64,
    pub cpu_count: i32,
    pub memory_mb: i32,
    pub metadata: HashMap<String, String>,
}

/// Per-command options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
}

/// Receives output chunks while a command runs.
pub trait OutputSink: Send + Sync {
    fn on_output(&self, stream: OutputStream, chunk: &str);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn on_output(&self, _stream: OutputStream, _chunk: &str) {}
}

/// Handle onto one live remote session.
#[async_trait]
pub trait SandboxSession: Send + Sync {
    fn sandbox_id(&self) -> &str;

    /// Run a shell command, streaming output to `sink`. Returns the exit
    /// code; a non-zero exit is not an error at this layer.
    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
        sink: &dyn OutputSink,
    ) -> Result<i32, ProviderError>;

    /// Hibernate the session, preserving its state.
    async fn pause(&self) -> Result<(), ProviderError>;

    /// Destroy the session.
    async fn kill(&self) -> Result<(), ProviderError>;
}

/// Allocates and reconnects sessions.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, request: &CreateRequest) -> Result<Arc<dyn SandboxSession>, ProviderError>;

    /// Reconnect to an existing session by id, resuming it if hibernated.
    async fn connect(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxSession>, ProviderError>;

    /// Obtain a handle for an existing session without changing its state.
    async fn attach(&self, sandbox_id: &str) -> Result<Arc<dyn SandboxSession>, ProviderError>;
}
