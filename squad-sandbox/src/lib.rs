//! Squad Sandbox - Sandbox Lifecycle Manager
//!
//! Tracks one isolated remote session per agent through
//! create/execute/pause/resume/kill and keeps the `sandbox_tracking`
//! collection in step with every transition.

pub mod manager;
pub mod provider;
pub mod providers;

pub use manager::{
    CommandResult, ExecuteOptions, OutputCallback, ReconcileReport, SandboxConfig,
    SandboxInstance, SandboxManager,
};
pub use provider::{
    CreateRequest, NullSink, OutputSink, ProviderError, RunOptions, SandboxProvider,
    SandboxSession,
};
pub use providers::{
    E2bConfig, E2bProvider, MockCall, MockCommand, MockSandboxProvider, MockSandboxState,
};
