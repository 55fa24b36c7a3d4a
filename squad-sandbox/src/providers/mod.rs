//! Sandbox provider implementations

pub mod e2b;
pub mod mock;

pub use e2b::{E2bConfig, E2bProvider};
pub use mock::{MockCall, MockCommand, MockSandboxProvider, MockSandboxState};
