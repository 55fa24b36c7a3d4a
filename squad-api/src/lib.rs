//! Squad API - Boundary Layer
//!
//! The request/response contract consumed by a transport, plus the
//! ambient pieces the `squad` binary needs:
//!
//! - [`SquadService`]: every boundary operation over a [`squad_agents::Squad`]
//! - [`ApiError`]: the `{error, message, statusCode}` failure body
//! - [`SquadConfig`]: environment configuration
//! - [`init_tracing`]: subscriber setup

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;
pub mod types;

pub use config::{LogFormat, SquadConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use service::{SquadService, DEFAULT_MESSAGE_LIMIT};
pub use telemetry::init_tracing;
pub use types::*;
