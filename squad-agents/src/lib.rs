//! Squad Agents - Director/Specialist Coordination
//!
//! Composes the store, event bus, sandbox manager and completion runner
//! into a working squad:
//!
//! - [`MessageBus`]: persisted directed messages with read tracking
//! - [`CheckpointStore`]: append-only checkpoints and resume briefings
//! - [`TaskBoard`]: the task state machine with conditional writes
//! - [`AgentRegistry`]: registration, status and hierarchy queries
//! - [`Squad`]: the handle tying them together, with the director,
//!   specialist and kill/restart flows

pub mod checkpoints;
pub mod context;
pub mod director;
pub mod lifecycle;
pub mod messages;
pub mod registry;
pub mod specialist;
pub mod squad;
pub mod tasks;

pub use checkpoints::{render_resume_context, CheckpointStore, ResumeState};
pub use context::{ContextPacket, ContextPacketInput, DEFAULT_PACKET_MESSAGES};
pub use director::{
    aggregate_results, determine_specialization, parse_subtasks, TaskAssignment,
};
pub use messages::{format_messages_for_context, MessageBus};
pub use registry::{AgentConfig, AgentContext, AgentRegistry};
pub use specialist::build_task_prompt;
pub use squad::{Squad, SquadBuilder};
pub use tasks::TaskBoard;
