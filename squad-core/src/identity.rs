//! Identity types for squad entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Agent identifier.
pub type AgentId = EntityId;

/// Task identifier.
pub type TaskId = EntityId;

/// Message identifier.
pub type MessageId = EntityId;

/// Checkpoint identifier.
pub type CheckpointId = EntityId;

/// Remote sandbox session identifier. Assigned by the sandbox provider,
/// so it is an opaque string rather than a UUID.
pub type SandboxId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds for timeouts.
pub type DurationMs = u64;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// First eight characters of an id, used in human-readable digests.
pub fn short_id(id: &EntityId) -> String {
    id.to_string().chars().take(8).collect()
}
