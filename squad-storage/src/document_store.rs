//! Async document store trait.
//!
//! The store is a collection-like capability: five named collections of JSON
//! documents with insert, filtered find with sort/limit, `$set` updates and
//! upsert. It carries no business logic. Each collection enforces uniqueness
//! on its primary key field.

use crate::filter::{Filter, FindOptions, SortKey, Update, UpdateOutcome};
use ::async_trait::async_trait;
use serde_json::Value;
use squad_core::SquadResult;
use std::fmt;

/// The five collections the squad persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    Agents,
    Messages,
    Checkpoints,
    Tasks,
    SandboxTracking,
}

impl CollectionName {
    pub const ALL: [CollectionName; 5] = [
        CollectionName::Agents,
        CollectionName::Messages,
        CollectionName::Checkpoints,
        CollectionName::Tasks,
        CollectionName::SandboxTracking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Agents => "agents",
            CollectionName::Messages => "messages",
            CollectionName::Checkpoints => "checkpoints",
            CollectionName::Tasks => "tasks",
            CollectionName::SandboxTracking => "sandbox_tracking",
        }
    }

    /// Primary identifier field, unique within the collection.
    pub fn key_field(&self) -> &'static str {
        match self {
            CollectionName::Agents => "agent_id",
            CollectionName::Messages => "message_id",
            CollectionName::Checkpoints => "checkpoint_id",
            CollectionName::Tasks => "task_id",
            CollectionName::SandboxTracking => "sandbox_id",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Async document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `DuplicateKey` if the key exists.
    async fn insert_one(&self, collection: CollectionName, doc: Value) -> SquadResult<()>;

    /// First document matching `filter` under `sort`.
    async fn find_one(
        &self,
        collection: CollectionName,
        filter: &Filter,
        sort: &[SortKey],
    ) -> SquadResult<Option<Value>>;

    /// All documents matching `filter`, sorted and limited.
    async fn find_many(
        &self,
        collection: CollectionName,
        filter: &Filter,
        options: &FindOptions,
    ) -> SquadResult<Vec<Value>>;

    /// Apply `update` to the first matching document.
    async fn update_one(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome>;

    /// Apply `update` to every matching document.
    async fn update_many(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome>;

    /// Update the first match, or insert a document built from the filter's
    /// equality conditions plus `update`.
    async fn upsert(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome>;
}
