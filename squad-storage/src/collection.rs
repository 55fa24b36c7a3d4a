//! Typed collections.
//!
//! `Collection<T>` is the validation edge: whole records are validated before
//! they are written, partial updates are validated against the record they
//! would produce, and every document is deserialized and validated when it
//! is read back. Business code never touches raw JSON.

use crate::document_store::{CollectionName, DocumentStore};
use crate::filter::{set_path, Filter, FindOptions, SortKey, Update, UpdateOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use squad_core::{
    Agent, Checkpoint, Message, SandboxTracking, SquadResult, StorageError, Task,
    ValidationError,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// A record type stored in one named collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: CollectionName;

    /// Value of the collection's key field.
    fn key(&self) -> String;

    fn validate(&self) -> Result<(), ValidationError>;
}

impl Record for Agent {
    const COLLECTION: CollectionName = CollectionName::Agents;

    fn key(&self) -> String {
        self.agent_id.to_string()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Agent::validate(self)
    }
}

impl Record for Message {
    const COLLECTION: CollectionName = CollectionName::Messages;

    fn key(&self) -> String {
        self.message_id.to_string()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Message::validate(self)
    }
}

impl Record for Checkpoint {
    const COLLECTION: CollectionName = CollectionName::Checkpoints;

    fn key(&self) -> String {
        self.checkpoint_id.to_string()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Checkpoint::validate(self)
    }
}

impl Record for Task {
    const COLLECTION: CollectionName = CollectionName::Tasks;

    fn key(&self) -> String {
        self.task_id.to_string()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Task::validate(self)
    }
}

impl Record for SandboxTracking {
    const COLLECTION: CollectionName = CollectionName::SandboxTracking;

    fn key(&self) -> String {
        self.sandbox_id.clone()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        SandboxTracking::validate(self)
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

/// Typed handle onto one collection of a shared store.
pub struct Collection<T: Record> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> CollectionName {
        T::COLLECTION
    }

    /// Filter selecting one record by its key.
    pub fn key_filter(key: impl Serialize) -> Filter {
        Filter::new().eq(T::COLLECTION.key_field(), key)
    }

    fn encode(record: &T) -> SquadResult<Value> {
        record.validate()?;
        serde_json::to_value(record).map_err(|e| {
            StorageError::Serialization {
                collection: T::COLLECTION.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn decode(doc: Value) -> SquadResult<T> {
        let record: T = serde_json::from_value(doc).map_err(|e| StorageError::Serialization {
            collection: T::COLLECTION.to_string(),
            reason: e.to_string(),
        })?;
        record.validate()?;
        Ok(record)
    }

    pub async fn insert(&self, record: &T) -> SquadResult<()> {
        let doc = Self::encode(record)?;
        self.store.insert_one(T::COLLECTION, doc).await
    }

    pub async fn find_one(&self, filter: &Filter, sort: &[SortKey]) -> SquadResult<Option<T>> {
        self.store
            .find_one(T::COLLECTION, filter, sort)
            .await?
            .map(Self::decode)
            .transpose()
    }

    pub async fn find_many(&self, filter: &Filter, options: &FindOptions) -> SquadResult<Vec<T>> {
        self.store
            .find_many(T::COLLECTION, filter, options)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    /// Look a record up by key.
    pub async fn get(&self, key: impl Serialize) -> SquadResult<Option<T>> {
        self.find_one(&Self::key_filter(key), &[]).await
    }

    /// Apply `update` to copies of the matching documents and validate the
    /// records they would become. Returns how many documents matched.
    async fn check_update(
        &self,
        filter: &Filter,
        update: &Update,
        limit: Option<usize>,
    ) -> SquadResult<usize> {
        let options = FindOptions {
            sort: Vec::new(),
            limit,
        };
        let docs = self.store.find_many(T::COLLECTION, filter, &options).await?;
        let matched = docs.len();
        for mut doc in docs {
            update.apply(&mut doc);
            Self::decode(doc)?;
        }
        Ok(matched)
    }

    pub async fn update_one(&self, filter: &Filter, update: &Update) -> SquadResult<UpdateOutcome> {
        self.check_update(filter, update, Some(1)).await?;
        self.store.update_one(T::COLLECTION, filter, update).await
    }

    pub async fn update_many(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome> {
        self.check_update(filter, update, None).await?;
        self.store.update_many(T::COLLECTION, filter, update).await
    }

    /// Partial update by key. Fails with `NotFound` when nothing matched.
    pub async fn update_by_key(&self, key: &str, update: &Update) -> SquadResult<UpdateOutcome> {
        let outcome = self.update_one(&Self::key_filter(key), update).await?;
        if outcome.matched == 0 {
            return Err(StorageError::NotFound {
                collection: T::COLLECTION.to_string(),
                key: key.to_string(),
            }
            .into());
        }
        Ok(outcome)
    }

    /// Update the first match, or insert the record built from the filter's
    /// equalities plus `update`. Either outcome is validated first.
    pub async fn upsert(&self, filter: &Filter, update: &Update) -> SquadResult<UpdateOutcome> {
        if self.check_update(filter, update, Some(1)).await? == 0 {
            let mut doc = Value::Object(serde_json::Map::new());
            for (field, value) in filter.equalities() {
                set_path(&mut doc, field, value.clone());
            }
            update.apply(&mut doc);
            Self::decode(doc)?;
        }
        self.store.upsert(T::COLLECTION, filter, update).await
    }

    /// Validate and upsert a whole record, keyed by its primary key.
    pub async fn upsert_record(&self, record: &T) -> SquadResult<UpdateOutcome> {
        let doc = Self::encode(record)?;
        self.store
            .upsert(
                T::COLLECTION,
                &Self::key_filter(record.key()),
                &Update::from_document(&doc),
            )
            .await
    }
}

// ============================================================================
// COLLECTIONS
// ============================================================================

/// All five typed collections over one store.
#[derive(Clone)]
pub struct Collections {
    store: Arc<dyn DocumentStore>,
    pub agents: Collection<Agent>,
    pub messages: Collection<Message>,
    pub checkpoints: Collection<Checkpoint>,
    pub tasks: Collection<Task>,
    pub sandbox_tracking: Collection<SandboxTracking>,
}

impl Collections {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            agents: Collection::new(Arc::clone(&store)),
            messages: Collection::new(Arc::clone(&store)),
            checkpoints: Collection::new(Arc::clone(&store)),
            tasks: Collection::new(Arc::clone(&store)),
            sandbox_tracking: Collection::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use squad_core::{SquadError, TaskStatus};

    fn collections() -> Collections {
        Collections::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_insert_then_get_roundtrip() {
        let c = collections();
        let task = Task::new("Research X", "details");
        c.tasks.insert(&task).await.unwrap();
        let loaded = c.tasks.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_written() {
        let c = collections();
        let mut task = Task::new("", "no title");
        task.status = TaskStatus::Pending;
        let err = c.tasks.insert(&task).await.unwrap_err();
        assert!(matches!(err, SquadError::Validation(_)));
        assert!(c.tasks.get(task.task_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_document_is_rejected_on_read() {
        let store = Arc::new(InMemoryStore::new());
        let c = Collections::new(store.clone());
        let task = Task::new("t", "d");
        c.tasks.insert(&task).await.unwrap();
        store
            .update_one(
                CollectionName::Tasks,
                &Collection::<Task>::key_filter(task.task_id),
                &Update::new().set("result", "too early"),
            )
            .await
            .unwrap();
        let err = c.tasks.get(task.task_id).await.unwrap_err();
        assert!(matches!(err, SquadError::Validation(_)));
    }

    #[tokio::test]
    async fn test_partial_update_producing_invalid_record_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let c = Collections::new(store.clone());
        let task = Task::new("t", "d");
        c.tasks.insert(&task).await.unwrap();
        let writes = store.statistics().writes();

        let err = c
            .tasks
            .update_by_key(&task.task_id.to_string(), &Update::new().set("result", "too early"))
            .await
            .unwrap_err();
        assert!(matches!(err, SquadError::Validation(_)));
        assert_eq!(store.statistics().writes(), writes);
        assert_eq!(c.tasks.get(task.task_id).await.unwrap().unwrap(), task);

        let err = c
            .tasks
            .update_many(&Filter::new(), &Update::new().set("title", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, SquadError::Validation(_)));
        assert_eq!(store.statistics().writes(), writes);
    }

    #[tokio::test]
    async fn test_upsert_of_incomplete_record_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let c = Collections::new(store.clone());
        let err = c
            .sandbox_tracking
            .upsert(
                &Collection::<SandboxTracking>::key_filter("sbx-1"),
                &Update::new().set("status", "active"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SquadError::Storage(StorageError::Serialization { .. })
        ));
        assert_eq!(store.count(CollectionName::SandboxTracking), 0);
    }

    #[tokio::test]
    async fn test_valid_partial_update_is_written() {
        let c = collections();
        let task = Task::new("t", "d");
        c.tasks.insert(&task).await.unwrap();
        let outcome = c
            .tasks
            .update_one(
                &Collection::<Task>::key_filter(task.task_id),
                &Update::new().set("title", "renamed"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);
        assert_eq!(c.tasks.get(task.task_id).await.unwrap().unwrap().title, "renamed");
    }

    #[tokio::test]
    async fn test_update_by_key_missing() {
        let c = collections();
        let err = c
            .tasks
            .update_by_key("nope", &Update::new().set("title", "x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
