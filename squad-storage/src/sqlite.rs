//! SQLite document store.
//!
//! All five collections share one `documents` table keyed by
//! `(collection, doc_key)`; bodies are stored as JSON text. Filtering and
//! sorting run over decoded documents with the same semantics as
//! [`InMemoryStore`](crate::InMemoryStore), so the two are interchangeable.
//! Multi-document updates run in one transaction.

use crate::document_store::{CollectionName, DocumentStore};
use crate::filter::{get_path, set_path, Filter, FindOptions, SortKey, Update, UpdateOutcome};
use crate::memory::sort_documents;
use ::async_trait::async_trait;
use rusqlite::{Connection, ErrorCode};
use serde_json::Value;
use squad_core::{SquadError, SquadResult, StorageError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    doc_key TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE (collection, doc_key)
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
";

/// `DocumentStore` persisted in a SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> SquadResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| backend("open database", e))?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Private database that disappears with the store.
    pub fn open_in_memory() -> SquadResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| backend("open database", e))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> SquadResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| backend("create schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn backend(action: &str, e: rusqlite::Error) -> SquadError {
    StorageError::Backend {
        reason: format!("Failed to {}: {}", action, e),
    }
    .into()
}

/// Key field of `doc` as stored in `doc_key`.
fn document_key(collection: CollectionName, doc: &Value) -> SquadResult<String> {
    let field = collection.key_field();
    match get_path(doc, field) {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(key) if !key.is_null() => Ok(key.to_string()),
        _ => Err(StorageError::Backend {
            reason: format!("{} document missing key field {}", collection, field),
        }
        .into()),
    }
}

fn write_error(collection: CollectionName, key: &str, e: rusqlite::Error) -> SquadError {
    match e {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::DuplicateKey {
                collection: collection.to_string(),
                field: collection.key_field().to_string(),
                key: key.to_string(),
            }
            .into()
        }
        other => backend("write document", other),
    }
}

/// Every document of a collection with its row id, in insertion order.
fn load(conn: &Connection, collection: CollectionName) -> SquadResult<Vec<(i64, Value)>> {
    let mut stmt = conn
        .prepare("SELECT seq, body FROM documents WHERE collection = ?1 ORDER BY seq")
        .map_err(|e| backend("prepare query", e))?;
    let rows = stmt
        .query_map([collection.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| backend("query documents", e))?;

    let mut docs = Vec::new();
    for row in rows {
        let (seq, body) = row.map_err(|e| backend("read row", e))?;
        let doc = serde_json::from_str(&body).map_err(|e| StorageError::Serialization {
            collection: collection.to_string(),
            reason: e.to_string(),
        })?;
        docs.push((seq, doc));
    }
    Ok(docs)
}

fn insert_row(conn: &Connection, collection: CollectionName, doc: &Value) -> SquadResult<()> {
    let key = document_key(collection, doc)?;
    conn.execute(
        "INSERT INTO documents (collection, doc_key, body) VALUES (?1, ?2, ?3)",
        (collection.as_str(), &key, doc.to_string()),
    )
    .map_err(|e| write_error(collection, &key, e))?;
    Ok(())
}

fn apply_updates(
    conn: &Connection,
    collection: CollectionName,
    filter: &Filter,
    update: &Update,
    first_only: bool,
) -> SquadResult<UpdateOutcome> {
    let mut outcome = UpdateOutcome::default();
    for (seq, doc) in load(conn, collection)? {
        if !filter.matches(&doc) {
            continue;
        }
        outcome.matched += 1;
        let mut candidate = doc;
        if update.apply(&mut candidate) {
            let key = document_key(collection, &candidate)?;
            conn.execute(
                "UPDATE documents SET doc_key = ?1, body = ?2 WHERE seq = ?3",
                (&key, candidate.to_string(), seq),
            )
            .map_err(|e| write_error(collection, &key, e))?;
            outcome.modified += 1;
        }
        if first_only {
            break;
        }
    }
    Ok(outcome)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_one(&self, collection: CollectionName, doc: Value) -> SquadResult<()> {
        insert_row(&self.lock(), collection, &doc)?;
        debug!(collection = %collection, "Inserted document");
        Ok(())
    }

    async fn find_one(
        &self,
        collection: CollectionName,
        filter: &Filter,
        sort: &[SortKey],
    ) -> SquadResult<Option<Value>> {
        let options = FindOptions {
            sort: sort.to_vec(),
            limit: Some(1),
        };
        let mut found = self.find_many(collection, filter, &options).await?;
        Ok(found.pop())
    }

    async fn find_many(
        &self,
        collection: CollectionName,
        filter: &Filter,
        options: &FindOptions,
    ) -> SquadResult<Vec<Value>> {
        let mut matched: Vec<Value> = load(&self.lock(), collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| filter.matches(doc))
            .collect();
        if !options.sort.is_empty() {
            sort_documents(&mut matched, &options.sort);
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update_one(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome> {
        apply_updates(&self.lock(), collection, filter, update, true)
    }

    async fn update_many(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| backend("begin transaction", e))?;
        let outcome = apply_updates(&tx, collection, filter, update, false)?;
        tx.commit().map_err(|e| backend("commit transaction", e))?;
        Ok(outcome)
    }

    async fn upsert(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| backend("begin transaction", e))?;
        let outcome = apply_updates(&tx, collection, filter, update, true)?;
        if outcome.matched > 0 {
            tx.commit().map_err(|e| backend("commit transaction", e))?;
            return Ok(outcome);
        }

        let mut doc = Value::Object(serde_json::Map::new());
        for (field, value) in filter.equalities() {
            set_path(&mut doc, field, value.clone());
        }
        update.apply(&mut doc);
        insert_row(&tx, collection, &doc)?;
        tx.commit().map_err(|e| backend("commit transaction", e))?;
        debug!(collection = %collection, "Upserted new document");
        Ok(UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Collections;
    use serde_json::json;
    use squad_core::{new_entity_id, Task, TaskStatus};
    use std::sync::Arc;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("squad-store-{}.db", new_entity_id()))
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let path = temp_path();
        let task = Task::new("Research X", "details");
        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            Collections::new(store).tasks.insert(&task).await.unwrap();
        }

        let reopened = Arc::new(SqliteStore::open(&path).unwrap());
        let loaded = Collections::new(reopened)
            .tasks
            .get(task.task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, task);
        assert_eq!(loaded.status, TaskStatus::Pending);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_insert_enforces_unique_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_one(CollectionName::Tasks, json!({"task_id": "a"}))
            .await
            .unwrap();
        let err = store
            .insert_one(CollectionName::Tasks, json!({"task_id": "a"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SquadError::Storage(StorageError::DuplicateKey { .. })
        ));
        store
            .insert_one(CollectionName::Messages, json!({"message_id": "a"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_many_filters_sorts_and_limits() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, to, ts) in [
            ("m1", "a", "2024-01-01T00:00:01Z"),
            ("m2", "b", "2024-01-01T00:00:02Z"),
            ("m3", "a", "2024-01-01T00:00:03Z"),
            ("m4", "a", "2024-01-01T00:00:00.5Z"),
        ] {
            store
                .insert_one(
                    CollectionName::Messages,
                    json!({"message_id": id, "to_agent": to, "created_at": ts}),
                )
                .await
                .unwrap();
        }
        let docs = store
            .find_many(
                CollectionName::Messages,
                &Filter::new().eq("to_agent", "a"),
                &FindOptions::new().sort(SortKey::desc("created_at")).limit(2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d["message_id"].clone()).collect();
        assert_eq!(ids, vec![json!("m3"), json!("m1")]);
    }

    #[tokio::test]
    async fn test_update_many_and_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ["m1", "m2", "m3"] {
            store
                .insert_one(
                    CollectionName::Messages,
                    json!({"message_id": id, "read_at": null}),
                )
                .await
                .unwrap();
        }
        let outcome = store
            .update_many(
                CollectionName::Messages,
                &Filter::new().is_in("message_id", ["m1", "m3"]),
                &Update::new().set("read_at", "2024-01-01T00:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.modified, 2);

        let filter = Filter::new().eq("sandbox_id", "sbx-1");
        let first = store
            .upsert(
                CollectionName::SandboxTracking,
                &filter,
                &Update::new()
                    .set("status", "active")
                    .set("lifecycle.paused_at", Value::Null),
            )
            .await
            .unwrap();
        assert!(first.upserted);
        let second = store
            .upsert(
                CollectionName::SandboxTracking,
                &filter,
                &Update::new().set("status", "paused"),
            )
            .await
            .unwrap();
        assert!(!second.upserted);
        let doc = store
            .find_one(CollectionName::SandboxTracking, &filter, &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["status"], json!("paused"));
        assert!(doc["lifecycle"]["paused_at"].is_null());
    }

    #[tokio::test]
    async fn test_failed_update_many_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ["a", "b"] {
            store
                .insert_one(CollectionName::Tasks, json!({"task_id": id, "n": 0}))
                .await
                .unwrap();
        }
        let err = store
            .update_many(
                CollectionName::Tasks,
                &Filter::new(),
                &Update::new().set("n", 1).set("task_id", "same"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SquadError::Storage(StorageError::DuplicateKey { .. })
        ));
        let docs = store
            .find_many(
                CollectionName::Tasks,
                &Filter::new().eq("n", 1),
                &FindOptions::new(),
            )
            .await
            .unwrap();
        assert!(docs.is_empty());
    }
}
