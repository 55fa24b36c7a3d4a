//! In-memory document store.
//!
//! Backs tests and single-process deployments. Documents are kept as JSON
//! values per collection; writes are serialized by one lock and counted so
//! callers can assert that a code path never touched the store.

use crate::document_store::{CollectionName, DocumentStore};
use crate::filter::{get_path, set_path, Filter, FindOptions, SortKey, SortOrder, Update, UpdateOutcome};
use ::async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use squad_core::{SquadResult, StorageError};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Operation counters for an `InMemoryStore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub inserts: u64,
    pub updates: u64,
    pub reads: u64,
}

impl StoreStatistics {
    /// Inserts plus update calls, whether or not they matched.
    pub fn writes(&self) -> u64 {
        self.inserts + self.updates
    }
}

/// In-memory `DocumentStore`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<CollectionName, Vec<Value>>>,
    inserts: AtomicU64,
    updates: AtomicU64,
    reads: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statistics(&self) -> StoreStatistics {
        StoreStatistics {
            inserts: self.inserts.load(AtomicOrdering::SeqCst),
            updates: self.updates.load(AtomicOrdering::SeqCst),
            reads: self.reads.load(AtomicOrdering::SeqCst),
        }
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: CollectionName) -> usize {
        self.read().get(&collection).map_or(0, Vec::len)
    }

    /// Drop every document.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CollectionName, Vec<Value>>> {
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CollectionName, Vec<Value>>> {
        self.collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_unique(
        docs: &[Value],
        collection: CollectionName,
        doc: &Value,
        skip: Option<usize>,
    ) -> SquadResult<()> {
        let field = collection.key_field();
        let Some(key) = get_path(doc, field).filter(|k| !k.is_null()) else {
            return Err(StorageError::Backend {
                reason: format!("{} document missing key field {}", collection, field),
            }
            .into());
        };
        let clash = docs
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != skip && get_path(other, field) == Some(key));
        if clash {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                field: field.to_string(),
                key: key
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| key.to_string()),
            }
            .into());
        }
        Ok(())
    }

    fn apply_updates(
        docs: &mut [Value],
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
        first_only: bool,
    ) -> SquadResult<UpdateOutcome> {
        let mut outcome = UpdateOutcome::default();
        for i in 0..docs.len() {
            if !filter.matches(&docs[i]) {
                continue;
            }
            outcome.matched += 1;
            let mut candidate = docs[i].clone();
            if update.apply(&mut candidate) {
                Self::ensure_unique(docs, collection, &candidate, Some(i))?;
                docs[i] = candidate;
                outcome.modified += 1;
            }
            if first_only {
                break;
            }
        }
        Ok(outcome)
    }
}

/// Ordering used for sorts. RFC 3339 strings compare as instants so that
/// timestamps with different fractional precision still sort correctly.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(0.0);
                    let y = y.as_f64().unwrap_or(0.0);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.with_timezone(&Utc).cmp(&y.with_timezone(&Utc)),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

pub(crate) fn sort_documents(docs: &mut [Value], sort: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in sort {
            let ord = compare_values(get_path(a, &key.field), get_path(b, &key.field));
            let ord = match key.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_one(&self, collection: CollectionName, doc: Value) -> SquadResult<()> {
        self.inserts.fetch_add(1, AtomicOrdering::SeqCst);
        let mut collections = self.write();
        let docs = collections.entry(collection).or_default();
        Self::ensure_unique(docs, collection, &doc, None)?;
        docs.push(doc);
        debug!(collection = %collection, count = docs.len(), "Inserted document");
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
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let mut matched: Vec<Value> = {
            let collections = self.read();
            collections
                .get(&collection)
                .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
                .unwrap_or_default()
        };
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
        self.updates.fetch_add(1, AtomicOrdering::SeqCst);
        let mut collections = self.write();
        let docs = collections.entry(collection).or_default();
        Self::apply_updates(docs, collection, filter, update, true)
    }

    async fn update_many(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome> {
        self.updates.fetch_add(1, AtomicOrdering::SeqCst);
        let mut collections = self.write();
        let docs = collections.entry(collection).or_default();
        Self::apply_updates(docs, collection, filter, update, false)
    }

    async fn upsert(
        &self,
        collection: CollectionName,
        filter: &Filter,
        update: &Update,
    ) -> SquadResult<UpdateOutcome> {
        self.updates.fetch_add(1, AtomicOrdering::SeqCst);
        let mut collections = self.write();
        let docs = collections.entry(collection).or_default();
        let outcome = Self::apply_updates(docs, collection, filter, update, true)?;
        if outcome.matched > 0 {
            return Ok(outcome);
        }

        let mut doc = Value::Object(serde_json::Map::new());
        for (field, value) in filter.equalities() {
            set_path(&mut doc, field, value.clone());
        }
        update.apply(&mut doc);
        Self::ensure_unique(docs, collection, &doc, None)?;
        docs.push(doc);
        debug!(collection = %collection, "Upserted new document");
        Ok(UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted: true,
        })
    }
}
