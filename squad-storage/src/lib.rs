//! Squad Storage - Document Store Trait, In-Memory and SQLite Stores
//!
//! Defines the persistent store adapter for squad records. Stores speak
//! JSON documents; `Collection<T>` turns them into validated records.
//! [`InMemoryStore`] backs tests, [`SqliteStore`] keeps records across
//! process restarts.

pub mod collection;
pub mod document_store;
pub mod filter;
pub mod memory;
pub mod sqlite;

pub use collection::{Collection, Collections, Record};
pub use document_store::{CollectionName, DocumentStore};
pub use filter::{Condition, Filter, FindOptions, SortKey, SortOrder, Update, UpdateOutcome};
pub use memory::{InMemoryStore, StoreStatistics};
pub use sqlite::SqliteStore;
