//! Docstore is a minimal embedded document store.
//!
//! Records are arbitrary JSON values addressed by a `Collection -> Resource id`
//! hierarchy. Each record lives in its own pretty-printed `.json` file under
//! `<root>/<collection>/`, and every write is committed atomically with a
//! "write-then-rename" strategy.
//!
//! ## Core Components
//! - [`engine`]: The storage backends (single-node [`engine::Driver`] and the
//!   simulated multi-node [`engine::ReplicatedDriver`]), the atomic writer,
//!   the collection lock registry and the query evaluator.
//! - [`server`]: TCP daemon front end.
//! - [`sdk`]: Remote TCP client.

pub mod engine;
pub mod sdk;
pub mod server;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the store.
#[derive(Error, Debug)]
pub enum Error {
    /// A collection, resource id or node name was empty or otherwise unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The requested resource or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A stored file could not be decoded.
    #[error("corrupt record {path:?}: {source}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A comparison operator was applied to a non-numeric operand or field.
    #[error("type mismatch: operator {op} on field {field:?} requires numeric operands")]
    TypeMismatch { field: String, op: String },
    /// A regex search pattern failed to compile.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during persistence or network communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A filter maps field names to either a literal value or an operator object
/// such as `{"$gt": 30}`.
pub type Filter = Map<String, Value>;

/// Search results grouped by collection name.
pub type SearchHits = HashMap<String, Vec<String>>;

/// Defines read operations for the store.
pub trait RecordReader: Send + Sync {
    /// Retrieves the record stored under `collection`/`id`.
    fn read(&self, collection: &str, id: &str) -> Result<Value>;
    /// Returns every record in a collection, in directory enumeration order.
    fn read_all(&self, collection: &str) -> Result<Vec<Value>>;
}

/// Defines write and delete operations for the store.
pub trait RecordWriter: Send + Sync {
    /// Stores a record, replacing any previous value atomically.
    fn write(&self, collection: &str, id: &str, record: &Value) -> Result<()>;
    /// Deletes one record, or the whole collection when `id` is empty.
    fn delete(&self, collection: &str, id: &str) -> Result<()>;
    /// Deletes a collection and everything in it.
    fn delete_all(&self, collection: &str) -> Result<()>;
}

/// Full-scan query operations.
pub trait RecordSearcher: Send + Sync {
    /// Walks every collection and returns the ids of records matching `filter`.
    fn search(&self, filter: &Filter) -> Result<SearchHits>;
    /// Returns the records of one collection whose fields match every pattern.
    fn regex_search(&self, collection: &str, patterns: &HashMap<String, String>) -> Result<Vec<Value>>;
}

/// The primary interface for interacting with a document store.
///
/// It combines all functional traits for a complete storage experience.
pub trait DocumentStore: RecordReader + RecordWriter + RecordSearcher {
    /// Returns a [`CollectionScope`] that pins a collection name.
    fn collection(&self, name: &str) -> Box<dyn CollectionScope + '_>;
}

/// A simplified, scoped interface for a single collection.
pub trait CollectionScope: Send + Sync {
    /// Reads one record of this collection.
    fn read(&self, id: &str) -> Result<Value>;
    /// Reads every record of this collection.
    fn read_all(&self) -> Result<Vec<Value>>;
    /// Creates or replaces one record in this collection.
    fn write(&self, id: &str, record: &Value) -> Result<()>;
    /// Removes one record; an empty id removes the whole collection.
    fn delete(&self, id: &str) -> Result<()>;
    /// Removes this collection and all of its records.
    fn delete_all(&self) -> Result<()>;
    /// Records of this collection whose fields match every pattern.
    fn regex_search(&self, patterns: &HashMap<String, String>) -> Result<Vec<Value>>;
}

/// Scope implementation shared by every [`DocumentStore`].
pub struct StoreScope<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    collection: String,
}

impl<'a, S: DocumentStore + ?Sized> StoreScope<'a, S> {
    pub fn new(store: &'a S, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }
}

impl<'a, S: DocumentStore + ?Sized> CollectionScope for StoreScope<'a, S> {
    fn read(&self, id: &str) -> Result<Value> {
        self.store.read(&self.collection, id)
    }

    fn read_all(&self) -> Result<Vec<Value>> {
        self.store.read_all(&self.collection)
    }

    fn write(&self, id: &str, record: &Value) -> Result<()> {
        self.store.write(&self.collection, id, record)
    }

    fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("missing resource id".to_string()));
        }
        self.store.delete(&self.collection, id)
    }

    fn delete_all(&self) -> Result<()> {
        self.store.delete_all(&self.collection)
    }

    fn regex_search(&self, patterns: &HashMap<String, String>) -> Result<Vec<Value>> {
        self.store.regex_search(&self.collection, patterns)
    }
}

/// Typed helpers available on every store.
pub trait StoreExt: DocumentStore {
    /// Reads a record and deserializes it into `T`.
    fn read_as<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T> {
        let val = self.read(collection, id)?;
        Ok(serde_json::from_value(val)?)
    }

    /// Serializes `value` and writes it as a record.
    fn write_from<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        let val = serde_json::to_value(value)?;
        self.write(collection, id, &val)
    }
}

impl<S: DocumentStore + ?Sized> StoreExt for S {}
