use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use serde_json::Value;
use log::debug;
use crate::engine::locks::{hold, LockRegistry};
use crate::engine::persistence::{encode_record, load_record, write_atomic};
use crate::engine::query::{matches_filter, FieldPatterns};
use crate::engine::scan::{dir_name, load_with_policy, record_files, require, resolve_record, stem, walk_records};
use crate::engine::Options;
use crate::{
    Result, Error, Filter, SearchHits, RecordReader, RecordWriter, RecordSearcher, DocumentStore,
    CollectionScope, StoreScope,
};

/// Single-node document store.
///
/// Each record is stored at `<dir>/<collection>/<id>.json`. Mutations take a
/// per-collection lock from the driver's [`LockRegistry`]; reads take no lock
/// and rely on every file being replaced atomically.
pub struct Driver {
    dir: PathBuf,
    options: Options,
    locks: LockRegistry,
}

impl Driver {
    /// Opens (or creates) a store rooted at `dir`.
    pub fn new<P: AsRef<Path>>(dir: P, options: Options) -> Result<Self> {
        let dir: PathBuf = dir.as_ref().components().collect();
        if dir.exists() {
            debug!("Using {:?} (database already exists)", dir);
        } else {
            debug!("Creating the database at {:?}", dir);
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            options,
            locks: LockRegistry::new(),
        })
    }

    /// Opens a store with default [`Options`].
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::new(dir, Options::default())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.dir.join(collection)
    }

    /// Destination path of a record.
    pub fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.{}", id, self.options.extension))
    }
}

impl RecordReader for Driver {
    fn read(&self, collection: &str, id: &str) -> Result<Value> {
        require(collection, "collection")?;
        require(id, "resource id")?;

        let dir = self.collection_dir(collection);
        let path = resolve_record(&dir, id, &self.options.extension)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
        load_record(&path)
    }

    fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        require(collection, "collection")?;

        let dir = self.collection_dir(collection);
        debug!("Checking directory: {:?}", dir);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("collection {}", collection)));
        }

        let mut records = Vec::new();
        for path in record_files(&dir, &self.options.extension)? {
            if let Some(record) = load_with_policy(&path, self.options.bulk_policy)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl RecordWriter for Driver {
    fn write(&self, collection: &str, id: &str, record: &Value) -> Result<()> {
        require(collection, "collection - no place to save record")?;
        require(id, "resource id - unable to save record")?;

        let lock = self.locks.acquire(collection);
        let _guard = hold(&lock);

        let bytes = encode_record(record)?;
        write_atomic(&self.record_path(collection, id), &bytes)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        require(collection, "collection")?;

        let lock = self.locks.acquire(collection);
        let _guard = hold(&lock);

        let dir = self.collection_dir(collection);
        if id.is_empty() {
            if !dir.is_dir() {
                return Err(Error::NotFound(format!("collection {}", collection)));
            }
            debug!("Deleting directory: {:?}", dir);
            fs::remove_dir_all(&dir)?;
            return Ok(());
        }

        require(id, "resource id")?;
        let path = resolve_record(&dir, id, &self.options.extension)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, id)))?;
        fs::remove_file(&path)?;
        Ok(())
    }

    fn delete_all(&self, collection: &str) -> Result<()> {
        require(collection, "collection")?;

        let lock = self.locks.acquire(collection);
        let _guard = hold(&lock);

        let dir = self.collection_dir(collection);
        debug!("Checking directory: {:?}", dir);
        if !dir.exists() {
            return Err(Error::NotFound(format!("collection {}", collection)));
        }
        if !dir.is_dir() {
            return Err(Error::InvalidArgument(format!("{:?} is not a directory", dir)));
        }
        debug!("Deleting directory: {:?}", dir);
        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}

impl RecordSearcher for Driver {
    fn search(&self, filter: &Filter) -> Result<SearchHits> {
        let _guard = self.locks.lock_store();

        let mut files = Vec::new();
        walk_records(&self.dir, &self.options.extension, &mut files)?;

        let mut results: SearchHits = HashMap::new();
        for path in files {
            let Some(record) = load_with_policy(&path, self.options.bulk_policy)? else {
                continue;
            };
            if !matches_filter(&record, filter)? {
                continue;
            }
            let collection = path.parent().and_then(dir_name);
            if let (Some(collection), Some(id)) = (collection, stem(&path)) {
                results.entry(collection).or_default().push(id);
            }
        }
        Ok(results)
    }

    fn regex_search(&self, collection: &str, patterns: &HashMap<String, String>) -> Result<Vec<Value>> {
        require(collection, "collection - unable to search")?;
        let patterns = FieldPatterns::compile(patterns)?;

        let dir = self.collection_dir(collection);
        debug!("Checking directory: {:?}", dir);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("collection {}", collection)));
        }

        let mut records = Vec::new();
        for path in record_files(&dir, &self.options.extension)? {
            if let Some(record) = load_with_policy(&path, self.options.regex_policy)? {
                if patterns.matches(&record) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl DocumentStore for Driver {
    fn collection(&self, name: &str) -> Box<dyn CollectionScope + '_> {
        Box::new(StoreScope::new(self, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::persistence::stage;
    use crate::engine::ScanPolicy;
    use crate::StoreExt;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn filter(v: Value) -> Filter {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        let rec = json!({"name": "Alice", "age": 30, "address": {"city": "New York", "tags": [1, "a"]}});

        db.write("users", "alice", &rec).unwrap();
        assert_eq!(db.read("users", "alice").unwrap(), rec);
        assert_eq!(db.read("users", "alice.json").unwrap(), rec);
        assert!(dir.path().join("users").join("alice.json").exists());
    }

    #[test]
    fn test_empty_arguments_are_rejected() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        assert!(matches!(db.write("", "a", &json!(1)), Err(Error::InvalidArgument(_))));
        assert!(matches!(db.write("users", "", &json!(1)), Err(Error::InvalidArgument(_))));
        assert!(matches!(db.read("users", ""), Err(Error::InvalidArgument(_))));
        assert!(matches!(db.read_all(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_read_missing() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        assert!(matches!(db.read("users", "nobody"), Err(Error::NotFound(_))));
        assert!(matches!(db.read_all("users"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_corrupt_record_on_read() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("users")).unwrap();
        fs::write(dir.path().join("users").join("bad.json"), "{oops").unwrap();
        assert!(matches!(db.read("users", "bad"), Err(Error::CorruptRecord { .. })));
    }

    #[test]
    fn test_delete_twice_is_not_found() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "bob", &json!({"name": "Bob"})).unwrap();

        db.delete("users", "bob").unwrap();
        assert!(matches!(db.delete("users", "bob"), Err(Error::NotFound(_))));
        assert!(matches!(db.read("users", "bob"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_with_empty_id_removes_collection() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "bob", &json!({"name": "Bob"})).unwrap();

        db.delete("users", "").unwrap();
        assert!(!dir.path().join("users").exists());
        assert!(matches!(db.delete("users", ""), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_all() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "a", &json!({})).unwrap();
        db.write("users", "b", &json!({})).unwrap();

        db.delete_all("users").unwrap();
        assert!(matches!(db.read_all("users"), Err(Error::NotFound(_))));
        assert!(matches!(db.delete_all("users"), Err(Error::NotFound(_))));

        fs::write(dir.path().join("plain"), "x").unwrap();
        assert!(matches!(db.delete_all("plain"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_read_all_is_fail_fast_but_regex_search_skips() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "amy", &json!({"name": "Amy", "age": 31})).unwrap();
        db.write("users", "bob", &json!({"name": "Bob", "age": 25})).unwrap();
        fs::write(dir.path().join("users").join("broken.json"), "{\"name\": ").unwrap();

        assert!(matches!(db.read_all("users"), Err(Error::CorruptRecord { .. })));

        let mut q = HashMap::new();
        q.insert("name".to_string(), "^(A|B)".to_string());
        let hits = db.regex_search("users", &q).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_skip_policy_for_read_all() {
        let dir = tempdir().unwrap();
        let options = Options {
            bulk_policy: ScanPolicy::Skip,
            ..Options::default()
        };
        let db = Driver::new(dir.path(), options).unwrap();
        db.write("users", "amy", &json!({"name": "Amy"})).unwrap();
        fs::write(dir.path().join("users").join("broken.json"), "[").unwrap();

        assert_eq!(db.read_all("users").unwrap(), vec![json!({"name": "Amy"})]);
    }

    #[test]
    fn test_read_all_ignores_staged_temp_files() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "amy", &json!({"age": 31})).unwrap();

        // Interrupted write: the temp file exists but the rename never happened.
        stage(&db.record_path("users", "amy"), b"{\"age\": 3").unwrap();

        assert_eq!(db.read("users", "amy").unwrap(), json!({"age": 31}));
        assert_eq!(db.read_all("users").unwrap(), vec![json!({"age": 31})]);
    }

    #[test]
    fn test_search_groups_by_collection() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "bob", &json!({"name": "Bob", "age": 25})).unwrap();
        db.write("users", "amy", &json!({"name": "Amy", "age": 31})).unwrap();
        db.write("staff", "carl", &json!({"name": "Carl", "age": 40})).unwrap();

        let hits = db.search(&filter(json!({"age": {"$gt": 30}}))).unwrap();
        assert_eq!(hits.get("users").unwrap(), &vec!["amy".to_string()]);
        assert_eq!(hits.get("staff").unwrap(), &vec!["carl".to_string()]);

        let hits = db.search(&filter(json!({"name": "Bob"}))).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.get("users").unwrap(), &vec!["bob".to_string()]);

        let hits = db.search(&filter(json!({"age": {"$in": [25, 40]}}))).unwrap();
        assert_eq!(hits.get("users").unwrap(), &vec!["bob".to_string()]);
        assert_eq!(hits.get("staff").unwrap(), &vec!["carl".to_string()]);
    }

    #[test]
    fn test_search_aborts_on_malformed_and_type_mismatch() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        db.write("users", "bob", &json!({"age": "old"})).unwrap();
        assert!(matches!(
            db.search(&filter(json!({"age": {"$lt": 3}}))),
            Err(Error::TypeMismatch { .. })
        ));

        fs::write(dir.path().join("users").join("bad.json"), "nope").unwrap();
        assert!(matches!(
            db.search(&filter(json!({"name": "x"}))),
            Err(Error::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_regex_search_errors() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        let mut q = HashMap::new();
        q.insert("name".to_string(), "x".to_string());
        assert!(matches!(db.regex_search("users", &q), Err(Error::NotFound(_))));

        db.write("users", "a", &json!({"name": "x"})).unwrap();
        q.insert("name".to_string(), "[".to_string());
        assert!(matches!(db.regex_search("users", &q), Err(Error::Pattern(_))));
    }

    #[test]
    fn test_concurrent_writes_to_distinct_collections() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Driver::open(dir.path()).unwrap());

        // Holding one collection's lock must not stall writes to another.
        let users = db.locks().acquire("users");
        let _held = hold(&users);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                thread::spawn(move || db.write("orders", &format!("o{}", i), &json!({"n": i})))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(db.read_all("orders").unwrap().len(), 8);
    }

    #[test]
    fn test_concurrent_writes_same_collection_are_whole() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Driver::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                thread::spawn(move || db.write("users", "shared", &json!({"writer": i, "pad": "x".repeat(4096)})))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        let rec = db.read("users", "shared").unwrap();
        assert!(rec["writer"].as_u64().unwrap() < 8);
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn test_typed_helpers_and_scope() {
        let dir = tempdir().unwrap();
        let db = Driver::open(dir.path()).unwrap();
        let user = User { name: "Eve".to_string(), age: 32 };

        db.write_from("users", "eve", &user).unwrap();
        let got: User = db.read_as("users", "eve").unwrap();
        assert_eq!(got, user);

        let users = db.collection("users");
        users.write("dan", &json!({"name": "Dan", "age": 35})).unwrap();
        assert_eq!(users.read_all().unwrap().len(), 2);
        assert!(matches!(users.delete(""), Err(Error::InvalidArgument(_))));
        users.delete_all().unwrap();
        assert!(matches!(users.read("dan"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_names_cannot_escape_root() {
        let outer = tempdir().unwrap();
        let root = outer.path().join("data");
        let sibling = outer.path().join("sibling");
        fs::create_dir_all(&sibling).unwrap();
        let db = Driver::open(&root).unwrap();

        assert!(matches!(db.write("../escaped", "x", &json!({})), Err(Error::InvalidArgument(_))));
        assert!(matches!(db.write("users", "../x", &json!({})), Err(Error::InvalidArgument(_))));
        assert!(!outer.path().join("escaped").exists());

        for name in [".", "..", "../sibling", "a/b"] {
            assert!(matches!(db.delete_all(name), Err(Error::InvalidArgument(_))));
            assert!(matches!(db.delete(name, ""), Err(Error::InvalidArgument(_))));
            assert!(matches!(db.read_all(name), Err(Error::InvalidArgument(_))));
        }
        assert!(matches!(db.delete("users", "../../sibling"), Err(Error::InvalidArgument(_))));
        assert!(sibling.exists());
        assert!(root.exists());
    }
}
