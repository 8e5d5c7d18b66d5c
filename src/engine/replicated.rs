use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use log::{debug, error, warn};
use crate::engine::locks::{hold, LockRegistry};
use crate::engine::persistence::{encode_record, load_record, write_atomic};
use crate::engine::query::{matches_filter, FieldPatterns};
use crate::engine::scan::{load_with_policy, record_files, require, resolve_record, stem};
use crate::engine::{Options, Placement, ScanPolicy};
use crate::{
    Result, Error, Filter, SearchHits, RecordReader, RecordWriter, RecordSearcher, DocumentStore,
    CollectionScope, StoreScope,
};

/// Document store that simulates placement across several nodes.
///
/// Nodes are plain labels: each one is a subdirectory, so a record lives at
/// `<dir>/<collection>/<node>/<id>.json`. A write picks a primary node at
/// random, commits there first and then, under [`Placement::Replicate`],
/// copies the same bytes to every other node. Reads walk the node list in
/// its configured order and return the first copy found.
pub struct ReplicatedDriver {
    dir: PathBuf,
    nodes: Vec<String>,
    options: Options,
    locks: LockRegistry,
    rng: Mutex<StdRng>,
}

impl ReplicatedDriver {
    pub fn new<P: AsRef<Path>>(dir: P, nodes: Vec<String>, options: Options) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::InvalidArgument("node list is empty".to_string()));
        }
        for node in &nodes {
            require(node, "node name")?;
        }

        let dir: PathBuf = dir.as_ref().components().collect();
        if !dir.exists() {
            debug!("Creating the database at {:?}", dir);
            fs::create_dir_all(&dir)?;
        }

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            dir,
            nodes,
            options,
            locks: LockRegistry::new(),
            rng: Mutex::new(rng),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Index of the node that receives the next write first.
    fn pick_primary(&self) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_range(0..self.nodes.len())
    }

    fn node_dir(&self, collection: &str, node: &str) -> PathBuf {
        self.dir.join(collection).join(node)
    }

    /// Path of a record's copy on `node`.
    pub fn record_path(&self, collection: &str, node: &str, id: &str) -> PathBuf {
        self.node_dir(collection, node)
            .join(format!("{}.{}", id, self.options.extension))
    }
}

impl RecordReader for ReplicatedDriver {
    fn read(&self, collection: &str, id: &str) -> Result<Value> {
        require(collection, "collection")?;
        require(id, "resource id")?;

        for node in &self.nodes {
            let dir = self.node_dir(collection, node);
            if let Some(path) = resolve_record(&dir, id, &self.options.extension) {
                return load_record(&path);
            }
        }
        Err(Error::NotFound(format!("{}/{}", collection, id)))
    }

    fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        require(collection, "collection")?;

        // Other nodes may hold good copies, so a bad node or file is skipped
        // here whatever the bulk policy says.
        let mut records = Vec::new();
        for node in &self.nodes {
            let dir = self.node_dir(collection, node);
            if !dir.is_dir() {
                continue;
            }
            let files = match record_files(&dir, &self.options.extension) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Skipping unreadable node directory {:?}: {}", dir, e);
                    continue;
                }
            };
            for path in files {
                if let Some(record) = load_with_policy(&path, ScanPolicy::Skip)? {
                    records.push(record);
                }
            }
        }

        if records.is_empty() {
            return Err(Error::NotFound(format!("no records found in {}", collection)));
        }
        Ok(records)
    }
}

impl RecordWriter for ReplicatedDriver {
    fn write(&self, collection: &str, id: &str, record: &Value) -> Result<()> {
        require(collection, "collection - no place to save record")?;
        require(id, "resource id - unable to save record")?;

        let primary = self.pick_primary();
        let lock = self.locks.acquire(collection);
        let _guard = hold(&lock);

        let bytes = encode_record(record)?;
        debug!("Writing {}/{} on primary {}", collection, id, self.nodes[primary]);
        write_atomic(&self.record_path(collection, &self.nodes[primary], id), &bytes)?;

        for (i, node) in self.nodes.iter().enumerate() {
            if i == primary {
                continue;
            }
            let path = self.record_path(collection, node, id);
            match self.options.placement {
                Placement::Replicate => {
                    // Copies already written stay in place if a later node fails.
                    write_atomic(&path, &bytes).map_err(|e| {
                        error!("Replica write of {}/{} to {} failed: {}", collection, id, node, e);
                        e
                    })?;
                }
                Placement::Partition => {
                    if path.is_file() {
                        fs::remove_file(&path)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        require(collection, "collection")?;
        if id.is_empty() {
            return self.delete_all(collection);
        }

        require(id, "resource id")?;

        let lock = self.locks.acquire(collection);
        let _guard = hold(&lock);

        let mut found = false;
        for node in &self.nodes {
            let dir = self.node_dir(collection, node);
            if let Some(path) = resolve_record(&dir, id, &self.options.extension) {
                fs::remove_file(&path)?;
                found = true;
            }
        }

        if !found {
            return Err(Error::NotFound(format!("{}/{}", collection, id)));
        }
        Ok(())
    }

    fn delete_all(&self, collection: &str) -> Result<()> {
        require(collection, "collection")?;

        let lock = self.locks.acquire(collection);
        let _guard = hold(&lock);

        let coll_dir = self.dir.join(collection);
        if !coll_dir.exists() {
            return Err(Error::NotFound(format!("collection {}", collection)));
        }
        if !coll_dir.is_dir() {
            return Err(Error::InvalidArgument(format!("{:?} is not a directory", coll_dir)));
        }

        for node in &self.nodes {
            let dir = self.node_dir(collection, node);
            if dir.is_dir() {
                debug!("Deleting directory: {:?}", dir);
                fs::remove_dir_all(&dir)?;
            }
        }

        if fs::read_dir(&coll_dir)?.next().is_none() {
            fs::remove_dir(&coll_dir)?;
        }
        Ok(())
    }
}

impl RecordSearcher for ReplicatedDriver {
    fn search(&self, filter: &Filter) -> Result<SearchHits> {
        let _guard = self.locks.lock_store();

        let mut collections = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_dir() {
                collections.push(path);
            }
        }
        collections.sort();

        let mut results: SearchHits = HashMap::new();
        for coll_dir in collections {
            let Some(collection) = coll_dir.file_name().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let mut ids: Vec<String> = Vec::new();
            for node in &self.nodes {
                let dir = coll_dir.join(node);
                if !dir.is_dir() {
                    continue;
                }
                for path in record_files(&dir, &self.options.extension)? {
                    let Some(record) = load_with_policy(&path, self.options.bulk_policy)? else {
                        continue;
                    };
                    if !matches_filter(&record, filter)? {
                        continue;
                    }
                    if let Some(id) = stem(&path) {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
            }

            if !ids.is_empty() {
                results.insert(collection, ids);
            }
        }
        Ok(results)
    }

    fn regex_search(&self, collection: &str, patterns: &HashMap<String, String>) -> Result<Vec<Value>> {
        require(collection, "collection - unable to search")?;
        let patterns = FieldPatterns::compile(patterns)?;

        if !self.dir.join(collection).is_dir() {
            return Err(Error::NotFound(format!("collection {}", collection)));
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for node in &self.nodes {
            let dir = self.node_dir(collection, node);
            if !dir.is_dir() {
                continue;
            }
            for path in record_files(&dir, &self.options.extension)? {
                let Some(id) = stem(&path) else { continue };
                if seen.contains(&id) {
                    continue;
                }
                if let Some(record) = load_with_policy(&path, self.options.regex_policy)? {
                    seen.insert(id);
                    if patterns.matches(&record) {
                        records.push(record);
                    }
                }
            }
        }
        Ok(records)
    }
}

impl DocumentStore for ReplicatedDriver {
    fn collection(&self, name: &str) -> Box<dyn CollectionScope + '_> {
        Box::new(StoreScope::new(self, name))
    }
}
