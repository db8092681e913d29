//! Radar object files and object stores.
//!
//! Objects are stored as JSON documents tagged with their kind. Reads go
//! through an [`ObjectStore`]: either straight from disk, or through a small
//! per-store cache so repeated fetches of the same file within one task do
//! not hit storage again.

use crate::constants::{DEFAULT_CACHE_CAPACITY, OBJECT_FILE_EXTENSION};
use crate::models::RadarObject;
use crate::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read a radar object file
pub fn read_object(path: &Path) -> Result<RadarObject> {
    let file = File::open(path)
        .map_err(|e| Error::io(format!("Failed to open {}", path.display()), e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::codec(path, e.to_string()))
}

/// Write a radar object file, replacing any existing file
pub fn write_object(path: &Path, object: &RadarObject) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::io(format!("Failed to create {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, object).map_err(|e| Error::codec(path, e.to_string()))?;
    writer
        .flush()
        .map_err(|e| Error::io(format!("Failed to write {}", path.display()), e))
}

/// Write an object to a uniquely named file in `dir`.
///
/// The file is removed again if writing fails part way.
pub fn write_temporary(dir: &Path, prefix: &str, object: &RadarObject) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(&format!(".{}", OBJECT_FILE_EXTENSION))
        .tempfile_in(dir)
        .map_err(|e| Error::io(format!("Failed to create temporary file in {}", dir.display()), e))?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer(&mut writer, object)
            .map_err(|e| Error::codec(dir, e.to_string()))?;
        writer
            .flush()
            .map_err(|e| Error::io("Failed to write temporary file", e))?;
    }

    let (_, path) = file
        .keep()
        .map_err(|e| Error::io("Failed to keep temporary file", e.error))?;
    debug!("Wrote temporary {} to {}", object.kind(), path.display());
    Ok(path)
}

/// Source of radar objects
pub trait ObjectStore: Send + Sync {
    fn open(&self, path: &Path) -> Result<RadarObject>;
}

/// Reads every object straight from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FileObjectStore;

impl ObjectStore for FileObjectStore {
    fn open(&self, path: &Path) -> Result<RadarObject> {
        read_object(path)
    }
}

/// Keeps the most recently inserted objects in memory
#[derive(Debug)]
pub struct CachingObjectStore {
    capacity: usize,
    cache: Mutex<IndexMap<PathBuf, RadarObject>>,
}

impl CachingObjectStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            cache: Mutex::new(IndexMap::new()),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl ObjectStore for CachingObjectStore {
    fn open(&self, path: &Path) -> Result<RadarObject> {
        if let Some(object) = self.cache.lock().get(path) {
            debug!("Cache hit for {}", path.display());
            return Ok(object.clone());
        }

        let object = read_object(path)?;
        let mut cache = self.cache.lock();
        if cache.len() >= self.capacity {
            cache.shift_remove_index(0);
        }
        cache.insert(path.to_path_buf(), object.clone());
        Ok(object)
    }
}

/// Which object store a task opens its inputs through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectStoreConfig {
    #[default]
    Direct,
    Cached { capacity: usize },
}

impl ObjectStoreConfig {
    pub fn cached() -> Self {
        Self::Cached {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Build a store owned by the caller
    pub fn open(&self) -> Box<dyn ObjectStore> {
        match self {
            Self::Direct => Box::new(FileObjectStore),
            Self::Cached { capacity } => Box::new(CachingObjectStore::new(*capacity)),
        }
    }
}
