//! Best-effort local persistence of annotations
//!
//! The layout is a single JSON value stored under a well-known key:
//! `{ "<file key>": { "highlights": [...], "comments": [...], ... } }`.
//! Backends only need string get/set, which keeps browser `localStorage`
//! and a plain directory of JSON files interchangeable.

use crate::annotation::{AnnotationSet, FileKey};
use crate::error::{AnnotatorError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

/// Default key the annotation map is stored under
pub const DEFAULT_STORAGE_KEY: &str = "pdfAnnotations";

/// Minimal string key-value store
pub trait PersistenceBackend {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Volatile backend; the default when the host provides none
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    root: PathBuf,
}

impl JsonDirBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", file_name))
    }
}

impl PersistenceBackend for JsonDirBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| AnnotatorError::PersistenceError(format!("{}: {}", path.display(), e)))
    }

    fn save(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| AnnotatorError::PersistenceError(e.to_string()))?;
        let path = self.path_for(key);
        fs::write(&path, value)
            .map_err(|e| AnnotatorError::PersistenceError(format!("{}: {}", path.display(), e)))
    }
}

type FileMap = BTreeMap<FileKey, AnnotationSet>;

fn read_map(backend: &dyn PersistenceBackend, storage_key: &str) -> Result<FileMap> {
    match backend.load(storage_key)? {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| AnnotatorError::SerializationError(e.to_string())),
        None => Ok(FileMap::new()),
    }
}

/// Read the annotation set persisted for one file
pub fn load_file(
    backend: &dyn PersistenceBackend,
    storage_key: &str,
    file: &FileKey,
) -> Result<AnnotationSet> {
    let mut map = read_map(backend, storage_key)?;
    Ok(map.remove(file).unwrap_or_default())
}

/// Replace the annotation set persisted for one file, keeping other files
pub fn save_file(
    backend: &mut dyn PersistenceBackend,
    storage_key: &str,
    file: &FileKey,
    set: &AnnotationSet,
) -> Result<()> {
    // An unreadable map is replaced rather than blocking every later write
    let mut map = read_map(backend, storage_key).unwrap_or_else(|e| {
        tracing::warn!("Discarding unreadable annotation map '{}': {}", storage_key, e);
        FileMap::new()
    });
    if set.is_empty() {
        map.remove(file);
    } else {
        map.insert(file.clone(), set.clone());
    }
    let json =
        serde_json::to_string(&map).map_err(|e| AnnotatorError::SerializationError(e.to_string()))?;
    backend.save(storage_key, &json)
}
