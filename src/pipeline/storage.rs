//! Where captured images go.
//!
//! The pipeline decides an artifact's name; the store decides where it lives.

use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Errors that can occur in a store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact is empty: {0}")]
    Empty(String),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),
}

/// Storage collaborator for captured artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` under a new `name` and returns the artifact identifier.
    ///
    /// Never replaces an existing artifact.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Identifiers of stored artifacts, newest first.
    fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Stored size in bytes.
    fn size(&self, id: &str) -> Result<u64, StorageError>;

    fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Whether new artifacts can currently be stored.
    fn is_writable(&self) -> bool {
        true
    }
}

/// Stores artifacts as files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Uses `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of an artifact.
    pub fn path_of(&self, id: &str) -> Result<PathBuf, StorageError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(StorageError::InvalidName(id.to_string()));
        }
        Ok(self.root.join(id))
    }
}

impl ArtifactStore for DirectoryStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.path_of(name)?;
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(name.to_string())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries: Vec<(SystemTime, String)> = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            entries.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), name));
        }
        entries.sort_by(|a, b| b.cmp(a));
        Ok(entries.into_iter().map(|(_, name)| name).collect())
    }

    fn size(&self, id: &str) -> Result<u64, StorageError> {
        let path = self.path_of(id)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let path = self.path_of(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Tries to create a file in the directory.
    fn is_writable(&self) -> bool {
        let probe = self.root.join(".write_probe");
        let ok = fs::write(&probe, b"test").is_ok();
        let _ = fs::remove_file(&probe);
        ok
    }
}

/// Keeps artifacts in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a stored artifact.
    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.items
            .lock()
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        let mut items = self.items.lock();
        if items.iter().any(|(existing, _)| existing == name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        items.push((name.to_string(), bytes.to_vec()));
        Ok(name.to_string())
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .items
            .lock()
            .iter()
            .rev()
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn size(&self, id: &str) -> Result<u64, StorageError> {
        self.items
            .lock()
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, bytes)| bytes.len() as u64)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|(name, _)| name != id);
        if items.len() == before {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
