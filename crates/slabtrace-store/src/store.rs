//! Named dataset storage.
//!
//! A [`DatasetStore`] maps slash-separated names (`"tracers/state/40"`)
//! to encoded datasets. [`MemoryStore`] keeps them in insertion order;
//! [`DirectoryStore`] writes one file per dataset under a root directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, trace};

use slabtrace_core::Real;

use crate::codec;
use crate::error::StoreError;

/// File extension used by [`DirectoryStore`].
pub const DATASET_EXTENSION: &str = "slbt";

/// Storage for encoded datasets addressed by name.
pub trait DatasetStore {
    /// Store `bytes` under `name`, replacing any previous dataset.
    fn put(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Fetch the dataset stored under `name`.
    fn get(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Whether a dataset is stored under `name`.
    fn contains(&self, name: &str) -> Result<bool, StoreError>;

    /// All stored names.
    fn names(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject empty names and segments that are empty, `.`, `..`, or hold
/// characters outside `[A-Za-z0-9_.-]`.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name.split('/').all(|seg| {
            !seg.is_empty()
                && seg != "."
                && seg != ".."
                && seg
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
        });
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Encode `values` and store them under `name`.
pub fn put_reals<S: DatasetStore + ?Sized, R: Real>(
    store: &mut S,
    name: &str,
    values: &[R],
) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    codec::encode_reals(&mut buf, values)?;
    store.put(name, buf)
}

/// Fetch and decode the reals stored under `name`.
pub fn get_reals<S: DatasetStore + ?Sized, R: Real>(
    store: &S,
    name: &str,
) -> Result<Vec<R>, StoreError> {
    let bytes = store.get(name)?;
    codec::decode_reals(&mut bytes.as_slice())
}

/// Encode `values` and store them under `name`.
pub fn put_u64s<S: DatasetStore + ?Sized>(
    store: &mut S,
    name: &str,
    values: &[u64],
) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    codec::encode_u64s(&mut buf, values)?;
    store.put(name, buf)
}

/// Fetch and decode the integers stored under `name`.
pub fn get_u64s<S: DatasetStore + ?Sized>(store: &S, name: &str) -> Result<Vec<u64>, StoreError> {
    let bytes = store.get(name)?;
    codec::decode_u64s(&mut bytes.as_slice())
}

// ── MemoryStore ────────────────────────────────────────────────────

/// In-memory store; [`names`](DatasetStore::names) follows insertion order.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    datasets: IndexMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored datasets.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DatasetStore for MemoryStore {
    fn put(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        validate_name(name)?;
        trace!(name, bytes = bytes.len(), "dataset stored");
        self.datasets.insert(name.to_string(), bytes);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        self.datasets
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    fn contains(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        Ok(self.datasets.contains_key(name))
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.datasets.keys().cloned().collect())
    }
}

// ── DirectoryStore ─────────────────────────────────────────────────

/// One file per dataset: `a/b/c` is stored at `<root>/a/b/c.slbt`.
///
/// Writes go to a temporary sibling first and are renamed into place,
/// so a reader never sees a partial dataset.
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "directory store opened");
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        let mut path = self.root.clone();
        path.extend(name.split('/'));
        let mut file = path.into_os_string();
        file.push(".");
        file.push(DATASET_EXTENSION);
        Ok(PathBuf::from(file))
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), StoreError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(stem) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if entry.file_type()?.is_dir() {
                self.collect(&path, &format!("{prefix}{stem}/"), out)?;
            } else if let Some(base) = stem
                .strip_suffix(DATASET_EXTENSION)
                .and_then(|s| s.strip_suffix('.'))
            {
                out.push(format!("{prefix}{base}"));
            }
        }
        Ok(())
    }
}

impl DatasetStore for DirectoryStore {
    fn put(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        trace!(name, bytes = bytes.len(), "dataset written");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                name: name.to_string(),
            },
            _ => StoreError::Io(e),
        })
    }

    fn contains(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(name)?.is_file())
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        self.collect(&self.root, "", &mut out)?;
        out.sort();
        Ok(out)
    }
}
