//! File-backed persistence for host (development) builds.
//!
//! Keeps every namespace in a single JSON document, `~/.tbeam-node/nvs.json`
//! by default, so a simulated node keeps its session and uplink counter
//! across runs. Each write rewrites the whole document.

use super::memory::{read_bytes, read_u32, Entry, EntryMap};
use super::{Namespace, PersistenceError, PersistenceStore};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default store path.
///
/// Returns `~/.tbeam-node/nvs.json`
pub fn default_store_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".tbeam-node").join("nvs.json"))
}

/// Persistent store backed by a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    namespaces: BTreeMap<String, EntryMap>,
}

impl FileStore {
    /// Open the store at the default path.
    pub fn open_default() -> Result<Self, PersistenceError> {
        Self::at(default_store_path()?)
    }

    /// Open the store at `path`. A missing file is an empty store; an
    /// unparseable one is logged and treated as empty.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let namespaces = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("Ignoring corrupt store {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store file at {:?}", path);
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, namespaces })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `namespaces` to disk, then adopt it as the store contents.
    ///
    /// On failure the in-memory contents are left as they were.
    fn commit(&mut self, namespaces: BTreeMap<String, EntryMap>) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&namespaces)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        self.namespaces = namespaces;
        Ok(())
    }
}

impl PersistenceStore for FileStore {
    fn open(
        &mut self,
        namespace: &str,
        read_only: bool,
    ) -> Result<Box<dyn Namespace + '_>, PersistenceError> {
        if read_only && !self.namespaces.contains_key(namespace) {
            return Err(PersistenceError::Open {
                namespace: namespace.to_string(),
                reason: "namespace not found".to_string(),
            });
        }
        Ok(Box::new(FileNamespace {
            store: self,
            namespace: namespace.to_string(),
            read_only,
        }))
    }
}

struct FileNamespace<'a> {
    store: &'a mut FileStore,
    namespace: String,
    read_only: bool,
}

impl FileNamespace<'_> {
    fn entries(&self) -> Option<&EntryMap> {
        self.store.namespaces.get(&self.namespace)
    }

    fn write(&mut self, key: &str, entry: Entry) -> Result<(), PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        let mut namespaces = self.store.namespaces.clone();
        namespaces
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), entry);
        self.store.commit(namespaces).map_err(|e| PersistenceError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Namespace for FileNamespace<'_> {
    fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.entries()
            .map_or(default, |map| read_u32(map, key, default))
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<usize, PersistenceError> {
        self.write(key, Entry::U32(value))?;
        Ok(4)
    }

    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> usize {
        self.entries().map_or(0, |map| read_bytes(map, key, buf))
    }

    fn put_bytes(&mut self, key: &str, data: &[u8]) -> Result<usize, PersistenceError> {
        self.write(key, Entry::Bytes(data.to_vec()))?;
        Ok(data.len())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        if !self.store.namespaces.contains_key(&self.namespace) {
            return Ok(());
        }
        let mut namespaces = self.store.namespaces.clone();
        namespaces.remove(&self.namespace);
        self.store.commit(namespaces)
    }
}
