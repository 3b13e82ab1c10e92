//! In-memory persistence backend.
//!
//! Behaves like the NVS partition (read-only open of a missing namespace
//! fails, oversize blob reads return 0) and can be told to fail writes so
//! transient flash errors can be exercised without hardware.

use super::{Namespace, PersistenceError, PersistenceStore};
use std::collections::BTreeMap;

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(not(target_os = "espidf"), serde(rename_all = "snake_case"))]
pub(crate) enum Entry {
    U32(u32),
    Bytes(Vec<u8>),
}

pub(crate) type EntryMap = BTreeMap<String, Entry>;

pub(crate) fn read_u32(map: &EntryMap, key: &str, default: u32) -> u32 {
    match map.get(key) {
        Some(Entry::U32(v)) => *v,
        _ => default,
    }
}

pub(crate) fn read_bytes(map: &EntryMap, key: &str, buf: &mut [u8]) -> usize {
    match map.get(key) {
        Some(Entry::Bytes(data)) if data.len() <= buf.len() => {
            buf[..data.len()].copy_from_slice(data);
            data.len()
        }
        _ => 0,
    }
}

/// Volatile store, lost when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    namespaces: BTreeMap<String, EntryMap>,
    fail_writes: bool,
    fail_open: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until turned off again.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every subsequent open fail until turned off again.
    pub fn set_fail_open(&mut self, fail: bool) {
        self.fail_open = fail;
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Read a value without opening a handle.
    pub fn peek_u32(&self, namespace: &str, key: &str) -> Option<u32> {
        match self.namespaces.get(namespace)?.get(key)? {
            Entry::U32(v) => Some(*v),
            Entry::Bytes(_) => None,
        }
    }

    /// Whether `key` exists in `namespace`.
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|ns| ns.contains_key(key))
    }
}

impl PersistenceStore for MemoryStore {
    fn open(
        &mut self,
        namespace: &str,
        read_only: bool,
    ) -> Result<Box<dyn Namespace + '_>, PersistenceError> {
        if self.fail_open {
            return Err(PersistenceError::Open {
                namespace: namespace.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if read_only && !self.namespaces.contains_key(namespace) {
            return Err(PersistenceError::Open {
                namespace: namespace.to_string(),
                reason: "namespace not found".to_string(),
            });
        }
        self.namespaces.entry(namespace.to_string()).or_default();
        Ok(Box::new(MemoryNamespace {
            store: self,
            namespace: namespace.to_string(),
            read_only,
        }))
    }
}

struct MemoryNamespace<'a> {
    store: &'a mut MemoryStore,
    namespace: String,
    read_only: bool,
}

impl MemoryNamespace<'_> {
    fn entries(&self) -> Option<&EntryMap> {
        self.store.namespaces.get(&self.namespace)
    }

    fn write(&mut self, key: &str, entry: Entry) -> Result<usize, PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        if self.store.fail_writes {
            return Err(PersistenceError::Write {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let size = match &entry {
            Entry::U32(_) => 4,
            Entry::Bytes(data) => data.len(),
        };
        self.store
            .namespaces
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), entry);
        self.store.writes += 1;
        Ok(size)
    }
}

impl Namespace for MemoryNamespace<'_> {
    fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.entries()
            .map_or(default, |map| read_u32(map, key, default))
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<usize, PersistenceError> {
        self.write(key, Entry::U32(value))
    }

    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> usize {
        self.entries().map_or(0, |map| read_bytes(map, key, buf))
    }

    fn put_bytes(&mut self, key: &str, data: &[u8]) -> Result<usize, PersistenceError> {
        self.write(key, Entry::Bytes(data.to_vec()))
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        if self.store.fail_writes {
            return Err(PersistenceError::Write {
                key: "*".to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if let Some(map) = self.store.namespaces.get_mut(&self.namespace) {
            map.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_roundtrip() {
        let mut store = MemoryStore::new();
        {
            let mut ns = store.open("lora", false).unwrap();
            assert_eq!(ns.put_u32("count", 41).unwrap(), 4);
            assert_eq!(ns.get_u32("count", 0), 41);
        }
        let ns = store.open("lora", true).unwrap();
        assert_eq!(ns.get_u32("count", 0), 41);
        assert_eq!(ns.get_u32("missing", 7), 7);
    }

    #[test]
    fn test_read_only_open_of_missing_namespace_fails() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.open("lora", true),
            Err(PersistenceError::Open { .. })
        ));
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let mut store = MemoryStore::new();
        drop(store.open("lora", false).unwrap());
        let mut ns = store.open("lora", true).unwrap();
        assert!(matches!(ns.put_u32("count", 1), Err(PersistenceError::ReadOnly)));
        assert!(matches!(ns.clear(), Err(PersistenceError::ReadOnly)));
    }

    #[test]
    fn test_bytes_too_large_for_buffer() {
        let mut store = MemoryStore::new();
        let mut ns = store.open("lora", false).unwrap();
        ns.put_bytes("key", &[1, 2, 3, 4]).unwrap();

        let mut small = [0u8; 2];
        assert_eq!(ns.get_bytes("key", &mut small), 0);

        let mut exact = [0u8; 4];
        assert_eq!(ns.get_bytes("key", &mut exact), 4);
        assert_eq!(exact, [1, 2, 3, 4]);
    }

    #[test]
    fn test_type_mismatch_returns_default() {
        let mut store = MemoryStore::new();
        let mut ns = store.open("lora", false).unwrap();
        ns.put_bytes("count", &[1, 2]).unwrap();
        assert_eq!(ns.get_u32("count", 9), 9);
    }

    #[test]
    fn test_injected_write_failure() {
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        {
            let mut ns = store.open("lora", false).unwrap();
            assert!(ns.put_u32("count", 1).is_err());
        }
        assert_eq!(store.write_count(), 0);
        assert!(!store.contains("lora", "count"));
    }

    #[test]
    fn test_clear_only_touches_namespace() {
        let mut store = MemoryStore::new();
        store.open("lora", false).unwrap().put_u32("count", 1).unwrap();
        store.open("other", false).unwrap().put_u32("x", 2).unwrap();

        store.open("lora", false).unwrap().clear().unwrap();

        assert_eq!(store.peek_u32("lora", "count"), None);
        assert_eq!(store.peek_u32("other", "x"), Some(2));
    }
}
