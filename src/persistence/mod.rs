//! Non-volatile key-value persistence.
//!
//! The node's only durability mechanism. Storage is split into namespaces;
//! every access goes through a scoped handle obtained from
//! [`PersistenceStore::open`] and closed when the handle is dropped, so a
//! write can never be left half-open across a sleep.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process map with write-failure injection (tests, simulation)
//! - [`FileStore`] - JSON file under `~/.tbeam-node/` (host only)
//! - [`NvsStore`] - ESP-IDF NVS partition (ESP32 only)
//!
//! Callers treat a failed `open` as "nothing stored" and fall back to
//! defaults instead of failing the boot.

#[cfg(not(target_os = "espidf"))]
mod file;
mod memory;
#[cfg(feature = "esp32")]
mod nvs;

#[cfg(not(target_os = "espidf"))]
pub use file::{default_store_path, FileStore};
pub use memory::MemoryStore;
#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

use std::fmt;

/// An open namespace. Dropping the handle closes it.
pub trait Namespace {
    /// Read an unsigned value, or `default` if absent or of another type.
    fn get_u32(&self, key: &str, default: u32) -> u32;

    /// Store an unsigned value. Returns the number of bytes written.
    fn put_u32(&mut self, key: &str, value: u32) -> Result<usize, PersistenceError>;

    /// Copy a blob into `buf`. Returns the number of bytes read, 0 if the key
    /// is absent or the blob does not fit.
    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> usize;

    /// Store a blob. Returns the number of bytes written.
    fn put_bytes(&mut self, key: &str, data: &[u8]) -> Result<usize, PersistenceError>;

    /// Remove every key of this namespace.
    fn clear(&mut self) -> Result<(), PersistenceError>;
}

/// Typed key-value storage that survives power loss.
pub trait PersistenceStore {
    /// Open `namespace`. Writes through a read-only handle fail.
    fn open(
        &mut self,
        namespace: &str,
        read_only: bool,
    ) -> Result<Box<dyn Namespace + '_>, PersistenceError>;
}

impl<T: PersistenceStore + ?Sized> PersistenceStore for &mut T {
    fn open(
        &mut self,
        namespace: &str,
        read_only: bool,
    ) -> Result<Box<dyn Namespace + '_>, PersistenceError> {
        (**self).open(namespace, read_only)
    }
}

/// Persistence errors.
#[derive(Debug)]
pub enum PersistenceError {
    /// The namespace could not be opened.
    Open { namespace: String, reason: String },
    /// Write attempted through a read-only handle.
    ReadOnly,
    /// The backend rejected a write.
    Write { key: String, reason: String },
    /// Filesystem error (host backend).
    Io(std::io::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { namespace, reason } => {
                write!(f, "cannot open namespace '{}': {}", namespace, reason)
            }
            Self::ReadOnly => write!(f, "namespace opened read-only"),
            Self::Write { key, reason } => write!(f, "cannot write '{}': {}", key, reason),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
