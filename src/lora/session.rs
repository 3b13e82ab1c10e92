//! Session record and its persisted layout.
//!
//! Namespace `lora`:
//!
//! | Key | Type | Content |
//! |-----|------|---------|
//! | `count` | u32 | uplink counter (see [`UplinkCounter`](super::UplinkCounter)) |
//! | `netId` | u32 | network id |
//! | `devAddr` | u32 | device address |
//! | `nwkKey` | 16 B | network session key |
//! | `artKey` | 16 B | application session key |
//!
//! A session is only restored when both keys read back at full length.

use crate::persistence::{PersistenceError, PersistenceStore};
use log::{debug, error, info, warn};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// NVS namespace holding the session and counter.
pub const NAMESPACE: &str = "lora";

pub const KEY_COUNT: &str = "count";
pub const KEY_NET_ID: &str = "netId";
pub const KEY_DEV_ADDR: &str = "devAddr";
pub const KEY_NWK_KEY: &str = "nwkKey";
pub const KEY_ART_KEY: &str = "artKey";

/// Session key length in bytes.
pub const KEY_LEN: usize = 16;

/// An established LoRaWAN session.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    pub joined: bool,
    pub net_id: u32,
    pub dev_addr: u32,
    pub network_key: [u8; KEY_LEN],
    pub application_key: [u8; KEY_LEN],
}

impl Session {
    pub fn new(
        net_id: u32,
        dev_addr: u32,
        network_key: [u8; KEY_LEN],
        application_key: [u8; KEY_LEN],
    ) -> Self {
        Self {
            joined: true,
            net_id,
            dev_addr,
            network_key,
            application_key,
        }
    }

    /// Read the persisted session.
    ///
    /// Returns `None` when nothing is stored, the namespace cannot be opened,
    /// or either key is missing or short.
    pub fn load(store: &mut dyn PersistenceStore) -> Option<Self> {
        let ns = match store.open(NAMESPACE, true) {
            Ok(ns) => ns,
            Err(e) => {
                debug!("No persisted session: {}", e);
                return None;
            }
        };

        let net_id = ns.get_u32(KEY_NET_ID, u32::MAX);
        let dev_addr = ns.get_u32(KEY_DEV_ADDR, u32::MAX);
        let mut network_key = [0u8; KEY_LEN];
        let mut application_key = [0u8; KEY_LEN];
        let nwk_len = ns.get_bytes(KEY_NWK_KEY, &mut network_key);
        let art_len = ns.get_bytes(KEY_ART_KEY, &mut application_key);

        if nwk_len != KEY_LEN || art_len != KEY_LEN {
            debug!(
                "Persisted session incomplete (nwkKey {} B, artKey {} B)",
                nwk_len, art_len
            );
            network_key.zeroize();
            application_key.zeroize();
            return None;
        }

        info!(
            "Restored session: netId {:06X}, devAddr {:08X}",
            net_id, dev_addr
        );
        Some(Self::new(net_id, dev_addr, network_key, application_key))
    }

    /// Persist the session and read it back.
    ///
    /// Catches flash writes that fail silently. On error the next boot
    /// performs a full join.
    pub fn store(&self, store: &mut dyn PersistenceStore) -> Result<(), PersistenceError> {
        {
            let mut ns = store.open(NAMESPACE, false)?;
            ns.put_u32(KEY_NET_ID, self.net_id)?;
            ns.put_u32(KEY_DEV_ADDR, self.dev_addr)?;
            ns.put_bytes(KEY_NWK_KEY, &self.network_key)?;
            ns.put_bytes(KEY_ART_KEY, &self.application_key)?;
        }

        match Self::load(store) {
            Some(read_back) if read_back == *self => {
                info!("Session keys saved and verified");
                Ok(())
            }
            Some(_) => {
                error!("Session verification failed - data mismatch after save");
                Err(PersistenceError::Write {
                    key: NAMESPACE.to_string(),
                    reason: "read-back mismatch".to_string(),
                })
            }
            None => {
                error!("Session not found after save - possible flash failure");
                Err(PersistenceError::Write {
                    key: NAMESPACE.to_string(),
                    reason: "read-back missing".to_string(),
                })
            }
        }
    }

    /// Erase the whole `lora` namespace, counter included.
    pub fn erase(store: &mut dyn PersistenceStore) -> Result<(), PersistenceError> {
        let mut ns = store.open(NAMESPACE, false)?;
        ns.clear()?;
        warn!("Session erased - next join will be a full handshake");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("joined", &self.joined)
            .field("net_id", &format_args!("{:06X}", self.net_id))
            .field("dev_addr", &format_args!("{:08X}", self.dev_addr))
            .field("network_key", &"<redacted>")
            .field("application_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn sample_session() -> Session {
        Session::new(0x13, 0x260B_1234, [0x11; KEY_LEN], [0x22; KEY_LEN])
    }

    #[test]
    fn test_store_load_roundtrip() {
        let mut store = MemoryStore::new();
        let session = sample_session();
        session.store(&mut store).unwrap();

        let loaded = Session::load(&mut store).expect("session should load");
        assert_eq!(loaded, session);
        assert!(loaded.joined);
        assert_eq!(store.peek_u32(NAMESPACE, KEY_DEV_ADDR), Some(0x260B_1234));
    }

    #[test]
    fn test_load_empty_store() {
        let mut store = MemoryStore::new();
        assert!(Session::load(&mut store).is_none());
    }

    #[test]
    fn test_load_requires_both_keys() {
        let mut store = MemoryStore::new();
        {
            let mut ns = store.open(NAMESPACE, false).unwrap();
            ns.put_u32(KEY_NET_ID, 1).unwrap();
            ns.put_u32(KEY_DEV_ADDR, 2).unwrap();
            ns.put_bytes(KEY_NWK_KEY, &[1u8; KEY_LEN]).unwrap();
            ns.put_bytes(KEY_ART_KEY, &[2u8; 8]).unwrap();
        }
        assert!(Session::load(&mut store).is_none());
    }

    #[test]
    fn test_store_failure_reported() {
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(sample_session().store(&mut store).is_err());
        assert!(Session::load(&mut store).is_none());
    }

    #[test]
    fn test_erase_clears_counter_too() {
        let mut store = MemoryStore::new();
        sample_session().store(&mut store).unwrap();
        store
            .open(NAMESPACE, false)
            .unwrap()
            .put_u32(KEY_COUNT, 9)
            .unwrap();

        Session::erase(&mut store).unwrap();

        assert!(Session::load(&mut store).is_none());
        assert!(!store.contains(NAMESPACE, KEY_COUNT));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", sample_session());
        assert!(debug.contains("260B1234"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("17, 17"));
    }
}
