//! ESP-IDF NVS backend.
//!
//! Each [`PersistenceStore::open`] creates an `EspNvs` handle on the default
//! partition; the handle is closed when the returned namespace is dropped.

use super::{Namespace, PersistenceError, PersistenceStore};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use std::ffi::CString;

/// Store on the default NVS partition.
pub struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    /// Take the default partition. Must only be called once per boot.
    pub fn take() -> Result<Self, EspError> {
        Ok(Self {
            partition: EspDefaultNvsPartition::take()?,
        })
    }
}

impl PersistenceStore for NvsStore {
    fn open(
        &mut self,
        namespace: &str,
        read_only: bool,
    ) -> Result<Box<dyn Namespace + '_>, PersistenceError> {
        let nvs = EspNvs::new(self.partition.clone(), namespace, !read_only).map_err(|e| {
            PersistenceError::Open {
                namespace: namespace.to_string(),
                reason: format!("{:?}", e),
            }
        })?;
        Ok(Box::new(NvsNamespace {
            nvs,
            namespace: namespace.to_string(),
            read_only,
        }))
    }
}

struct NvsNamespace {
    nvs: EspNvs<NvsDefault>,
    namespace: String,
    read_only: bool,
}

fn write_error(key: &str, e: EspError) -> PersistenceError {
    PersistenceError::Write {
        key: key.to_string(),
        reason: format!("{:?}", e),
    }
}

impl Namespace for NvsNamespace {
    fn get_u32(&self, key: &str, default: u32) -> u32 {
        match self.nvs.get_u32(key) {
            Ok(Some(v)) => v,
            Ok(None) => default,
            Err(e) => {
                log::warn!("NVS read of '{}' failed: {:?}", key, e);
                default
            }
        }
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<usize, PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        self.nvs.set_u32(key, value).map_err(|e| write_error(key, e))?;
        Ok(4)
    }

    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> usize {
        match self.nvs.get_raw(key, buf) {
            Ok(Some(bytes)) => bytes.len(),
            Ok(None) => 0,
            Err(e) => {
                log::debug!("NVS read of '{}' failed: {:?}", key, e);
                0
            }
        }
    }

    fn put_bytes(&mut self, key: &str, data: &[u8]) -> Result<usize, PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        self.nvs.set_raw(key, data).map_err(|e| write_error(key, e))?;
        Ok(data.len())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        if self.read_only {
            return Err(PersistenceError::ReadOnly);
        }
        // EspNvs has no erase-all, so go through a second raw handle.
        let name = CString::new(self.namespace.as_str()).map_err(|_| PersistenceError::Open {
            namespace: self.namespace.clone(),
            reason: "interior nul".to_string(),
        })?;
        let err = unsafe {
            let mut handle: esp_idf_sys::nvs_handle_t = 0;
            let mut err = esp_idf_sys::nvs_open(
                name.as_ptr(),
                esp_idf_sys::nvs_open_mode_t_NVS_READWRITE,
                &mut handle,
            );
            if err == esp_idf_sys::ESP_OK {
                err = esp_idf_sys::nvs_erase_all(handle);
                if err == esp_idf_sys::ESP_OK {
                    err = esp_idf_sys::nvs_commit(handle);
                }
                esp_idf_sys::nvs_close(handle);
            }
            err
        };
        EspError::convert(err).map_err(|e| write_error("*", e))
    }
}
