//! NVS (non-volatile storage) adapter.
//!
//! Implements [`StoragePort`] for the controller. All keys live in a
//! single `brewctl` namespace; keys are capped at 15 characters by
//! the underlying store.
//!
//! ## Dual-target design
//!
//! On ESP-IDF this wraps the raw `nvs_*` API (blob get/set with
//! commit-per-write, which the IDF guarantees to be atomic). On the
//! host it is an in-memory map, which makes persistence tests and the
//! simulation binary trivial.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::StoragePort;
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;
#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "brewctl";

/// Values above this size are rejected rather than written.
const MAX_BLOB_SIZE: usize = 16 * 1024;

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl NvsStore {
    /// Create the store and initialise the flash partition.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the
            // single main-task context before any concurrent access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStore: in-memory backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: Mutex::new(HashMap::new()),
        })
    }

    /// Open the namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns = NAMESPACE.as_bytes();
        ns_buf[..ns.len()].copy_from_slice(ns);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = key.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }
}

impl StoragePort for NvsStore {
    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.store
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let key_buf = Self::key_buf(key);
        let result = Self::with_handle(false, |handle| {
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        });

        match result {
            Ok(buf) => Ok(buf),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let key_buf = Self::key_buf(key);
        let result = Self::with_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NVS write error {e}");
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key_buf = Self::key_buf(key);
        let result = Self::with_handle(true, |handle| {
            let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn exists(&self, key: &str) -> bool {
        self.store.lock().unwrap().contains_key(key)
    }

    #[cfg(target_os = "espidf")]
    fn exists(&self, key: &str) -> bool {
        let key_buf = Self::key_buf(key);
        Self::with_handle(false, |handle| {
            let ret =
                unsafe { nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut()) };
            Ok(ret == ESP_OK)
        })
        .unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn erase_all(&self) -> Result<(), StorageError> {
        self.store.lock().unwrap().clear();
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn erase_all(&self) -> Result<(), StorageError> {
        let result = Self::with_handle(true, |handle| {
            let ret = unsafe { nvs_erase_all(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|_| StorageError::IoError)
    }
}
