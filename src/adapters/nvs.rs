//! NVS (Non-Volatile Storage) adapter.
//!
//! Key/value store implementing [`StoragePort`], [`ConfigPort`] and
//! [`NonceLedger`] for the relay.
//!
//! # Layout
//!
//! | Namespace  | Key       | Value                              |
//! |------------|-----------|------------------------------------|
//! | `relayfw`  | `engcfg`  | `EngineConfig` as a postcard blob  |
//! | `security` | `nonce`   | last issued nonce, little-endian u32 |
//!
//! # Durability
//!
//! - Config validation: every field is checked before persistence.
//! - Nonce ledger: the advanced counter is written before it is returned,
//!   so a crash can skip a nonce but never reuse one.
//! - Namespace isolation: each subsystem uses its own namespace prefix.
//!
//! [`NvsAdapter::new`] keeps entries in memory only. [`NvsAdapter::open`]
//! mirrors them to a file: every write lands in a temp file that replaces
//! the old one, and only then is the in-memory map updated. A flash-backed
//! build swaps both for the platform NVS API behind the same traits.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::fs_store::map_io;
use crate::app::ports::{
    ConfigError, ConfigPort, LedgerError, NonceLedger, StorageError, StoragePort,
};
use crate::config::EngineConfig;

const CONFIG_NAMESPACE: &str = "relayfw";
const CONFIG_KEY: &str = "engcfg";

const SECURITY_NAMESPACE: &str = "security";
const NONCE_KEY: &str = "nonce";

const MAX_BLOB_SIZE: usize = 4000;

type Entries = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
pub struct NvsAdapter {
    store: RefCell<Entries>,
    /// File the entries are mirrored to; `None` for a RAM-only store.
    backing: Option<PathBuf>,
    /// When set, every write fails with `IoError` (simulated worn flash).
    read_only: Cell<bool>,
}

impl NvsAdapter {
    pub fn new() -> Self {
        info!("NvsAdapter: in-memory backend");
        Self::default()
    }

    /// Open a store mirrored to `path`, loading whatever a previous run
    /// left there. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries: Entries = match fs::read(&path) {
            Ok(bytes) => postcard::from_bytes(&bytes).map_err(|_| {
                warn!("NvsAdapter: {} is not a valid NVS image", path.display());
                StorageError::IoError
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(map_io(e)),
        };
        info!(
            "NvsAdapter: {} entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self {
            store: RefCell::new(entries),
            backing: Some(path),
            read_only: Cell::new(false),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    /// Make subsequent writes fail, or restore them.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Apply `update` to a copy of the entries, persist the copy, then
    /// install it. A failed flush leaves memory and disk unchanged.
    fn commit(&self, update: impl FnOnce(&mut Entries)) -> Result<(), StorageError> {
        if self.read_only.get() {
            return Err(StorageError::IoError);
        }
        let mut entries = self.store.borrow().clone();
        update(&mut entries);
        if let Some(path) = &self.backing {
            flush(path, &entries)?;
        }
        *self.store.borrow_mut() = entries;
        Ok(())
    }
}

fn flush(path: &Path, entries: &Entries) -> Result<(), StorageError> {
    let bytes = postcard::to_allocvec(entries).map_err(|_| StorageError::IoError)?;
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(map_io)?;
    file.write_all(&bytes)
        .and_then(|()| file.sync_all())
        .map_err(map_io)?;
    fs::rename(&tmp, path).map_err(|e| {
        warn!("NvsAdapter: replacing {} failed: {}", path.display(), e);
        map_io(e)
    })
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let composite = Self::composite_key(namespace, key);
        match self.store.borrow().get(&composite) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let composite = Self::composite_key(namespace, key);
        self.commit(|entries| {
            entries.insert(composite, data.to_vec());
        })
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let composite = Self::composite_key(namespace, key);
        self.commit(|entries| {
            entries.remove(&composite);
        })
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        let composite = Self::composite_key(namespace, key);
        self.store.borrow().contains_key(&composite)
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<EngineConfig, ConfigError> {
        let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
        let store = self.store.borrow();
        let Some(bytes) = store.get(&key) else {
            info!("NvsAdapter: no stored engine config");
            return Err(ConfigError::NotFound);
        };
        let cfg: EngineConfig = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate().map_err(|e| {
            warn!("NvsAdapter: stored config invalid: {}", e);
            ConfigError::Corrupted
        })?;
        info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&mut self, config: &EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|_| ConfigError::IoError)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl NonceLedger for NvsAdapter {
    fn current(&self) -> u32 {
        let mut buf = [0u8; 4];
        match self.read(SECURITY_NAMESPACE, NONCE_KEY, &mut buf) {
            Ok(4) => u32::from_le_bytes(buf),
            _ => 0,
        }
    }

    fn next_nonce(&mut self) -> Result<u32, LedgerError> {
        let next = self.current().checked_add(1).ok_or(LedgerError::Exhausted)?;
        self.write(SECURITY_NAMESPACE, NONCE_KEY, &next.to_le_bytes())
            .inspect_err(|e| warn!("NvsAdapter: nonce {} not persisted: {}", next, e))?;
        debug!("NvsAdapter: nonce advanced to {}", next);
        Ok(next)
    }
}
