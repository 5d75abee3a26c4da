//! Port traits: the hexagonal boundary between the update engine and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FotaController (domain)
//! ```
//!
//! Driven adapters (chunk storage, key/value storage, nonce ledger, event
//! sinks) implement these traits. The
//! [`FotaController`](crate::fota::controller::FotaController) consumes them
//! via generics, so the engine never touches a filesystem directly.
//!
//! ## Durability notes
//!
//! - **NonceLedger** implementations MUST persist the advanced counter
//!   before returning it.
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **BlockStore** is owned exclusively by the engine while an update is
//!   in progress; nothing else may touch chunk or image files.

use std::io::{Read, Write};

use crate::config::EngineConfig;

// ───────────────────────────────────────────────────────────────
// Block store (driven adapter: engine ↔ chunk/image files)
// ───────────────────────────────────────────────────────────────

/// Filesystem-shaped storage for chunk payloads and the assembled image.
///
/// Readers and writers are owned handles, so a chunk can be read while the
/// image is being written.
pub trait BlockStore {
    type Reader: Read;
    type Writer: Write;

    /// Check whether a file exists.
    fn exists(&self, name: &str) -> bool;

    /// Create (or truncate) a file and open it for writing.
    fn open_write(&mut self, name: &str) -> Result<Self::Writer, StorageError>;

    /// Open an existing file for reading from its start.
    fn open_read(&self, name: &str) -> Result<Self::Reader, StorageError>;

    /// Delete a file. Returns `Err(StorageError::NotFound)` if it is absent.
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    /// Size of a file in bytes.
    fn size(&self, name: &str) -> Result<u64, StorageError>;

    /// Names of all files starting with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ EEPROM / flash key-value)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the nonce counter, config blob, etc.
///
/// # Durability
///
/// - Write operations MUST be atomic; no partial writes on power loss.
/// - Keys are namespaced to prevent collisions between subsystems.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Nonce ledger (driven adapter: domain ↔ persisted anti-replay counter)
// ───────────────────────────────────────────────────────────────

/// Monotonic sequence-number source for device-originated envelopes.
///
/// Shared by every subsystem that sends authenticated messages. All writers
/// follow persist-then-send.
pub trait NonceLedger {
    /// Last issued value (0 if none).
    fn current(&self) -> u32;

    /// Advance the counter, durably save it, and return the new value.
    ///
    /// Never wraps: returns [`LedgerError::Exhausted`] at `u32::MAX`.
    fn next_nonce(&mut self) -> Result<u32, LedgerError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the engine configuration.
///
/// Implementations MUST validate values before persisting; invalid values
/// are rejected with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    fn load(&self) -> Result<EngineConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &EngineConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`FotaEvent`](super::events::FotaEvent)s
/// through this port.  Adapters decide where they go (serial log, status
/// uplink, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::FotaEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`BlockStore`] and [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file or key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`NonceLedger`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    /// The counter could not be persisted; no nonce was issued.
    Storage(StorageError),
    /// The counter reached `u32::MAX`.
    Exhausted,
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "nonce not persisted: {}", e),
            Self::Exhausted => write!(f, "nonce counter exhausted"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl std::error::Error for StorageError {}
impl std::error::Error for LedgerError {}
impl std::error::Error for ConfigError {}
