//! Mock adapters for integration tests.
//!
//! [`FlakyStore`] wraps a [`MemStore`] and injects storage faults on
//! demand; [`RecordingSink`] keeps every emitted event for assertions.

use std::io::{self, Cursor, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use relayfw::adapters::mem_store::{MemStore, MemWriter};
use relayfw::app::events::FotaEvent;
use relayfw::app::ports::{BlockStore, EventSink, StorageError};
use relayfw::config::{EngineConfig, PolicyLimits};
use relayfw::fota::auth::{self, SecureEnvelope};
use relayfw::fota::manifest::ManifestCandidate;
use relayfw::fota::message::{ChunkMessage, InboundMessage};

pub const PSK: &str = "integration-psk";

/// SHA-256 of `"0123456789"`.
pub const DIGITS_SHA256: &str = "84d89877f0d4041efb6bf91a16f0248f2fd573e6af05c19f96bedb9f882f7882";

// ── Fault-injecting store ─────────────────────────────────────

#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemStore,
    /// `open_write` fails with `Full`.
    pub fail_open_write: bool,
    /// Writes report success but drop the last byte.
    pub short_writes: bool,
    /// `open_read` fails with `IoError`.
    pub fail_reads: bool,
}

pub struct FlakyWriter {
    inner: MemWriter,
    short: bool,
}

impl Write for FlakyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.short && buf.len() > 1 {
            self.inner.write_all(&buf[..buf.len() - 1])?;
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl BlockStore for FlakyStore {
    type Reader = Cursor<Vec<u8>>;
    type Writer = FlakyWriter;

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn open_write(&mut self, name: &str) -> Result<FlakyWriter, StorageError> {
        if self.fail_open_write {
            return Err(StorageError::Full);
        }
        Ok(FlakyWriter {
            inner: self.inner.open_write(name)?,
            short: self.short_writes,
        })
    }

    fn open_read(&self, name: &str) -> Result<Self::Reader, StorageError> {
        if self.fail_reads {
            return Err(StorageError::IoError);
        }
        self.inner.open_read(name)
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.inner.remove(name)
    }

    fn size(&self, name: &str) -> Result<u64, StorageError> {
        self.inner.size(name)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix)
    }
}

// ── Recording event sink ──────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<FotaEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&FotaEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &FotaEvent) {
        self.events.push(event.clone());
    }
}

// ── Message builders ──────────────────────────────────────────

pub fn config(auto_assemble: bool) -> EngineConfig {
    EngineConfig::new(PSK, "1.0.0")
        .unwrap()
        .with_limits(PolicyLimits {
            min_chunk_size: 1,
            ..Default::default()
        })
        .with_auto_assemble(auto_assemble)
}

pub fn digits_manifest() -> ManifestCandidate {
    ManifestCandidate {
        version: "2.0.0".into(),
        size: 10,
        hash: DIGITS_SHA256.into(),
        chunk_size: 5,
        total_chunks: 2,
    }
}

pub fn chunk(index: u16, data: &[u8], total_chunks: u16) -> ChunkMessage {
    let data = STANDARD.encode(data);
    ChunkMessage {
        index,
        mac: auth::sign(PSK.as_bytes(), auth::CHUNK_MAC_SEQUENCE, &data),
        data,
        total_chunks_claimed: total_chunks,
    }
}

/// Wrap a message the way the cloud does.
pub fn envelope(nonce: u32, msg: &InboundMessage) -> SecureEnvelope {
    auth::wrap(PSK.as_bytes(), nonce, &msg.to_json())
}
