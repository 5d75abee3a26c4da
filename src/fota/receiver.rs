//! Chunk reception and persistence.
//!
//! Checks run in a fixed order and the first failure wins; a rejected
//! chunk never touches the bitmap, and storage is only written after the
//! MAC has been verified:
//!
//! ```text
//! manifest? ─▶ fields? ─▶ index < total? ─▶ total matches? ─▶ duplicate?
//!                                                               │ no
//!      bitmap.insert ◀─ size check ◀─ write ◀─ decode ◀─ MAC ok?
//! ```
//!
//! Duplicates short-circuit before the MAC check and leave storage alone,
//! which makes transport-level retries harmless.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use core::fmt;
use log::{debug, info, warn};
use std::io::Write;

use super::auth;
use super::bitmap::ReceptionBitmap;
use super::files::{chunk_file_name, remove_if_present};
use super::manifest::Manifest;
use super::message::ChunkMessage;
use crate::app::ports::{BlockStore, StorageError};

// ── Outcome & error ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk verified and persisted; its bit is now set.
    Stored,
    /// Chunk was already received; nothing was re-verified or rewritten.
    DuplicateIgnored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkError {
    /// No validated manifest is active.
    NoUpdateInProgress,
    /// `data` or `mac` was empty.
    MissingField,
    OutOfRange { index: u16, total: u16 },
    /// The chunk claims a different `total_chunks` than the active manifest.
    ManifestMismatch { claimed: u16, expected: u16 },
    /// MAC verification failed.
    MacInvalid,
    /// `data` was not valid base64, or decoded to nothing.
    Malformed,
    /// Decoded chunk is longer than the manifest's `chunk_size`.
    Oversized { len: usize, max: u16 },
    /// Persisting the chunk failed; the chunk may be re-sent.
    StorageFailure(StorageError),
}

impl ChunkError {
    /// Whether re-sending the same chunk can succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoUpdateInProgress)
    }

    /// Authentication failures are reported apart from structural ones.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::MacInvalid)
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpdateInProgress => write!(f, "no update in progress"),
            Self::MissingField => write!(f, "chunk data or MAC missing"),
            Self::OutOfRange { index, total } => {
                write!(f, "chunk {index} out of range (total {total})")
            }
            Self::ManifestMismatch { claimed, expected } => write!(
                f,
                "chunk claims {claimed} total chunks, manifest has {expected}"
            ),
            Self::MacInvalid => write!(f, "chunk MAC verification failed"),
            Self::Malformed => write!(f, "chunk data is not valid base64"),
            Self::Oversized { len, max } => {
                write!(f, "chunk of {len} bytes exceeds chunk size {max}")
            }
            Self::StorageFailure(e) => write!(f, "chunk storage failed: {e}"),
        }
    }
}

impl std::error::Error for ChunkError {}

// ── Receiver ──────────────────────────────────────────────────

/// Applies one chunk to the store and bitmap of the active update.
pub struct ChunkReceiver<'a, S: BlockStore> {
    store: &'a mut S,
    bitmap: &'a mut ReceptionBitmap,
    psk: &'a [u8],
}

impl<'a, S: BlockStore> ChunkReceiver<'a, S> {
    pub fn new(store: &'a mut S, bitmap: &'a mut ReceptionBitmap, psk: &'a [u8]) -> Self {
        Self { store, bitmap, psk }
    }

    /// Accept `chunk` for `manifest` (or reject it without side effects).
    pub fn accept(
        &mut self,
        chunk: &ChunkMessage,
        manifest: Option<&Manifest>,
    ) -> Result<ChunkOutcome, ChunkError> {
        let Some(manifest) = manifest else {
            return Err(ChunkError::NoUpdateInProgress);
        };
        if chunk.data.is_empty() || chunk.mac.is_empty() {
            return Err(ChunkError::MissingField);
        }
        let total = manifest.total_chunks();
        if chunk.index >= total {
            return Err(ChunkError::OutOfRange {
                index: chunk.index,
                total,
            });
        }
        if chunk.total_chunks_claimed != total {
            return Err(ChunkError::ManifestMismatch {
                claimed: chunk.total_chunks_claimed,
                expected: total,
            });
        }

        if self.bitmap.contains(chunk.index) {
            info!("chunk {}: already received, skipping", chunk.index);
            return Ok(ChunkOutcome::DuplicateIgnored);
        }

        if !auth::verify_chunk(self.psk, &chunk.data, &chunk.mac) {
            warn!("chunk {}: MAC verification failed", chunk.index);
            return Err(ChunkError::MacInvalid);
        }

        let bytes = STANDARD
            .decode(chunk.data.as_bytes())
            .map_err(|_| ChunkError::Malformed)?;
        if bytes.is_empty() {
            return Err(ChunkError::Malformed);
        }
        if bytes.len() > usize::from(manifest.chunk_size()) {
            return Err(ChunkError::Oversized {
                len: bytes.len(),
                max: manifest.chunk_size(),
            });
        }

        self.persist(chunk.index, &bytes)?;
        self.bitmap.insert(chunk.index);
        debug!(
            "chunk {}: stored {} bytes ({}/{})",
            chunk.index,
            bytes.len(),
            self.bitmap.count(),
            total
        );
        Ok(ChunkOutcome::Stored)
    }

    /// Write the chunk file and confirm its size; remove it on any failure.
    fn persist(&mut self, index: u16, bytes: &[u8]) -> Result<(), ChunkError> {
        let name = chunk_file_name(index);
        let result = self.write_and_verify(&name, bytes);
        if let Err(e) = result {
            warn!("chunk {index}: storage failed: {e}");
            let _ = remove_if_present(self.store, &name);
        }
        result.map_err(ChunkError::StorageFailure)
    }

    fn write_and_verify(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut writer = self.store.open_write(name)?;
        writer.write_all(bytes).map_err(|_| StorageError::IoError)?;
        writer.flush().map_err(|_| StorageError::IoError)?;
        drop(writer);

        let written = self.store.size(name)?;
        if written != bytes.len() as u64 {
            warn!(
                "{name}: size mismatch after write (expected {}, got {written})",
                bytes.len()
            );
            return Err(StorageError::IoError);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────
