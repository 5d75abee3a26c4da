//! Manifest validation and bounds checking.
//!
//! A manifest announces an image before any chunk is accepted:
//!
//! ```text
//! { "version": "2.0.0", "size": 10, "hash": "<64 hex>",
//!   "chunk_size": 5, "total_chunks": 2 }
//! ```
//!
//! [`validate`] turns a [`ManifestCandidate`] (fields as they arrived,
//! missing ones defaulted) into a [`Manifest`] or a [`ManifestError`].
//! Only a validated [`Manifest`] can be installed in the controller.

use core::fmt;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{PolicyLimits, VERSION_CAPACITY};

/// Hex length of a SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestError {
    /// A required field was absent, empty, or zero.
    MissingField(&'static str),
    SizeOutOfRange(u32),
    ChunkSizeOutOfRange(u16),
    TotalChunksOutOfRange(u16),
    /// `hash` is not a 64-character hex SHA-256 digest.
    InvalidHash,
    /// `size` disagrees with `chunk_size * total_chunks` by more than a chunk.
    InconsistentSize {
        size: u32,
        chunk_size: u16,
        total_chunks: u16,
    },
    VersionTooLong,
    /// The manifest names the firmware already running.
    SameVersion,
}

impl ManifestError {
    /// `true` for rejections that mean "nothing to do" rather than a fault.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::SameVersion)
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "manifest field '{name}' missing or empty"),
            Self::SizeOutOfRange(size) => write!(f, "firmware size {size} out of range"),
            Self::ChunkSizeOutOfRange(cs) => write!(f, "chunk size {cs} out of range"),
            Self::TotalChunksOutOfRange(n) => write!(f, "total chunks {n} out of range"),
            Self::InvalidHash => write!(f, "hash must be 64 hex characters (SHA-256)"),
            Self::InconsistentSize {
                size,
                chunk_size,
                total_chunks,
            } => write!(
                f,
                "size {size} inconsistent with {total_chunks} chunks of {chunk_size} bytes"
            ),
            Self::VersionTooLong => write!(f, "version string too long"),
            Self::SameVersion => write!(f, "manifest names the running firmware version"),
        }
    }
}

impl std::error::Error for ManifestError {}

// ── Candidate & validated manifest ────────────────────────────

/// Manifest fields as received. Absent fields default to empty/zero;
/// numbers too large for their field saturate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestCandidate {
    pub version: String,
    #[serde(deserialize_with = "super::message::saturating_u32")]
    pub size: u32,
    pub hash: String,
    #[serde(deserialize_with = "super::message::saturating_u16")]
    pub chunk_size: u16,
    #[serde(deserialize_with = "super::message::saturating_u16")]
    pub total_chunks: u16,
}

/// A manifest that passed [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    version: heapless::String<VERSION_CAPACITY>,
    size: u32,
    hash: heapless::String<HASH_HEX_LEN>,
    chunk_size: u16,
    total_chunks: u16,
}

impl Manifest {
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Image size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Expected SHA-256 as hex, case as received.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u16 {
        self.total_chunks
    }
}

/// Check `candidate` against `limits` and the running firmware version.
pub fn validate(
    candidate: &ManifestCandidate,
    limits: &PolicyLimits,
    current_version: &str,
) -> Result<Manifest, ManifestError> {
    let result = check(candidate, limits, current_version);
    match &result {
        Ok(m) => info!(
            "manifest: accepted v{} ({} bytes, {} x {} byte chunks)",
            m.version, m.size, m.total_chunks, m.chunk_size
        ),
        Err(e) if e.is_noop() => info!("manifest: v{} already running", candidate.version),
        Err(e) => warn!("manifest: rejected: {e}"),
    }
    result
}

fn check(
    c: &ManifestCandidate,
    limits: &PolicyLimits,
    current_version: &str,
) -> Result<Manifest, ManifestError> {
    if c.version.is_empty() {
        return Err(ManifestError::MissingField("version"));
    }
    if c.size == 0 {
        return Err(ManifestError::MissingField("size"));
    }
    if c.hash.is_empty() {
        return Err(ManifestError::MissingField("hash"));
    }
    if c.chunk_size == 0 {
        return Err(ManifestError::MissingField("chunk_size"));
    }
    if c.total_chunks == 0 {
        return Err(ManifestError::MissingField("total_chunks"));
    }

    if c.size > limits.max_firmware_size {
        return Err(ManifestError::SizeOutOfRange(c.size));
    }
    if !(limits.min_chunk_size..=limits.max_chunk_size).contains(&c.chunk_size) {
        return Err(ManifestError::ChunkSizeOutOfRange(c.chunk_size));
    }
    if c.total_chunks > limits.max_total_chunks.min(crate::config::MAX_TOTAL_CHUNKS) {
        return Err(ManifestError::TotalChunksOutOfRange(c.total_chunks));
    }
    if c.hash.len() != HASH_HEX_LEN || !c.hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ManifestError::InvalidHash);
    }
    if !size_is_consistent(c.size, c.chunk_size, c.total_chunks) {
        return Err(ManifestError::InconsistentSize {
            size: c.size,
            chunk_size: c.chunk_size,
            total_chunks: c.total_chunks,
        });
    }

    let version = heapless::String::try_from(c.version.as_str())
        .map_err(|_| ManifestError::VersionTooLong)?;
    if c.version == current_version {
        return Err(ManifestError::SameVersion);
    }
    let hash =
        heapless::String::try_from(c.hash.as_str()).map_err(|_| ManifestError::InvalidHash)?;

    Ok(Manifest {
        version,
        size: c.size,
        hash,
        chunk_size: c.chunk_size,
        total_chunks: c.total_chunks,
    })
}

/// `size` must lie within one `chunk_size` of
/// `chunk_size * (total_chunks - 1) + last_chunk_len`.
fn size_is_consistent(size: u32, chunk_size: u16, total_chunks: u16) -> bool {
    let cs = i64::from(chunk_size);
    let remainder = match i64::from(size) % cs {
        0 => cs,
        r => r,
    };
    let expected = (i64::from(total_chunks) - 1) * cs + remainder;
    (expected - i64::from(size)).abs() <= cs
}

// ── Tests ─────────────────────────────────────────────────────
