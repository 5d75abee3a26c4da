//! Inbound FOTA messages and the outbound status report.
//!
//! An authenticated payload decodes to JSON carrying either a manifest or
//! a chunk, optionally nested under a `"fota"` key:
//!
//! ```text
//! {"fota": {"manifest": {"version": .., "size": .., ...}}}
//! {"fota": {"chunk_number": 3, "data": "<b64>", "mac": "<hex>", "total_chunks": 8}}
//! {"manifest": {...}}                      (bare form)
//! ```
//!
//! [`parse`] turns that into an [`InboundMessage`] so the controller can
//! dispatch with an exhaustive `match`. Payloads without FOTA content
//! (e.g. a plain config response) parse to `None`.
//!
//! Numeric fields saturate instead of failing to deserialize, so an
//! oversized `chunk_size` or `chunk_number` still reaches the bounds
//! checks and is rejected there with a typed error.

use core::fmt;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use super::auth::AuthError;
use super::manifest::ManifestCandidate;

/// One chunk of an image as delivered by the cloud.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    #[serde(rename = "chunk_number", deserialize_with = "saturating_u16")]
    pub index: u16,
    /// Base64-encoded chunk bytes
    #[serde(default)]
    pub data: String,
    /// Hex HMAC over `data` (sequence number fixed at 0)
    #[serde(default)]
    pub mac: String,
    /// Chunk count of the update this chunk belongs to
    #[serde(default, rename = "total_chunks", deserialize_with = "saturating_u16")]
    pub total_chunks_claimed: u16,
}

/// A decoded, authenticated FOTA message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Manifest(ManifestCandidate),
    Chunk(ChunkMessage),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FotaBody {
    Manifest { manifest: ManifestCandidate },
    Chunk(ChunkMessage),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadDoc {
    Wrapped { fota: FotaBody },
    Bare(FotaBody),
    Other(serde_json::Value),
}

impl From<FotaBody> for InboundMessage {
    fn from(body: FotaBody) -> Self {
        match body {
            FotaBody::Manifest { manifest } => Self::Manifest(manifest),
            FotaBody::Chunk(chunk) => Self::Chunk(chunk),
        }
    }
}

/// Parse a decoded envelope payload.
///
/// Returns `Ok(None)` for well-formed JSON that carries no FOTA message.
/// A `manifest` or `chunk_number` whose body does not fit the message
/// shape is [`AuthError::Malformed`], never `None`.
pub fn parse(payload: &[u8]) -> Result<Option<InboundMessage>, AuthError> {
    let doc: PayloadDoc = serde_json::from_slice(payload).map_err(|_| AuthError::Malformed)?;
    match doc {
        PayloadDoc::Wrapped { fota } | PayloadDoc::Bare(fota) => Ok(Some(fota.into())),
        PayloadDoc::Other(value) => {
            let body = value.get("fota").unwrap_or(&value);
            if body.get("manifest").is_some() || body.get("chunk_number").is_some() {
                return Err(AuthError::Malformed);
            }
            Ok(None)
        }
    }
}

// ── Wire integers ─────────────────────────────────────────────

/// Reads any JSON number as `u64`: negatives become 0, larger values and
/// floats saturate.
struct WireInt;

impl Visitor<'_> for WireInt {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        Ok(u64::try_from(v).unwrap_or(0))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        Ok(if v > 0.0 { v as u64 } else { 0 })
    }
}

pub(crate) fn saturating_u16<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
    let v = d.deserialize_any(WireInt)?;
    Ok(u16::try_from(v).unwrap_or(u16::MAX))
}

pub(crate) fn saturating_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = d.deserialize_any(WireInt)?;
    Ok(u32::try_from(v).unwrap_or(u32::MAX))
}

impl InboundMessage {
    /// Serialize in the wrapped wire form (`{"fota": ...}`).
    pub fn to_json(&self) -> Vec<u8> {
        let body = match self {
            Self::Manifest(m) => serde_json::json!({ "fota": { "manifest": m } }),
            Self::Chunk(c) => serde_json::json!({ "fota": c }),
        };
        body.to_string().into_bytes()
    }
}

// ── Outbound status ───────────────────────────────────────────

/// Reception progress reported back to the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FotaStatus {
    /// Index of the most recently processed chunk
    pub chunk_received: u16,
    /// Whether that chunk was accepted
    pub verified: bool,
}

impl FotaStatus {
    pub const KEY: &'static str = "fota_status";

    /// Add this status to an outbound request object under `"fota_status"`.
    pub fn insert_into(&self, request: &mut serde_json::Map<String, serde_json::Value>) {
        request.insert(
            Self::KEY.into(),
            serde_json::json!({
                "chunk_received": self.chunk_received,
                "verified": self.verified,
            }),
        );
    }
}
