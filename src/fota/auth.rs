//! Message authentication envelope: HMAC-SHA256 over `"<nonce>.<payload>"`.
//!
//! Every message exchanged with the cloud travels inside a three-field
//! envelope:
//!
//! ```text
//! { "nonce": 42, "payload": "<base64 of serialized message>", "mac": "<hex>" }
//! ```
//!
//! The MAC covers the decimal nonce, a literal `.`, and the *encoded*
//! payload, keyed with the device's pre-shared key. Device-originated
//! envelopes take their nonce from the persisted [`NonceLedger`]; the
//! ledger commits the new value before the envelope exists, so a crash
//! can skip a nonce but never reuse one.
//!
//! Crypto is handled by the `hmac-sha256` crate: pure Rust, no_std, and
//! identical on device and host targets. Tag comparison is constant-time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use core::fmt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{LedgerError, NonceLedger};

/// Sequence number used for chunk MACs.
///
/// Chunk MACs prove origin and integrity of chunk content only. Chunks are
/// keyed by index and stored idempotently, so a replayed chunk can at most
/// rewrite identical bytes; freshness is carried by the manifest instead.
pub const CHUNK_MAC_SEQUENCE: u32 = 0;

/// Length of a hex-encoded HMAC-SHA256 tag.
pub const MAC_HEX_LEN: usize = 64;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// MAC did not match the recomputed value (or was not a 64-char hex tag).
    MacMismatch,
    /// Payload was not valid base64.
    BadEncoding,
    /// Decoded payload was not a well-formed message.
    Malformed,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MacMismatch => write!(f, "envelope MAC verification failed"),
            Self::BadEncoding => write!(f, "envelope payload is not valid base64"),
            Self::Malformed => write!(f, "envelope payload is not a well-formed message"),
        }
    }
}

impl std::error::Error for AuthError {}

// ── Envelope ──────────────────────────────────────────────────

/// Authenticated wrapper around an encoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureEnvelope {
    #[serde(rename = "nonce")]
    pub sequence_number: u32,
    pub payload: String,
    pub mac: String,
}

/// Canonical byte string covered by the MAC.
fn canonical_message(sequence_number: u32, payload: &str) -> String {
    format!("{sequence_number}.{payload}")
}

/// Compute the lowercase-hex HMAC-SHA256 of `"<sequence_number>.<payload>"`.
pub fn sign(psk: &[u8], sequence_number: u32, payload: &str) -> String {
    let tag = hmac_sha256::HMAC::mac(canonical_message(sequence_number, payload), psk);
    hex::encode(tag)
}

/// Check `mac` against the recomputed tag. Hex case is ignored and the tag
/// comparison is constant-time.
pub fn verify(psk: &[u8], sequence_number: u32, payload: &str, mac: &str) -> bool {
    if mac.len() != MAC_HEX_LEN {
        return false;
    }
    let mut tag = [0u8; 32];
    if hex::decode_to_slice(mac, &mut tag).is_err() {
        return false;
    }
    hmac_sha256::HMAC::verify(canonical_message(sequence_number, payload), psk, &tag)
}

/// Verify a chunk MAC over its still-encoded data.
pub fn verify_chunk(psk: &[u8], encoded_data: &str, mac: &str) -> bool {
    verify(psk, CHUNK_MAC_SEQUENCE, encoded_data, mac)
}

/// Base64-encode `message`, sign it under `sequence_number`, and wrap it.
///
/// Pure: the caller is responsible for having persisted `sequence_number`
/// before the envelope leaves the device. Prefer [`seal`].
pub fn wrap(psk: &[u8], sequence_number: u32, message: &[u8]) -> SecureEnvelope {
    let payload = STANDARD.encode(message);
    let mac = sign(psk, sequence_number, &payload);
    SecureEnvelope {
        sequence_number,
        payload,
        mac,
    }
}

/// Verify an inbound envelope and return the decoded message bytes.
///
/// Fails closed: nothing is decoded unless the MAC matches.
pub fn unwrap(psk: &[u8], envelope: &SecureEnvelope) -> Result<Vec<u8>, AuthError> {
    if !verify(
        psk,
        envelope.sequence_number,
        &envelope.payload,
        &envelope.mac,
    ) {
        warn!(
            "auth: MAC verification failed for envelope nonce={}",
            envelope.sequence_number
        );
        return Err(AuthError::MacMismatch);
    }
    STANDARD.decode(envelope.payload.as_bytes()).map_err(|_| {
        warn!("auth: authenticated payload is not valid base64");
        AuthError::BadEncoding
    })
}

/// Wrap a device-originated message under the next ledger nonce.
///
/// The ledger persists the advanced counter before returning it, so the
/// envelope is only built once the nonce is durable.
pub fn seal<L: NonceLedger + ?Sized>(
    psk: &[u8],
    ledger: &mut L,
    message: &[u8],
) -> Result<SecureEnvelope, LedgerError> {
    let nonce = ledger.next_nonce()?;
    debug!("auth: sealing {} byte message with nonce {}", message.len(), nonce);
    Ok(wrap(psk, nonce, message))
}

// ── Tests ─────────────────────────────────────────────────────
