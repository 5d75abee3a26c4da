//! Fuzz target: inbound envelope handling
//!
//! Feeds arbitrary bytes as an envelope JSON document through
//! `auth::unwrap` and `message::parse`.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - `unwrap` only succeeds when the MAC recomputes to the same tag
//! - A forged envelope never reaches the parser
//!
//! cargo fuzz run fuzz_envelope_unwrap

#![no_main]

use libfuzzer_sys::fuzz_target;
use relayfw::fota::auth::{self, SecureEnvelope};
use relayfw::fota::message;

const PSK: &[u8] = b"fuzz-psk";

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = serde_json::from_slice::<SecureEnvelope>(data) else {
        return;
    };

    match auth::unwrap(PSK, &envelope) {
        Ok(payload) => {
            assert!(
                auth::verify(PSK, envelope.sequence_number, &envelope.payload, &envelope.mac),
                "unwrap accepted an envelope that does not verify"
            );
            let _ = message::parse(&payload);
        }
        Err(_) => {
            // A re-signed copy of the same payload must always verify.
            let resigned = SecureEnvelope {
                mac: auth::sign(PSK, envelope.sequence_number, &envelope.payload),
                ..envelope
            };
            assert!(auth::verify(
                PSK,
                resigned.sequence_number,
                &resigned.payload,
                &resigned.mac
            ));
        }
    }
});
