//! Fuzz target: `FotaController::accept_chunk`
//!
//! Installs a fixed two-chunk manifest, then applies fuzz-provided chunk
//! messages (JSON). Half of the inputs are re-signed with the real PSK so
//! the storage path is reached as well as the rejection paths.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - `received() <= total_chunks()` after every call
//! - A rejected chunk never changes the received count
//!
//! cargo fuzz run fuzz_chunk_accept

#![no_main]

use libfuzzer_sys::fuzz_target;
use relayfw::adapters::mem_store::MemStore;
use relayfw::app::events::FotaEvent;
use relayfw::app::ports::EventSink;
use relayfw::config::{EngineConfig, PolicyLimits};
use relayfw::fota::auth;
use relayfw::fota::manifest::ManifestCandidate;
use relayfw::fota::message::ChunkMessage;
use relayfw::FotaController;

const PSK: &str = "fuzz-psk";

struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &FotaEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Some((&mode, body)) = data.split_first() else {
        return;
    };
    let Ok(mut chunk) = serde_json::from_slice::<ChunkMessage>(body) else {
        return;
    };
    if mode & 1 == 1 {
        chunk.mac = auth::sign(PSK.as_bytes(), auth::CHUNK_MAC_SEQUENCE, &chunk.data);
    }

    let Ok(config) = EngineConfig::new(PSK, "1.0.0") else {
        return;
    };
    let config = config.with_limits(PolicyLimits {
        min_chunk_size: 1,
        ..Default::default()
    });
    let Ok(mut fota) = FotaController::new(config, MemStore::new()) else {
        return;
    };
    let mut sink = NullSink;
    let manifest = ManifestCandidate {
        version: "2.0.0".into(),
        size: 10,
        hash: "84d89877f0d4041efb6bf91a16f0248f2fd573e6af05c19f96bedb9f882f7882".into(),
        chunk_size: 5,
        total_chunks: 2,
    };
    if fota.apply_manifest(&manifest, &mut sink).is_err() {
        return;
    }

    let before = fota.received();
    let result = fota.accept_chunk(&chunk, &mut sink);
    assert!(fota.received() <= fota.total_chunks());
    if result.is_err() {
        assert_eq!(fota.received(), before, "rejected chunk changed progress");
    }
});
