//! Controller behaviour against a fault-injecting store and authenticated
//! envelopes.

use relayfw::app::events::FotaEvent;
use relayfw::app::ports::{BlockStore, StorageError};
use relayfw::fota::assembler::AssemblyError;
use relayfw::fota::auth::{self, AuthError};
use relayfw::fota::manifest::ManifestError;
use relayfw::fota::files::{IMAGE_FILE, chunk_file_name};
use relayfw::fota::message::{FotaStatus, InboundMessage};
use relayfw::fota::receiver::{ChunkError, ChunkOutcome};
use relayfw::{Error, FotaController, FotaOutcome, FotaState};

use crate::mock_store::{
    FlakyStore, PSK, RecordingSink, chunk, config, digits_manifest, envelope,
};

fn controller(auto_assemble: bool) -> FotaController<FlakyStore> {
    FotaController::new(config(auto_assemble), FlakyStore::default()).unwrap()
}

#[test]
fn envelopes_drive_full_update() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    fota.begin(&mut sink);

    let manifest = InboundMessage::Manifest(digits_manifest());
    assert_eq!(
        fota.handle_envelope(&envelope(1, &manifest), &mut sink),
        Ok(FotaOutcome::ManifestAccepted)
    );

    let c1 = InboundMessage::Chunk(chunk(1, b"56789", 2));
    assert_eq!(
        fota.handle_envelope(&envelope(2, &c1), &mut sink),
        Ok(FotaOutcome::Chunk(ChunkOutcome::Stored))
    );
    let c0 = InboundMessage::Chunk(chunk(0, b"01234", 2));
    assert_eq!(
        fota.handle_envelope(&envelope(3, &c0), &mut sink),
        Ok(FotaOutcome::Completed)
    );

    assert_eq!(fota.state(), FotaState::Validated);
    assert_eq!(
        fota.store().inner.contents(IMAGE_FILE).unwrap(),
        b"0123456789"
    );

    let states: Vec<FotaState> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            FotaEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            FotaState::ManifestReceived,
            FotaState::Receiving,
            FotaState::ReadyToAssemble,
            FotaState::Assembled,
            FotaState::Validated,
        ]
    );
}

#[test]
fn tampered_envelope_never_reaches_controller() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();

    let mut env = envelope(1, &InboundMessage::Manifest(digits_manifest()));
    env.sequence_number += 1;
    assert_eq!(
        fota.handle_envelope(&env, &mut sink),
        Err(Error::Auth(AuthError::MacMismatch))
    );
    assert_eq!(fota.state(), FotaState::Idle);
    assert!(sink.events.is_empty());
}

#[test]
fn envelope_under_wrong_key_rejected() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    let msg = InboundMessage::Manifest(digits_manifest());
    let env = auth::wrap(b"not-the-psk", 1, &msg.to_json());
    assert_eq!(
        fota.handle_envelope(&env, &mut sink),
        Err(Error::Auth(AuthError::MacMismatch))
    );
}

#[test]
fn non_fota_envelope_is_no_update() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    let env = auth::wrap(PSK.as_bytes(), 5, br#"{"config":{"poll_ms":30000}}"#);
    assert_eq!(
        fota.handle_envelope(&env, &mut sink),
        Ok(FotaOutcome::NoUpdate)
    );
}

#[test]
fn authenticated_garbage_is_malformed() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    let env = auth::wrap(PSK.as_bytes(), 5, b"\x00\x01 not json");
    assert_eq!(
        fota.handle_envelope(&env, &mut sink),
        Err(Error::Auth(AuthError::Malformed))
    );
}

#[test]
fn write_failure_is_retryable() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();

    fota.store_mut().fail_open_write = true;
    let err = fota.accept_chunk(&chunk(0, b"01234", 2), &mut sink).unwrap_err();
    assert_eq!(
        err,
        Error::Chunk(ChunkError::StorageFailure(StorageError::Full))
    );
    assert_eq!(fota.received(), 0);
    assert_eq!(fota.state(), FotaState::ManifestReceived);

    fota.store_mut().fail_open_write = false;
    assert_eq!(
        fota.accept_chunk(&chunk(0, b"01234", 2), &mut sink),
        Ok(FotaOutcome::Chunk(ChunkOutcome::Stored))
    );
    assert_eq!(fota.received(), 1);
}

#[test]
fn short_write_detected_and_cleaned_up() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();
    fota.accept_chunk(&chunk(1, b"56789", 2), &mut sink).unwrap();

    fota.store_mut().short_writes = true;
    let err = fota.accept_chunk(&chunk(0, b"01234", 2), &mut sink).unwrap_err();
    assert_eq!(
        err,
        Error::Chunk(ChunkError::StorageFailure(StorageError::IoError))
    );
    assert!(!fota.store().exists(&chunk_file_name(0)));
    assert_eq!(fota.received(), 1);
    assert_eq!(
        fota.status_report(),
        Some(FotaStatus {
            chunk_received: 1,
            verified: false
        })
    );
}

#[test]
fn read_failure_during_assembly_fails_attempt() {
    let mut fota = controller(false);
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();
    fota.accept_chunk(&chunk(0, b"01234", 2), &mut sink).unwrap();
    fota.accept_chunk(&chunk(1, b"56789", 2), &mut sink).unwrap();

    fota.store_mut().fail_reads = true;
    assert_eq!(
        fota.assemble(&mut sink),
        Err(Error::Assembly(AssemblyError::Read(0)))
    );
    assert_eq!(fota.state(), FotaState::Failed);
    assert!(!fota.store().exists(IMAGE_FILE));
    assert_eq!(
        sink.count(|e| matches!(e, FotaEvent::Failed(_))),
        1
    );

    // Failed is sticky until reset.
    assert_eq!(
        fota.validate_image(&mut sink),
        Err(Error::AwaitingReset(FotaState::Failed))
    );
    fota.reset(&mut sink);
    assert_eq!(fota.state(), FotaState::Idle);
    assert_eq!(fota.store().inner.file_count(), 0);
}

#[test]
fn rejected_chunks_are_reported_as_events() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();

    let mut forged = chunk(0, b"01234", 2);
    forged.mac = auth::sign(b"attacker", 0, &forged.data);
    let _ = fota.accept_chunk(&forged, &mut sink);
    let _ = fota.accept_chunk(&chunk(7, b"01234", 2), &mut sink);
    let _ = fota.accept_chunk(&chunk(1, b"56789", 3), &mut sink);

    let rejected: Vec<ChunkError> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            FotaEvent::ChunkRejected { error, .. } => Some(*error),
            _ => None,
        })
        .collect();
    assert_eq!(
        rejected,
        vec![
            ChunkError::MacInvalid,
            ChunkError::OutOfRange { index: 7, total: 2 },
            ChunkError::ManifestMismatch {
                claimed: 3,
                expected: 2
            },
        ]
    );
    assert_eq!(fota.received(), 0);
}

#[test]
fn snapshot_reflects_progress() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();
    fota.accept_chunk(&chunk(1, b"56789", 2), &mut sink).unwrap();

    let snap = fota.snapshot();
    assert_eq!(snap.state, FotaState::Receiving);
    assert_eq!(snap.target_version.as_deref(), Some("2.0.0"));
    assert_eq!((snap.received, snap.total), (1, 2));
    assert_eq!(snap.next_missing, Some(0));
    assert!(snap.to_string().contains("Chunks:   1/2 (50.0%)"));
}

#[test]
fn oversized_manifest_numbers_are_rejected() {
    let cases: [(&str, ManifestError); 3] = [
        (
            r#""size":10,"chunk_size":70000,"total_chunks":2"#,
            ManifestError::ChunkSizeOutOfRange(u16::MAX),
        ),
        (
            r#""size":10,"chunk_size":5,"total_chunks":70000"#,
            ManifestError::TotalChunksOutOfRange(u16::MAX),
        ),
        (
            r#""size":5000000000,"chunk_size":5,"total_chunks":2"#,
            ManifestError::SizeOutOfRange(u32::MAX),
        ),
    ];

    for (fields, expected) in cases {
        let mut fota = controller(true);
        let mut sink = RecordingSink::new();
        let body = format!(
            r#"{{"fota":{{"manifest":{{"version":"2.0.0","hash":"{}",{fields}}}}}}}"#,
            "a".repeat(64)
        );
        let env = auth::wrap(PSK.as_bytes(), 1, body.as_bytes());

        assert_eq!(
            fota.handle_envelope(&env, &mut sink),
            Err(Error::Manifest(expected)),
            "{fields}"
        );
        assert_eq!(fota.state(), FotaState::Idle);
        assert_eq!(sink.events, vec![FotaEvent::ManifestRejected(expected)]);
    }
}

#[test]
fn oversized_chunk_number_is_rejected() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();

    let c0 = chunk(0, b"01234", 2);
    let body = format!(
        r#"{{"fota":{{"chunk_number":70000,"data":"{}","mac":"{}","total_chunks":2}}}}"#,
        c0.data, c0.mac
    );
    let env = auth::wrap(PSK.as_bytes(), 2, body.as_bytes());

    assert_eq!(
        fota.handle_envelope(&env, &mut sink),
        Err(Error::Chunk(ChunkError::OutOfRange {
            index: u16::MAX,
            total: 2
        }))
    );
    assert_eq!(fota.received(), 0);
    assert!(!fota.store().exists(&chunk_file_name(0)));
}

#[test]
fn fota_body_of_wrong_shape_is_malformed() {
    let mut fota = controller(true);
    let mut sink = RecordingSink::new();
    let env = auth::wrap(
        PSK.as_bytes(),
        3,
        br#"{"fota":{"manifest":{"version":"2.0.0","size":"big"}}}"#,
    );
    assert_eq!(
        fota.handle_envelope(&env, &mut sink),
        Err(Error::Auth(AuthError::Malformed))
    );
    assert_eq!(fota.state(), FotaState::Idle);
}
