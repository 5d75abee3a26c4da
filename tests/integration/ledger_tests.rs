//! Outbound sealing against the persisted nonce ledger.

use relayfw::adapters::fs_store::FsStore;
use relayfw::adapters::nvs::NvsAdapter;
use relayfw::app::ports::{BlockStore, LedgerError, NonceLedger, StorageError};
use relayfw::fota::auth;
use relayfw::fota::message::FotaStatus;
use relayfw::{Error, FotaController};

use crate::mock_store::{FlakyStore, PSK, RecordingSink, chunk, config, digits_manifest};

#[test]
fn sealed_envelopes_use_increasing_persisted_nonces() {
    let mut nvs = NvsAdapter::new();
    let first = auth::seal(PSK.as_bytes(), &mut nvs, b"{}").unwrap();
    let second = auth::seal(PSK.as_bytes(), &mut nvs, b"{}").unwrap();

    assert_eq!(first.sequence_number, 1);
    assert_eq!(second.sequence_number, 2);
    assert_eq!(nvs.current(), 2);
    assert_ne!(first.mac, second.mac, "same payload, different nonce");
    assert_eq!(auth::unwrap(PSK.as_bytes(), &second).unwrap(), b"{}");
}

#[test]
fn nonces_continue_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nvs.bin");

    let first = {
        let mut nvs = NvsAdapter::open(&path).unwrap();
        auth::seal(PSK.as_bytes(), &mut nvs, b"{}").unwrap()
    };
    let mut nvs = NvsAdapter::open(&path).unwrap();
    let second = auth::seal(PSK.as_bytes(), &mut nvs, b"{}").unwrap();

    assert_eq!(first.sequence_number, 1);
    assert_eq!(second.sequence_number, 2);
    assert_ne!(first.mac, second.mac);
}

#[test]
fn boot_purge_leaves_nvs_image_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut nvs = NvsAdapter::open(dir.path().join("nvs.bin")).unwrap();
    nvs.next_nonce().unwrap();

    let store = FsStore::open(dir.path()).unwrap();
    let mut fota = FotaController::new(config(true), store).unwrap();
    fota.begin(&mut RecordingSink::new());

    assert!(fota.store().exists("nvs.bin"));
    assert_eq!(NvsAdapter::open(dir.path().join("nvs.bin")).unwrap().current(), 1);
}

#[test]
fn no_envelope_without_persisted_nonce() {
    let mut nvs = NvsAdapter::new();
    nvs.set_read_only(true);
    assert_eq!(
        auth::seal(PSK.as_bytes(), &mut nvs, b"{}"),
        Err(LedgerError::Storage(StorageError::IoError))
    );
    assert_eq!(nvs.current(), 0);
}

#[test]
fn status_request_carries_fota_status() {
    let mut fota = FotaController::new(config(true), FlakyStore::default()).unwrap();
    let mut sink = RecordingSink::new();
    fota.apply_manifest(&digits_manifest(), &mut sink).unwrap();
    fota.accept_chunk(&chunk(1, b"56789", 2), &mut sink).unwrap();

    let mut nvs = NvsAdapter::new();
    let env = fota.seal_status(&mut nvs).unwrap();
    assert_eq!(env.sequence_number, 1);

    let decoded = auth::unwrap(PSK.as_bytes(), &env).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(value["firmware_version"], "1.0.0");
    let status: FotaStatus = serde_json::from_value(value[FotaStatus::KEY].clone()).unwrap();
    assert_eq!(
        status,
        FotaStatus {
            chunk_received: 1,
            verified: true
        }
    );
}

#[test]
fn idle_status_request_has_no_fota_status() {
    let fota = FotaController::new(config(true), FlakyStore::default()).unwrap();
    let mut nvs = NvsAdapter::new();
    let env = fota.seal_status(&mut nvs).unwrap();
    let value: serde_json::Value =
        serde_json::from_slice(&auth::unwrap(PSK.as_bytes(), &env).unwrap()).unwrap();
    assert!(value.get(FotaStatus::KEY).is_none());
}

#[test]
fn status_request_not_sealed_when_nonce_cannot_persist() {
    let fota = FotaController::new(config(true), FlakyStore::default()).unwrap();
    let mut nvs = NvsAdapter::new();
    nvs.set_read_only(true);
    assert_eq!(
        fota.seal_status(&mut nvs),
        Err(Error::Ledger(LedgerError::Storage(StorageError::IoError)))
    );
}

#[test]
fn same_nonce_different_payloads_both_verify() {
    // Replay detection across nonces belongs to the receiver of
    // device-originated messages, not to envelope verification.
    let a = auth::wrap(PSK.as_bytes(), 9, b"first");
    let b = auth::wrap(PSK.as_bytes(), 9, b"second");
    assert_eq!(auth::unwrap(PSK.as_bytes(), &a).unwrap(), b"first");
    assert_eq!(auth::unwrap(PSK.as_bytes(), &b).unwrap(), b"second");
}
