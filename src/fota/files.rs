//! File naming in the chunk store, and best-effort cleanup.

use core::fmt::Write;
use log::{debug, warn};

use crate::app::ports::{BlockStore, StorageError};

/// Prefix shared by every chunk file.
pub const CHUNK_PREFIX: &str = "fota_chunk_";

/// Well-known name of the assembled candidate image.
pub const IMAGE_FILE: &str = "fota_firmware.bin";

/// Deterministic file name for chunk `index` (`fota_chunk_<index>.bin`).
pub fn chunk_file_name(index: u16) -> heapless::String<24> {
    let mut s = heapless::String::new();
    let _ = write!(s, "{CHUNK_PREFIX}{index}.bin");
    s
}

/// Remove every chunk file and the assembled image, if present.
///
/// Failures are logged and skipped. Returns the number of files removed.
pub fn purge<S: BlockStore + ?Sized>(store: &mut S) -> usize {
    let mut removed = purge_chunks(store);
    if store.exists(IMAGE_FILE) {
        match store.remove(IMAGE_FILE) {
            Ok(()) => removed += 1,
            Err(e) => warn!("fota: could not remove {IMAGE_FILE}: {e}"),
        }
    }
    debug!("fota: purged {removed} file(s)");
    removed
}

/// Remove every chunk file, leaving the assembled image alone.
pub fn purge_chunks<S: BlockStore + ?Sized>(store: &mut S) -> usize {
    let names = match store.list(CHUNK_PREFIX) {
        Ok(names) => names,
        Err(e) => {
            warn!("fota: could not list chunk files: {e}");
            return 0;
        }
    };

    let mut removed = 0;
    for name in names.iter().filter(|n| n.ends_with(".bin")) {
        match store.remove(name) {
            Ok(()) => removed += 1,
            Err(e) => warn!("fota: could not remove {name}: {e}"),
        }
    }
    removed
}

/// Remove `name`, treating "already gone" as success.
pub(crate) fn remove_if_present<S: BlockStore + ?Sized>(
    store: &mut S,
    name: &str,
) -> Result<(), StorageError> {
    match store.remove(name) {
        Err(StorageError::NotFound) | Ok(()) => Ok(()),
        Err(e) => Err(e),
    }
}
