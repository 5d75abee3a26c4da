//! Image assembly: concatenate stored chunks, in index order, into the
//! candidate image file.
//!
//! Any stale image is removed first. A missing chunk, a short read, a
//! failed write, or a final length that differs from the manifest aborts
//! assembly and removes the partial output.

use core::fmt;
use log::{info, warn};
use std::io::{Read, Write};

use super::bitmap::ReceptionBitmap;
use super::files::{IMAGE_FILE, chunk_file_name, remove_if_present};
use super::manifest::Manifest;
use crate::app::ports::BlockStore;

/// Copy buffer size for chunk → image transfers.
pub const COPY_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyError {
    /// Not every chunk has been received.
    Incomplete,
    /// A chunk marked received has no file.
    MissingChunk(u16),
    /// Reading chunk `n` failed.
    Read(u16),
    /// Fewer bytes were read from chunk `n` than its file size reports.
    ShortRead(u16),
    /// The image file could not be created or written.
    Write,
    /// Assembled length differs from the manifest size.
    SizeMismatch { expected: u32, actual: u64 },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "not all chunks received"),
            Self::MissingChunk(n) => write!(f, "chunk {n} missing from storage"),
            Self::Read(n) => write!(f, "failed to read chunk {n}"),
            Self::ShortRead(n) => write!(f, "short read on chunk {n}"),
            Self::Write => write!(f, "failed to write assembled image"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "assembled {actual} bytes, manifest expects {expected}")
            }
        }
    }
}

impl std::error::Error for AssemblyError {}

/// Reference to an assembled (not yet validated) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle {
    pub name: &'static str,
    pub len: u64,
}

/// Build the image from every chunk in `0..manifest.total_chunks()`.
pub fn assemble<S: BlockStore + ?Sized>(
    store: &mut S,
    manifest: &Manifest,
    bitmap: &ReceptionBitmap,
) -> Result<ImageHandle, AssemblyError> {
    if !bitmap.is_full(manifest.total_chunks()) {
        return Err(AssemblyError::Incomplete);
    }

    if remove_if_present(store, IMAGE_FILE).is_err() {
        warn!("assembly: could not remove stale {IMAGE_FILE}");
        return Err(AssemblyError::Write);
    }

    let result = copy_chunks(store, manifest);
    match result {
        Ok(len) => {
            info!(
                "assembly: {IMAGE_FILE} built from {} chunks ({len} bytes)",
                manifest.total_chunks()
            );
            Ok(ImageHandle {
                name: IMAGE_FILE,
                len,
            })
        }
        Err(e) => {
            warn!("assembly: {e}");
            let _ = remove_if_present(store, IMAGE_FILE);
            Err(e)
        }
    }
}

fn copy_chunks<S: BlockStore + ?Sized>(
    store: &mut S,
    manifest: &Manifest,
) -> Result<u64, AssemblyError> {
    let mut out = store
        .open_write(IMAGE_FILE)
        .map_err(|_| AssemblyError::Write)?;
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;

    for index in 0..manifest.total_chunks() {
        let name = chunk_file_name(index);
        if !store.exists(&name) {
            return Err(AssemblyError::MissingChunk(index));
        }
        let expected = store.size(&name).map_err(|_| AssemblyError::Read(index))?;
        let mut reader = store
            .open_read(&name)
            .map_err(|_| AssemblyError::Read(index))?;

        let mut copied: u64 = 0;
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|_| AssemblyError::Read(index))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).map_err(|_| AssemblyError::Write)?;
            copied += n as u64;
        }
        if copied != expected {
            return Err(AssemblyError::ShortRead(index));
        }
        total += copied;
    }

    out.flush().map_err(|_| AssemblyError::Write)?;
    drop(out);

    if total != u64::from(manifest.size()) {
        return Err(AssemblyError::SizeMismatch {
            expected: manifest.size(),
            actual: total,
        });
    }
    Ok(total)
}
