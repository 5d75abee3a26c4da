//! Whole-image integrity check.
//!
//! Streams the assembled image through SHA-256 with a fixed buffer and
//! compares the hex digest against the manifest. A mismatching image is
//! deleted so it can never be picked up by an installer.

use core::fmt;
use log::{info, warn};
use std::io::Read;

use super::assembler::{COPY_BUFFER_SIZE, ImageHandle};
use super::files::remove_if_present;
use super::manifest::Manifest;
use crate::app::ports::BlockStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// The image file does not exist.
    Missing,
    /// Reading the image failed.
    Read,
    /// Bytes hashed differ from the manifest size.
    SizeMismatch { expected: u32, actual: u64 },
    /// SHA-256 of the image differs from the manifest hash.
    HashMismatch,
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "assembled image not found"),
            Self::Read => write!(f, "failed to read assembled image"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "image is {actual} bytes, manifest expects {expected}")
            }
            Self::HashMismatch => write!(f, "image SHA-256 does not match manifest"),
        }
    }
}

impl std::error::Error for ImageError {}

/// Hash `image` and compare it to `manifest.hash()` (hex case ignored).
///
/// On a size or hash mismatch the image file is removed.
pub fn validate_image<S: BlockStore + ?Sized>(
    store: &mut S,
    image: &ImageHandle,
    manifest: &Manifest,
) -> Result<(), ImageError> {
    if !store.exists(image.name) {
        return Err(ImageError::Missing);
    }

    let (digest, len) = digest_file(store, image.name)?;

    let verdict = if len != u64::from(manifest.size()) {
        Err(ImageError::SizeMismatch {
            expected: manifest.size(),
            actual: len,
        })
    } else if !digest.eq_ignore_ascii_case(manifest.hash()) {
        Err(ImageError::HashMismatch)
    } else {
        Ok(())
    };

    match verdict {
        Ok(()) => info!("image: {} verified (sha256 {digest})", image.name),
        Err(e) => {
            warn!("image: {e}; computed {digest}, expected {}", manifest.hash());
            let _ = remove_if_present(store, image.name);
        }
    }
    verdict
}

/// Lowercase-hex SHA-256 of a stored file, plus the number of bytes hashed.
pub fn digest_file<S: BlockStore + ?Sized>(
    store: &S,
    name: &str,
) -> Result<(String, u64), ImageError> {
    let mut reader = store.open_read(name).map_err(|_| ImageError::Read)?;
    let mut hasher = hmac_sha256::Hash::new();
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut len: u64 = 0;
    loop {
        let n = reader.read(&mut buf).map_err(|_| ImageError::Read)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), len))
}
