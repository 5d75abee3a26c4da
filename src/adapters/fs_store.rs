//! Directory-backed block store.
//!
//! Implements [`BlockStore`] over a single host directory: each chunk or
//! image name maps to one flat file. Used by the simulator; on the device
//! the same trait sits on top of the flash filesystem.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::app::ports::{BlockStore, StorageError};

pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(map_io)?;
        debug!("FsStore: using {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names are flat; anything that could escape the root is refused.
    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            warn!("FsStore: refusing file name {:?}", name);
            return Err(StorageError::NotFound);
        }
        Ok(self.root.join(name))
    }
}

pub(crate) fn map_io(e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound,
        io::ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::IoError,
    }
}

impl BlockStore for FsStore {
    type Reader = BufReader<File>;
    type Writer = BufWriter<File>;

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|p| p.is_file())
    }

    fn open_write(&mut self, name: &str) -> Result<Self::Writer, StorageError> {
        let file = File::create(self.path(name)?).map_err(map_io)?;
        Ok(BufWriter::new(file))
    }

    fn open_read(&self, name: &str) -> Result<Self::Reader, StorageError> {
        let file = File::open(self.path(name)?).map_err(map_io)?;
        Ok(BufReader::new(file))
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        fs::remove_file(self.path(name)?).map_err(map_io)
    }

    fn size(&self, name: &str) -> Result<u64, StorageError> {
        let meta = fs::metadata(self.path(name)?).map_err(map_io)?;
        Ok(meta.len())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(map_io)? {
            let entry = entry.map_err(map_io)?;
            if !entry.file_type().map_err(map_io)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
