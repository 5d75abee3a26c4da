//! In-memory block store.
//!
//! Implements [`BlockStore`] over a shared `HashMap`. Cloning a `MemStore`
//! yields another handle onto the same files, so a test can keep one
//! handle while the controller owns the other.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use crate::app::ports::{BlockStore, StorageError};

type Files = Rc<RefCell<HashMap<String, Vec<u8>>>>;

#[derive(Clone, Default)]
pub struct MemStore {
    files: Files,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a file's contents.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(name).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.borrow().len()
    }
}

/// Append-only writer into one [`MemStore`] file.
pub struct MemWriter {
    files: Files,
    name: String,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.borrow_mut();
        let file = files
            .get_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file removed while open"))?;
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlockStore for MemStore {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemWriter;

    fn exists(&self, name: &str) -> bool {
        self.files.borrow().contains_key(name)
    }

    fn open_write(&mut self, name: &str) -> Result<MemWriter, StorageError> {
        self.files.borrow_mut().insert(name.to_string(), Vec::new());
        Ok(MemWriter {
            files: Rc::clone(&self.files),
            name: name.to_string(),
        })
    }

    fn open_read(&self, name: &str) -> Result<Cursor<Vec<u8>>, StorageError> {
        self.contents(name)
            .map(Cursor::new)
            .ok_or(StorageError::NotFound)
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.files
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    fn size(&self, name: &str) -> Result<u64, StorageError> {
        self.files
            .borrow()
            .get(name)
            .map(|f| f.len() as u64)
            .ok_or(StorageError::NotFound)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .files
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
