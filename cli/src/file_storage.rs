//! File-backed credential storage for the terminal client.
//!
//! The file holds the raw token and nothing else; a missing file means no
//! session. The storage key is ignored since one file backs one session.

#[cfg(test)]
#[path = "file_storage_test.rs"]
mod file_storage_test;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use strade::{CredentialStorage, StorageError};

#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, action: &str, error: &io::Error) -> StorageError {
        if error.kind() == io::ErrorKind::StorageFull {
            return StorageError::QuotaExceeded;
        }
        StorageError::Unavailable(format!("{action} {}: {error}", self.path.display()))
    }
}

impl CredentialStorage for FileStorage {
    fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.trim_end_matches(['\r', '\n']).to_owned())),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.storage_error("cannot read", &error)),
        }
    }

    fn write(&self, _key: &str, value: &str) -> Result<(), StorageError> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(&self.path)
            .and_then(|mut file| file.write_all(value.as_bytes()))
            .map_err(|error| self.storage_error("cannot write", &error))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.storage_error("cannot remove", &error)),
        }
    }
}
