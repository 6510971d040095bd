use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("data directory {path:?} is unusable: {reason}")]
    DataDir { path: PathBuf, reason: String },
    #[error("io error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("snapshot {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Creates `dir` if needed and checks that files can be created in it.
pub fn ensure_data_dir(dir: &Path) -> Result<(), PersistError> {
    let unusable = |reason: String| PersistError::DataDir {
        path: dir.to_path_buf(),
        reason,
    };
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => return Err(unusable("not a directory".to_string())),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|err| unusable(err.to_string()))?;
        }
        Err(err) => return Err(unusable(err.to_string())),
    }
    NamedTempFile::new_in(dir).map_err(|err| unusable(format!("not writable: {err}")))?;
    Ok(())
}

/// A JSON document on disk, replaced whole on every save.
///
/// Saves go through a synced temp file in the same directory and a rename,
/// so a crash leaves either the previous or the new snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file yields `T::default()`.
    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T, PersistError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => return Err(self.io(source)),
        };
        serde_json::from_slice(&bytes).map_err(|err| PersistError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    pub fn save<T: Serialize>(&self, value: &T) -> Result<(), PersistError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        ensure_data_dir(dir)?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|err| PersistError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| self.io(source))?;
        tmp.write_all(&bytes).map_err(|source| self.io(source))?;
        tmp.as_file_mut()
            .sync_all()
            .map_err(|source| self.io(source))?;
        tmp.persist(&self.path)
            .map_err(|err| self.io(err.error))?;
        Ok(())
    }

    fn io(&self, source: io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
