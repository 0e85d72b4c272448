//! Persistence backends holding cookie wire lines.
//!
//! - [`MemoryBackend`]: an in-process jar
//! - [`FileBackend`]: one line per entry in a text file, durable across restarts

use crate::application::ports::{BackendError, PersistenceBackend};
use crate::domain::entry::wire_name;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// In-process jar of wire lines, keyed by entry name.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    lines: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the raw line stored for `name`.
    pub fn line(&self, name: &str) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Get the number of stored lines.
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the jar is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<String>, BackendError> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lines.values().cloned().collect())
    }

    fn store(&self, name: &str, line: &str) -> Result<(), BackendError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), line.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), BackendError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

/// File-backed jar.
///
/// Every change rewrites the whole file through a temporary sibling that is
/// renamed into place, so a crash leaves either the old or the new contents.
/// Lines whose name cannot be decoded are dropped on the next rewrite.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileBackend {
    /// Use the file at `path`. It is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Get the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>, BackendError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, BackendError> {
        Ok(self
            .read_lines()?
            .into_iter()
            .filter_map(|line| wire_name(&line).map(|name| (name, line)))
            .collect())
    }

    fn write_map(&self, lines: &BTreeMap<String, String>) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            for line in lines.values() {
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistenceBackend for FileBackend {
    fn load(&self) -> Result<Vec<String>, BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_lines()
    }

    fn store(&self, name: &str, line: &str) -> Result<(), BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = self.read_map()?;
        lines.insert(name.to_string(), line.to_string());
        self.write_map(&lines)
    }

    fn delete(&self, name: &str) -> Result<(), BackendError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = self.read_map()?;
        if lines.remove(name).is_some() {
            self.write_map(&lines)?;
        }
        Ok(())
    }
}
