// src/fs/mock.rs

use super::FileSystem;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(String),
    /// The path exists but every read fails with this error kind.
    Unreadable(io::ErrorKind),
}

/// In-memory filesystem for tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_unreadable(&self, path: impl AsRef<Path>, kind: io::ErrorKind) {
        self.insert(path, MockEntry::Unreadable(kind));
    }

    fn insert(&self, path: impl AsRef<Path>, entry: MockEntry) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.as_ref().to_path_buf(), entry);
    }

    fn get(&self, path: &Path) -> Option<MockEntry> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.get(path).cloned()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.get(path) {
            Some(MockEntry::File(content)) => Ok(content),
            Some(MockEntry::Unreadable(kind)) => Err(io::Error::new(
                kind,
                format!("mock read failure for {:?}", path),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }
}
