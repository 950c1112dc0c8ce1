// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Gap between two consecutive writes on the mock clock.
///
/// Larger than the default mtime epsilon so successive writes always count
/// as "newer".
pub const MOCK_TICK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    clock: SystemTime,
}

/// In-memory filesystem with a deterministic logical clock.
///
/// Every write advances the clock by [`MOCK_TICK`] and stamps the file with
/// the new time. Paths are compared after dropping `.` components, so
/// `./out/a.txt` and `out/a.txt` are the same file.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                files: HashMap::new(),
                clock: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.clock += MOCK_TICK;
        let modified = state.clock;
        state.files.insert(
            normalize(path.as_ref()),
            MockFile {
                content: content.into(),
                modified,
            },
        );
    }

    /// Override the mtime of an existing file (content untouched).
    pub fn set_modified(&self, path: impl AsRef<Path>, modified: SystemTime) -> Result<()> {
        let mut state = self.lock();
        match state.files.get_mut(&normalize(path.as_ref())) {
            Some(file) => {
                file.modified = modified;
                Ok(())
            }
            None => Err(anyhow!("File not found: {:?}", path.as_ref())),
        }
    }

    /// Current mtime of a file, if it exists.
    pub fn modified_of(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        let state = self.lock();
        state.files.get(&normalize(path.as_ref())).map(|f| f.modified)
    }

    /// Read back a file's content, if it exists.
    pub fn content_of(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.lock();
        state
            .files
            .get(&normalize(path.as_ref()))
            .map(|f| f.content.clone())
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let state = self.lock();
        match state.files.get(&normalize(path)) {
            Some(file) => Ok(Box::new(Cursor::new(file.content.clone()))),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        state
            .files
            .remove(&normalize(path))
            .map(|_| ())
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn is_file(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(&normalize(path))
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.modified_of(path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }
}
