//! In-memory backend with fault injection.
//!
//! Models an HDFS-like store: files live under directories that must exist
//! before a file can be created in them, and append support can be switched
//! off to exercise the rename fallback. Every backend call is recorded so
//! tests can assert on exactly what the destination did.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, ErrorKind, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Backend, parent_of};
use crate::error::AppendError;

/// A call made against a [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `exists(path)`
    Exists(String),
    /// `open_for_append(path)`
    Append(String),
    /// `create(path)`
    Create(String),
    /// `rename(src, dst)`
    Rename(String, String),
    /// `make_directories(path)`
    MakeDirectories(String),
}

#[derive(Debug)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    calls: Vec<BackendCall>,
    append_supported: bool,
    fail_appends: bool,
    fail_creates: bool,
    fail_make_directories: bool,
    fail_writes: bool,
    fail_flushes: bool,
}

impl State {
    fn parent_exists(&self, path: &str) -> bool {
        match parent_of(path) {
            None => true,
            Some(parent) => parent == "/" || self.dirs.contains(&parent),
        }
    }
}

/// A cloneable in-memory store. Clones share the same contents.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates an empty store that supports append.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                files: BTreeMap::new(),
                dirs: BTreeSet::new(),
                calls: Vec::new(),
                append_supported: true,
                fail_appends: false,
                fail_creates: false,
                fail_make_directories: false,
                fail_writes: false,
                fail_flushes: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a file directly, creating its parent directories.
    pub fn insert_file(&self, path: &str, contents: &[u8]) {
        let mut state = self.state();
        if let Some(parent) = parent_of(path) {
            insert_dirs(&mut state.dirs, &parent);
        }
        state.files.insert(path.to_string(), contents.to_vec());
    }

    /// Returns the flushed contents of `path`.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// Returns the flushed contents of `path` as UTF-8 text.
    pub fn contents_string(&self, path: &str) -> Option<String> {
        self.contents(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns all file paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Returns `true` if a directory was created at `path`.
    pub fn has_directory(&self, path: &str) -> bool {
        self.state().dirs.contains(path)
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of `create` calls made so far.
    pub fn create_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::Create(_)))
            .count()
    }

    /// Switches append support on or off.
    pub fn set_append_supported(&self, supported: bool) {
        self.state().append_supported = supported;
    }

    /// Makes appends fail with a transient I/O error.
    pub fn set_fail_appends(&self, fail: bool) {
        self.state().fail_appends = fail;
    }

    /// Makes every `create` fail with a permission error.
    pub fn set_fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    /// Makes `make_directories` decline.
    pub fn set_fail_make_directories(&self, fail: bool) {
        self.state().fail_make_directories = fail;
    }

    /// Makes writes on open handles fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Makes flushes on open handles fail.
    pub fn set_fail_flushes(&self, fail: bool) {
        self.state().fail_flushes = fail;
    }
}

fn insert_dirs(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = Some(path.to_string());
    while let Some(dir) = current {
        if dir == "/" || !dirs.insert(dir.clone()) {
            break;
        }
        current = parent_of(&dir);
    }
}

impl Backend for MemoryBackend {
    type Handle = MemoryFile;

    fn exists(&self, path: &str) -> io::Result<bool> {
        let mut state = self.state();
        state.calls.push(BackendCall::Exists(path.to_string()));
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    fn open_for_append(&self, path: &str) -> Result<MemoryFile, AppendError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Append(path.to_string()));

        if !state.append_supported {
            return Err(AppendError::Unsupported(
                "append is not supported by this store".to_string(),
            ));
        }
        if state.fail_appends {
            return Err(AppendError::Io(io::Error::new(
                ErrorKind::ConnectionReset,
                "append failed",
            )));
        }
        if !state.files.contains_key(path) {
            return Err(AppendError::Io(io::Error::new(
                ErrorKind::NotFound,
                format!("{path} does not exist"),
            )));
        }

        Ok(MemoryFile::new(Arc::clone(&self.state), path))
    }

    fn create(&self, path: &str) -> io::Result<MemoryFile> {
        let mut state = self.state();
        state.calls.push(BackendCall::Create(path.to_string()));

        if state.fail_creates {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("permission denied: {path}"),
            ));
        }
        if !state.parent_exists(path) {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("parent directory of {path} does not exist"),
            ));
        }

        state.files.insert(path.to_string(), Vec::new());
        Ok(MemoryFile::new(Arc::clone(&self.state), path))
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        let mut state = self.state();
        state
            .calls
            .push(BackendCall::Rename(src.to_string(), dst.to_string()));

        if state.files.contains_key(dst) {
            return Ok(false);
        }
        match state.files.remove(src) {
            Some(contents) => {
                state.files.insert(dst.to_string(), contents);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn make_directories(&self, path: &str) -> io::Result<bool> {
        let mut state = self.state();
        state
            .calls
            .push(BackendCall::MakeDirectories(path.to_string()));

        if state.fail_make_directories {
            return Ok(false);
        }
        insert_dirs(&mut state.dirs, path);
        Ok(true)
    }
}

/// A handle into a [`MemoryBackend`] file.
///
/// Writes are buffered and become visible in the store on flush.
#[derive(Debug)]
pub struct MemoryFile {
    state: Arc<Mutex<State>>,
    path: String,
    pending: Vec<u8>,
}

impl MemoryFile {
    fn new(state: Arc<Mutex<State>>, path: &str) -> Self {
        Self {
            state,
            path: path.to_string(),
            pending: Vec::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state().fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "write failed"));
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fail_flushes {
            return Err(io::Error::new(ErrorKind::TimedOut, "flush failed"));
        }
        let pending = std::mem::take(&mut self.pending);
        state
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(&pending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_parent_directory() {
        let backend = MemoryBackend::new();

        assert!(backend.create("/audit/app.log").is_err());
        assert!(backend.make_directories("/audit").unwrap());
        assert!(backend.create("/audit/app.log").is_ok());
        assert!(backend.exists("/audit/app.log").unwrap());
        assert!(backend.exists("/audit").unwrap());
    }

    #[test]
    fn test_root_level_files_need_no_directory() {
        let backend = MemoryBackend::new();
        assert!(backend.create("/app.log").is_ok());
        assert!(backend.create("app.log").is_ok());
    }

    #[test]
    fn test_make_directories_creates_ancestors() {
        let backend = MemoryBackend::new();
        backend.make_directories("/a/b/c").unwrap();
        assert!(backend.has_directory("/a"));
        assert!(backend.has_directory("/a/b"));
        assert!(backend.has_directory("/a/b/c"));
    }

    #[test]
    fn test_writes_visible_after_flush() {
        let backend = MemoryBackend::new();
        let mut file = backend.create("/app.log").unwrap();

        file.write_all(b"hello").unwrap();
        assert_eq!(backend.contents("/app.log").unwrap(), b"");

        file.flush().unwrap();
        assert_eq!(backend.contents("/app.log").unwrap(), b"hello");
    }

    #[test]
    fn test_append_unsupported() {
        let backend = MemoryBackend::new();
        backend.insert_file("/app.log", b"old");
        backend.set_append_supported(false);

        let result = backend.open_for_append("/app.log");
        assert!(matches!(result, Err(AppendError::Unsupported(_))));
    }

    #[test]
    fn test_append_extends_existing() {
        let backend = MemoryBackend::new();
        backend.insert_file("/d/app.log", b"old\n");

        let mut file = backend.open_for_append("/d/app.log").unwrap();
        file.write_all(b"new\n").unwrap();
        file.flush().unwrap();

        assert_eq!(backend.contents_string("/d/app.log").unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_rename_refuses_existing_destination() {
        let backend = MemoryBackend::new();
        backend.insert_file("/a", b"a");
        backend.insert_file("/b", b"b");

        assert!(!backend.rename("/a", "/b").unwrap());
        assert!(backend.rename("/a", "/c").unwrap());
        assert_eq!(backend.paths(), vec!["/b".to_string(), "/c".to_string()]);
    }

    #[test]
    fn test_calls_are_recorded() {
        let backend = MemoryBackend::new();
        let _ = backend.exists("/x");
        let _ = backend.create("/x");

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Exists("/x".to_string()),
                BackendCall::Create("/x".to_string()),
            ]
        );
        assert_eq!(backend.create_calls(), 1);

        backend.clear_calls();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_fault_switches() {
        let backend = MemoryBackend::new();
        let mut file = backend.create("/app.log").unwrap();

        backend.set_fail_writes(true);
        assert!(file.write_all(b"x").is_err());
        backend.set_fail_writes(false);

        file.write_all(b"x").unwrap();
        backend.set_fail_flushes(true);
        assert!(file.flush().is_err());

        backend.set_fail_creates(true);
        assert!(backend.create("/other.log").is_err());

        backend.set_fail_make_directories(true);
        assert!(!backend.make_directories("/d").unwrap());
    }
}
