//! Local filesystem backend.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::Backend;
use crate::error::AppendError;

/// Backend over the local filesystem.
///
/// With a root set, every backend path is interpreted relative to it, so
/// `/audit/app.log` under root `/var/spool` lands at
/// `/var/spool/audit/app.log`.
#[derive(Debug, Clone, Default)]
pub struct LocalFsBackend {
    root: Option<PathBuf>,
}

impl LocalFsBackend {
    /// Creates a backend that uses paths as given.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Creates a backend rooted at `root`.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    /// Maps a backend path to a filesystem path.
    pub fn local_path(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

impl Backend for LocalFsBackend {
    type Handle = LocalFile;

    fn exists(&self, path: &str) -> io::Result<bool> {
        self.local_path(path).try_exists()
    }

    fn open_for_append(&self, path: &str) -> Result<LocalFile, AppendError> {
        match OpenOptions::new().append(true).open(self.local_path(path)) {
            Ok(file) => Ok(LocalFile::new(file)),
            Err(e) if e.kind() == ErrorKind::Unsupported => {
                Err(AppendError::Unsupported(e.to_string()))
            }
            Err(e) => Err(AppendError::Io(e)),
        }
    }

    fn create(&self, path: &str) -> io::Result<LocalFile> {
        File::create(self.local_path(path)).map(LocalFile::new)
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        fs::rename(self.local_path(src), self.local_path(dst))?;
        Ok(true)
    }

    fn make_directories(&self, path: &str) -> io::Result<bool> {
        fs::create_dir_all(self.local_path(path))?;
        Ok(true)
    }
}

/// A buffered local file whose flush also syncs data to disk.
#[derive(Debug)]
pub struct LocalFile {
    inner: BufWriter<File>,
}

impl LocalFile {
    fn new(file: File) -> Self {
        Self {
            inner: BufWriter::new(file),
        }
    }
}

impl Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_data()
    }
}
