//! Storage backends.
//!
//! The destination only needs a handful of primitives from the store it
//! writes to: an existence check, append, create, rename, and recursive
//! directory creation. [`Backend`] captures exactly that surface so the
//! rollover state machine can run against a local filesystem, an in-memory
//! store, or a remote file system without changes.
//!
//! - [`LocalFsBackend`] — the local filesystem via `std::fs`
//! - [`MemoryBackend`] — an in-process store with fault injection
//! - `WebHdfsBackend` — HDFS over the WebHDFS REST API (feature `webhdfs`)

mod local;
mod memory;
#[cfg(feature = "webhdfs")]
mod webhdfs;

use std::io::{self, Write};

use crate::error::AppendError;

pub use local::{LocalFile, LocalFsBackend};
pub use memory::{BackendCall, MemoryBackend, MemoryFile};
#[cfg(feature = "webhdfs")]
pub use webhdfs::{WebHdfsBackend, WebHdfsConfig, WebHdfsFile};

/// The capability surface a destination requires from its store.
///
/// Paths are backend-native strings (e.g. `/audit/app.log` or a URI path).
/// All calls are blocking.
pub trait Backend: Send + Sync {
    /// The byte stream returned by [`open_for_append`](Backend::open_for_append)
    /// and [`create`](Backend::create). Dropping it releases the file; data
    /// not yet flushed may be lost.
    type Handle: Write + Send;

    /// Reports whether `path` exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backend cannot answer.
    fn exists(&self, path: &str) -> io::Result<bool>;

    /// Opens an existing file for appending.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Unsupported`] if the backend cannot append to
    /// existing files at all, or [`AppendError::Io`] for a transient fault.
    fn open_for_append(&self, path: &str) -> Result<Self::Handle, AppendError>;

    /// Creates `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created, including when
    /// the parent directory is missing.
    fn create(&self, path: &str) -> io::Result<Self::Handle>;

    /// Renames `src` to `dst`. Returns `false` if the backend declined.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the call itself failed.
    fn rename(&self, src: &str, dst: &str) -> io::Result<bool>;

    /// Creates `path` and any missing ancestors. Returns `false` if the
    /// backend declined.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the call itself failed.
    fn make_directories(&self, path: &str) -> io::Result<bool>;

    /// Returns the parent of `path`, or `None` if it has none.
    fn parent_of(&self, path: &str) -> Option<String> {
        parent_of(path)
    }
}

/// Returns the text before the last `/` of `path`.
///
/// `"/a/b.log"` has parent `"/a"`, `"/b.log"` has parent `"/"`, and a bare
/// `"b.log"` or `"/"` has none.
pub fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/')? {
        0 => Some("/".to_string()),
        idx => Some(trimmed[..idx].to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a/b/c.log").as_deref(), Some("/a/b"));
        assert_eq!(parent_of("/c.log").as_deref(), Some("/"));
        assert_eq!(parent_of("/a/b/").as_deref(), Some("/a"));
        assert_eq!(parent_of("c.log"), None);
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of(""), None);
    }
}
