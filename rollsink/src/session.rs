//! The file session: the single write handle and its rollover state machine.
//!
//! ```text
//!              open() ok
//!   Closed ──────────────────▶ Open
//!     ▲  ▲                      │ │
//!     │  └── open() failed ─────┘ │ close(): stop / write fault
//!     │      (cooldown starts)    │
//!     └───────────────────────────┘
//!             rollover: close() then open()
//! ```
//!
//! The session never hands its handle out. Every fault is absorbed here and
//! reflected only in the state: an open failure leaves the session `Closed`
//! with the failure time recorded, a write fault closes it.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::backend::Backend;
use crate::config::DestinationConfig;
use crate::encoding::{EncodedWriter, TextEncoding};
use crate::error::{AppendError, OpenError};
use crate::schedule::{self, Window};
use crate::template::{self, PathTemplate};

/// Numbered names tried for a moved-aside file before an open gives up.
const MAX_MOVE_ATTEMPTS: u32 = 1000;

/// Why a session is being closed. Shutdown closes are quiet about faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// A new open replaces the current handle.
    Reopen,
    /// The rollover window ended.
    Rollover,
    /// A write on the handle failed.
    WriteFault,
    /// The destination is stopping.
    Shutdown,
}

/// The per-open state of a live handle.
struct OpenFile<H: std::io::Write> {
    writer: EncodedWriter<H>,
    path: String,
    window: Window,
    next_flush: DateTime<Utc>,
}

enum SessionState<H: std::io::Write> {
    Closed {
        last_open_failure: Option<DateTime<Utc>>,
    },
    Open(OpenFile<H>),
}

/// What the status check decided to do before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    Open,
    Rollover,
    Flush,
    Nothing,
}

/// Settings copied out of the config when the session is built.
#[derive(Debug, Clone)]
struct Settings {
    template: PathTemplate,
    encoding: TextEncoding,
    append: bool,
    rollover_interval: Duration,
    flush_interval: Duration,
    open_retry_cooldown: Duration,
}

/// Owner of the single write handle.
pub(crate) struct Session<H: std::io::Write> {
    settings: Settings,
    state: SessionState<H>,
}

impl<H: std::io::Write + Send> Session<H> {
    /// Creates a closed session. The encoding name is resolved once here.
    pub(crate) fn new(config: &DestinationConfig, template: PathTemplate) -> Self {
        Self {
            settings: Settings {
                template,
                encoding: TextEncoding::resolve(config.encoding.as_deref()),
                append: config.append,
                rollover_interval: config.rollover_interval(),
                flush_interval: config.flush_interval(),
                open_retry_cooldown: config.open_retry_cooldown(),
            },
            state: SessionState::Closed {
                last_open_failure: None,
            },
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    pub(crate) fn current_path(&self) -> Option<&str> {
        match &self.state {
            SessionState::Open(file) => Some(&file.path),
            SessionState::Closed { .. } => None,
        }
    }

    pub(crate) fn last_open_failure(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SessionState::Closed { last_open_failure } => last_open_failure,
            SessionState::Open(_) => None,
        }
    }

    pub(crate) fn encoding(&self) -> TextEncoding {
        self.settings.encoding
    }

    /// Opens the file for the window containing `now`, closing any current
    /// handle first.
    pub(crate) fn open<B>(&mut self, backend: &B, now: DateTime<Utc>)
    where
        B: Backend<Handle = H>,
    {
        self.close(CloseReason::Reopen);

        let window = Window::containing(now, self.settings.rollover_interval);

        match self.acquire(backend, window) {
            Ok((handle, path)) => {
                tracing::debug!(path = %path, encoding = %self.settings.encoding, "opened file");
                self.state = SessionState::Open(OpenFile {
                    writer: EncodedWriter::new(handle, self.settings.encoding),
                    path,
                    window,
                    next_flush: schedule::next_flush(now, self.settings.flush_interval),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open file for write");
                self.state = SessionState::Closed {
                    last_open_failure: Some(now),
                };
            }
        }
    }

    /// Flushes and releases the handle, if any.
    ///
    /// Close faults are logged and swallowed; during shutdown they are only
    /// logged at debug level since the backend may already be gone.
    pub(crate) fn close(&mut self, reason: CloseReason) {
        let previous = std::mem::replace(
            &mut self.state,
            SessionState::Closed {
                last_open_failure: None,
            },
        );

        let mut file = match previous {
            SessionState::Open(file) => file,
            closed @ SessionState::Closed { .. } => {
                self.state = closed;
                return;
            }
        };

        match file.writer.flush() {
            Ok(()) => tracing::debug!(path = %file.path, ?reason, "closed file"),
            Err(e) if reason == CloseReason::Shutdown => {
                tracing::debug!(path = %file.path, error = %e, "failed to close file during shutdown");
            }
            Err(e) => tracing::warn!(path = %file.path, error = %e, "failed to close file"),
        }
    }

    /// Runs the pre-write status check: reopen after cooldown, roll over,
    /// or flush, whichever is due.
    pub(crate) fn check_status<B>(&mut self, backend: &B, now: DateTime<Utc>)
    where
        B: Backend<Handle = H>,
    {
        match self.status_action(now) {
            StatusAction::Open => self.open(backend, now),
            StatusAction::Rollover => {
                tracing::debug!(path = self.current_path(), "rolling over");
                self.close(CloseReason::Rollover);
                self.open(backend, now);
            }
            StatusAction::Flush => self.flush(now),
            StatusAction::Nothing => {}
        }
    }

    fn status_action(&self, now: DateTime<Utc>) -> StatusAction {
        match &self.state {
            SessionState::Closed { last_open_failure } => {
                let cooled_down = last_open_failure.is_none_or(|failed| {
                    now >= schedule::retry_allowed_at(failed, self.settings.open_retry_cooldown)
                });
                if cooled_down {
                    StatusAction::Open
                } else {
                    StatusAction::Nothing
                }
            }
            SessionState::Open(file) if now >= file.window.end => StatusAction::Rollover,
            SessionState::Open(file) if now >= file.next_flush => StatusAction::Flush,
            SessionState::Open(_) => StatusAction::Nothing,
        }
    }

    /// Flushes the open handle. A failed flush keeps the session open and
    /// leaves the deadline in place so the next write retries it.
    fn flush(&mut self, now: DateTime<Utc>) {
        let SessionState::Open(file) = &mut self.state else {
            return;
        };
        match file.writer.flush() {
            Ok(()) => file.next_flush = schedule::next_flush(now, self.settings.flush_interval),
            Err(e) => tracing::warn!(path = %file.path, error = %e, "failed to flush"),
        }
    }

    /// Writes one line through the open handle.
    ///
    /// Returns `false` if there is no handle or the write failed; a failed
    /// write closes the session and the line is dropped.
    pub(crate) fn write_line(&mut self, text: &str) -> bool {
        let SessionState::Open(file) = &mut self.state else {
            return false;
        };
        match file.writer.write_line(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %file.path, error = %e, "write failed");
                self.close(CloseReason::WriteFault);
                false
            }
        }
    }

    /// Resolves the window's path and acquires a handle for it.
    fn acquire<B>(&self, backend: &B, window: Window) -> Result<(H, String), OpenError>
    where
        B: Backend<Handle = H>,
    {
        let path = self.settings.template.resolve(window.start)?;
        tracing::debug!(path = %path, "opening file");

        if self.settings.append {
            let exists = backend.exists(&path).map_err(|source| OpenError::Exists {
                path: path.clone(),
                source,
            })?;
            if exists && let Some(handle) = append_or_move_aside(backend, &path, window.start)? {
                return Ok((handle, path));
            }
        }

        let handle = create_with_parents(backend, &path)?;
        Ok((handle, path))
    }
}

/// Opens `path` for append. If the backend cannot append, moves the file
/// aside under the first free timestamped name and returns `None` so the
/// caller creates a fresh one.
fn append_or_move_aside<B: Backend>(
    backend: &B,
    path: &str,
    window_start: DateTime<Utc>,
) -> Result<Option<B::Handle>, OpenError> {
    match backend.open_for_append(path) {
        Ok(handle) => Ok(Some(handle)),
        Err(AppendError::Unsupported(reason)) => {
            tracing::info!(path, reason = %reason, "append unsupported, moving existing file aside");
            move_aside(backend, path, window_start)?;
            Ok(None)
        }
        Err(AppendError::Io(source)) => Err(OpenError::Append {
            path: path.to_string(),
            source,
        }),
    }
}

/// Renames `path` to the first `numbered_moved_file_name` that does not
/// exist yet. Gives up after `MAX_MOVE_ATTEMPTS` taken names.
fn move_aside<B: Backend>(
    backend: &B,
    path: &str,
    window_start: DateTime<Utc>,
) -> Result<String, OpenError> {
    let mut moved = template::moved_file_name(path, window_start);

    for attempt in 0..MAX_MOVE_ATTEMPTS {
        moved = template::numbered_moved_file_name(path, window_start, attempt);
        let taken = backend.exists(&moved).map_err(|source| OpenError::Exists {
            path: moved.clone(),
            source,
        })?;
        if taken {
            continue;
        }

        return match backend.rename(path, &moved) {
            Ok(true) => {
                tracing::debug!(path, moved = %moved, "moved existing file aside");
                Ok(moved)
            }
            Ok(false) => Err(OpenError::Rename {
                path: path.to_string(),
                moved,
                source: None,
            }),
            Err(source) => Err(OpenError::Rename {
                path: path.to_string(),
                moved,
                source: Some(source),
            }),
        };
    }

    Err(OpenError::Rename {
        path: path.to_string(),
        moved,
        source: None,
    })
}

/// Creates `path`; if that fails because the parent directory is missing,
/// creates the parent once and retries exactly once.
fn create_with_parents<B: Backend>(backend: &B, path: &str) -> Result<B::Handle, OpenError> {
    let first_error = match backend.create(path) {
        Ok(handle) => return Ok(handle),
        Err(e) => e,
    };

    let Some(parent) = backend.parent_of(path) else {
        return Err(OpenError::NoParent {
            path: path.to_string(),
            source: first_error,
        });
    };

    let parent_exists = backend.exists(&parent).map_err(|source| OpenError::Exists {
        path: parent.clone(),
        source,
    })?;
    if parent_exists {
        return Err(OpenError::Create {
            path: path.to_string(),
            source: first_error,
        });
    }

    match backend.make_directories(&parent) {
        Ok(true) => tracing::debug!(parent = %parent, "created parent directories"),
        Ok(false) => {
            return Err(OpenError::MakeDirectories {
                parent,
                source: None,
            });
        }
        Err(source) => {
            return Err(OpenError::MakeDirectories {
                parent,
                source: Some(source),
            });
        }
    }

    backend.create(path).map_err(|source| OpenError::Create {
        path: path.to_string(),
        source,
    })
}
