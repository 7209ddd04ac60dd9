//! The destination controller: the public face of the rotating writer.
//!
//! A [`RollingDestination`] owns a backend, a clock, and one file session
//! behind a mutex. Every [`send_stringified`](RollingDestination::send_stringified)
//! runs the status check and the write inside the same critical section, so
//! producers on different threads can share one destination without racing
//! on rollover or interleaving partial lines.
//!
//! # Delivery
//!
//! Delivery is at-most-once. A record whose write fails is dropped, the
//! session closes, and a later send reopens it (subject to the open-retry
//! cooldown). Faults never escape as errors; callers see a `bool` and
//! [`is_available`](RollingDestination::is_available).
//!
//! # Example
//!
//! ```rust
//! use rollsink::{DestinationConfig, MemoryBackend, RollingDestination};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = MemoryBackend::new();
//! let config = DestinationConfig::new("/audit/{time:%Y%m%d}", "hdfs-audit.log")
//!     .with_rollover_interval_seconds(86_400);
//!
//! let destination = RollingDestination::new(config, backend.clone())?;
//! destination.start();
//!
//! assert!(destination.send_stringified(r#"{"user":"alice","action":"read"}"#));
//! destination.stop();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::DestinationConfig;
use crate::encoding::TextEncoding;
use crate::error::Result;
use crate::session::{CloseReason, Session};
use crate::template::PathTemplate;

/// A sink that accepts records one at a time.
///
/// Implementations absorb their own faults: `send` reports whether the
/// record was written, never why it was not.
pub trait LogDestination<T: fmt::Display + ?Sized>: Send + Sync {
    /// Performs the initial open. Failure is not fatal; the destination
    /// retries lazily on later sends.
    fn start(&self);

    /// Closes the destination. Calling it more than once is harmless.
    fn stop(&self);

    /// Returns `true` if a write handle is currently open.
    fn is_available(&self) -> bool;

    /// Writes the textual form of `record`. Returns `false` for `None`.
    fn send(&self, record: Option<&T>) -> bool {
        record.is_some_and(|record| self.send_stringified(&record.to_string()))
    }

    /// Writes `text` as one line.
    fn send_stringified(&self, text: &str) -> bool;
}

/// A time-rotated append writer over a [`Backend`].
pub struct RollingDestination<B: Backend, C: Clock = SystemClock> {
    config: DestinationConfig,
    backend: B,
    clock: C,
    session: Mutex<Session<B::Handle>>,
}

impl<B: Backend> RollingDestination<B, SystemClock> {
    /// Creates a destination that reads the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the directory or
    /// filename template is malformed.
    pub fn new(config: DestinationConfig, backend: B) -> Result<Self> {
        Self::with_clock(config, backend, SystemClock)
    }
}

impl<B: Backend, C: Clock> RollingDestination<B, C> {
    /// Creates a destination with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the directory or
    /// filename template is malformed.
    pub fn with_clock(config: DestinationConfig, backend: B, clock: C) -> Result<Self> {
        config.validate()?;
        let template = PathTemplate::parse(&config.path_template())?;
        let session = Session::new(&config, template);

        Ok(Self {
            config,
            backend,
            clock,
            session: Mutex::new(session),
        })
    }

    fn session(&self) -> MutexGuard<'_, Session<B::Handle>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the file for the current window.
    pub fn start(&self) {
        tracing::debug!(destination = %self, "starting");
        let now = self.clock.now();
        self.session().open(&self.backend, now);
    }

    /// Closes the current file. Close faults are only logged at debug level
    /// since the backend may be shutting down concurrently.
    pub fn stop(&self) {
        tracing::debug!(destination = %self, "stopping");
        self.session().close(CloseReason::Shutdown);
    }

    /// Returns `true` if a write handle is currently open.
    pub fn is_available(&self) -> bool {
        self.session().is_open()
    }

    /// Writes the textual form of `record`. Returns `false` for `None`
    /// without touching the session.
    pub fn send<T: fmt::Display + ?Sized>(&self, record: Option<&T>) -> bool {
        match record {
            Some(record) => self.send_stringified(&record.to_string()),
            None => false,
        }
    }

    /// Writes `text` followed by the line separator.
    ///
    /// Before writing, reopens after the cooldown, rolls over, or flushes as
    /// due. Returns `true` only if the write completed.
    pub fn send_stringified(&self, text: &str) -> bool {
        let mut session = self.session();
        let now = self.clock.now();
        session.check_status(&self.backend, now);
        session.write_line(text)
    }

    /// The path of the currently open file, if any.
    pub fn current_path(&self) -> Option<String> {
        self.session().current_path().map(str::to_string)
    }

    /// The time of the last failed open, if the destination is closed
    /// because of one.
    pub fn last_open_failure(&self) -> Option<DateTime<Utc>> {
        self.session().last_open_failure()
    }

    /// The encoding records are written in.
    pub fn encoding(&self) -> TextEncoding {
        self.session().encoding()
    }

    /// The configuration this destination was built with.
    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    /// The backend this destination writes to.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend, C: Clock> fmt::Display for RollingDestination<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RollingDestination {{Directory={}; File={}; RolloverIntervalSeconds={}}}",
            self.config.directory, self.config.filename, self.config.rollover_interval_seconds
        )
    }
}

impl<B: Backend, C: Clock> fmt::Debug for RollingDestination<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingDestination")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T, B, C> LogDestination<T> for RollingDestination<B, C>
where
    T: fmt::Display + ?Sized,
    B: Backend,
    C: Clock,
{
    fn start(&self) {
        RollingDestination::start(self);
    }

    fn stop(&self) {
        RollingDestination::stop(self);
    }

    fn is_available(&self) -> bool {
        RollingDestination::is_available(self)
    }

    fn send(&self, record: Option<&T>) -> bool {
        RollingDestination::send(self, record)
    }

    fn send_stringified(&self, text: &str) -> bool {
        RollingDestination::send_stringified(self, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::error::{ConfigError, RollsinkError, TemplateError};
    use std::sync::Arc;

    fn destination(
        config: DestinationConfig,
    ) -> (RollingDestination<MemoryBackend, ManualClock>, MemoryBackend, ManualClock) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::at_millis(1_704_067_200_000); // 2024-01-01T00:00:00Z
        let destination =
            RollingDestination::with_clock(config, backend.clone(), clock.clone()).unwrap();
        (destination, backend, clock)
    }

    #[test]
    fn test_new_rejects_malformed_template() {
        let config = DestinationConfig::new("/audit/{time:%Y", "app.log");
        let err = RollingDestination::new(config, MemoryBackend::new()).unwrap_err();
        assert!(matches!(
            err,
            RollsinkError::Template(TemplateError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_new_rejects_unformattable_time_pattern() {
        let config = DestinationConfig::new("/audit/{time:%#z}", "app.log");
        let err = RollingDestination::new(config, MemoryBackend::new()).unwrap_err();
        assert!(matches!(
            err,
            RollsinkError::Template(TemplateError::InvalidTimePattern { .. })
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DestinationConfig::new("/audit", "app.log").with_flush_interval_seconds(0);
        let err = RollingDestination::new(config, MemoryBackend::new()).unwrap_err();
        assert!(matches!(
            err,
            RollsinkError::Config(ConfigError::ZeroInterval { .. })
        ));
    }

    #[test]
    fn test_send_none_has_no_side_effect() {
        let (destination, backend, _clock) = destination(DestinationConfig::new("/audit", "app.log"));

        assert!(!destination.send::<str>(None));
        assert!(backend.calls().is_empty());
        assert!(!destination.is_available());
    }

    #[test]
    fn test_send_display_record() {
        struct Event {
            user: &'static str,
        }
        impl fmt::Display for Event {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "user={}", self.user)
            }
        }

        let (destination, backend, _clock) = destination(DestinationConfig::new("/audit", "app.log"));
        assert!(destination.send(Some(&Event { user: "alice" })));
        destination.stop();

        let content = backend.contents_string("/audit/app.log").unwrap();
        assert_eq!(content.trim_end(), "user=alice");
    }

    #[test]
    fn test_lazy_open_on_first_send() {
        let (destination, _backend, _clock) = destination(DestinationConfig::new("/audit", "app.log"));
        assert!(!destination.is_available());

        assert!(destination.send_stringified("a"));
        assert!(destination.is_available());
        assert_eq!(destination.current_path().as_deref(), Some("/audit/app.log"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (destination, _backend, _clock) = destination(DestinationConfig::new("/audit", "app.log"));
        destination.start();
        destination.stop();
        destination.stop();
        assert!(!destination.is_available());
    }

    #[test]
    fn test_trait_object() {
        let (destination, backend, _clock) = destination(DestinationConfig::new("/audit", "app.log"));
        let sink: Arc<dyn LogDestination<str>> = Arc::new(destination);

        sink.start();
        assert!(sink.is_available());
        assert!(sink.send(Some("via trait")));
        assert!(!sink.send(None));
        sink.stop();

        let content = backend.contents_string("/audit/app.log").unwrap();
        assert_eq!(content.trim_end(), "via trait");
    }

    #[test]
    fn test_display() {
        let (destination, _backend, _clock) =
            destination(DestinationConfig::new("/audit", "app.log").with_rollover_interval_seconds(60));
        assert_eq!(
            destination.to_string(),
            "RollingDestination {Directory=/audit; File=app.log; RolloverIntervalSeconds=60}"
        );
    }

    #[test]
    fn test_destination_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RollingDestination<MemoryBackend, ManualClock>>();
        assert_send_sync::<RollingDestination<crate::backend::LocalFsBackend>>();
    }
}
