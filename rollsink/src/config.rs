//! Destination configuration.
//!
//! A [`DestinationConfig`] is plain data: it can be built in code with the
//! `with_*` builders or deserialized from JSON. It is validated when a
//! destination is constructed and never changes afterwards.
//!
//! ```rust
//! use rollsink::config::DestinationConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config: DestinationConfig = serde_json::from_str(r#"{
//!     "directory": "/audit/{time:%Y%m%d}",
//!     "filename": "hdfs-audit.log",
//!     "rollover_interval_seconds": 3600
//! }"#)?;
//! config.validate()?;
//!
//! assert_eq!(config.flush_interval_seconds, 60);
//! assert!(config.append);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::template;

/// Default flush interval: one minute.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Default rollover interval: one day.
pub const DEFAULT_ROLLOVER_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Default minimum spacing between failed open attempts: one minute.
pub const DEFAULT_OPEN_RETRY_COOLDOWN_SECS: u64 = 60;

/// Largest accepted interval. Keeps millisecond arithmetic far from `i64` overflow.
const MAX_INTERVAL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Configuration of a rolling destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationConfig {
    /// Directory template. May contain `{time:…}` and `{env:…}` tokens.
    pub directory: String,

    /// Filename template, joined to `directory` with `/`.
    pub filename: String,

    /// Maximum time buffered writes stay unflushed.
    pub flush_interval_seconds: u64,

    /// Length of a rollover window.
    pub rollover_interval_seconds: u64,

    /// Text encoding name, e.g. `UTF-8`. Unset or unknown selects UTF-8.
    pub encoding: Option<String>,

    /// Reuse an existing file at window open instead of replacing it.
    pub append: bool,

    /// Minimum spacing between a failed open and the next attempt.
    pub open_retry_cooldown_seconds: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            filename: String::new(),
            flush_interval_seconds: DEFAULT_FLUSH_INTERVAL_SECS,
            rollover_interval_seconds: DEFAULT_ROLLOVER_INTERVAL_SECS,
            encoding: None,
            append: true,
            open_retry_cooldown_seconds: DEFAULT_OPEN_RETRY_COOLDOWN_SECS,
        }
    }
}

impl DestinationConfig {
    /// Creates a config with default intervals for the given templates.
    pub fn new(directory: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Sets the flush interval in seconds.
    #[must_use]
    pub fn with_flush_interval_seconds(mut self, seconds: u64) -> Self {
        self.flush_interval_seconds = seconds;
        self
    }

    /// Sets the rollover interval in seconds.
    #[must_use]
    pub fn with_rollover_interval_seconds(mut self, seconds: u64) -> Self {
        self.rollover_interval_seconds = seconds;
        self
    }

    /// Sets the text encoding name.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Enables or disables reuse of an existing file.
    #[must_use]
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Sets the open-retry cooldown in seconds.
    #[must_use]
    pub fn with_open_retry_cooldown_seconds(mut self, seconds: u64) -> Self {
        self.open_retry_cooldown_seconds = seconds;
        self
    }

    /// Validates the configuration.
    ///
    /// Template syntax is checked separately when the templates are parsed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the filename is empty or an interval is zero
    /// or out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filename.trim().is_empty() {
            return Err(ConfigError::EmptyFilename);
        }

        for (name, seconds) in [
            ("flush_interval_seconds", self.flush_interval_seconds),
            ("rollover_interval_seconds", self.rollover_interval_seconds),
        ] {
            if seconds == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }

        for (name, seconds) in [
            ("flush_interval_seconds", self.flush_interval_seconds),
            ("rollover_interval_seconds", self.rollover_interval_seconds),
            (
                "open_retry_cooldown_seconds",
                self.open_retry_cooldown_seconds,
            ),
        ] {
            if seconds > MAX_INTERVAL_SECS {
                return Err(ConfigError::IntervalOutOfRange { name, seconds });
            }
        }

        Ok(())
    }

    /// The full path template: directory and filename joined with `/`.
    pub fn path_template(&self) -> String {
        template::join(&self.directory, &self.filename)
    }

    /// Flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }

    /// Rollover interval as a [`Duration`].
    pub fn rollover_interval(&self) -> Duration {
        Duration::from_secs(self.rollover_interval_seconds)
    }

    /// Open-retry cooldown as a [`Duration`].
    pub fn open_retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.open_retry_cooldown_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DestinationConfig::new("/audit", "app.log");
        assert_eq!(config.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.rollover_interval(), Duration::from_secs(86_400));
        assert_eq!(config.open_retry_cooldown(), Duration::from_secs(60));
        assert!(config.append);
        assert!(config.encoding.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = DestinationConfig::new("/audit", "app.log")
            .with_flush_interval_seconds(5)
            .with_rollover_interval_seconds(60)
            .with_encoding("UTF-16LE")
            .with_append(false)
            .with_open_retry_cooldown_seconds(0);

        assert_eq!(config.flush_interval_seconds, 5);
        assert_eq!(config.rollover_interval_seconds, 60);
        assert_eq!(config.encoding.as_deref(), Some("UTF-16LE"));
        assert!(!config.append);
        assert_eq!(config.open_retry_cooldown_seconds, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_filename() {
        let config = DestinationConfig::new("/audit", "  ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyFilename));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = DestinationConfig::new("/audit", "app.log").with_rollover_interval_seconds(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                name: "rollover_interval_seconds"
            })
        );

        let config = DestinationConfig::new("/audit", "app.log").with_flush_interval_seconds(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_huge_interval() {
        let config =
            DestinationConfig::new("/audit", "app.log").with_open_retry_cooldown_seconds(u64::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalOutOfRange { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DestinationConfig =
            serde_json::from_str(r#"{"directory": "/a", "filename": "b.log", "append": false}"#)
                .unwrap();
        assert_eq!(config.directory, "/a");
        assert!(!config.append);
        assert_eq!(config.rollover_interval_seconds, DEFAULT_ROLLOVER_INTERVAL_SECS);
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<DestinationConfig, _> =
            serde_json::from_str(r#"{"filename": "b.log", "rollover": 5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_path_template() {
        let config = DestinationConfig::new("/audit/{time:%Y}/", "app.log");
        assert_eq!(config.path_template(), "/audit/{time:%Y}/app.log");
    }
}
