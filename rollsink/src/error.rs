//! Error types for the rollsink rotating writer.
//!
//! Only construction-time problems (bad configuration, malformed path
//! templates) surface as [`RollsinkError`]. Faults on the write path are
//! absorbed by the destination and reported as a `bool` or through
//! `is_available()`; the session-internal [`OpenError`] and the backend-level
//! [`AppendError`] exist so that every failure branch is an explicit variant.

use std::io;

use thiserror::Error;

/// The main error type for all fallible rollsink constructors.
#[derive(Error, Debug)]
pub enum RollsinkError {
    /// The destination configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A directory or filename template could not be parsed.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// I/O failure while setting up a backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error building the WebHDFS client.
    #[cfg(feature = "webhdfs")]
    #[error("webhdfs error: {0}")]
    WebHdfs(#[from] WebHdfsError),
}

/// Errors detected while validating a [`DestinationConfig`](crate::config::DestinationConfig).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The filename template is empty.
    #[error("filename template must not be empty")]
    EmptyFilename,

    /// An interval that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroInterval {
        /// Name of the offending option.
        name: &'static str,
    },

    /// An interval is too large to be represented as an instant offset.
    #[error("{name} of {seconds}s is out of range")]
    IntervalOutOfRange {
        /// Name of the offending option.
        name: &'static str,
        /// The configured value.
        seconds: u64,
    },
}

/// Errors that can occur when parsing a path template.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{` token opener has no matching `}`.
    #[error("unterminated token starting at byte {offset} in '{template}'")]
    Unterminated {
        /// The template being parsed.
        template: String,
        /// Byte offset of the opening brace.
        offset: usize,
    },

    /// A `}` appeared outside of a token without being escaped as `}}`.
    #[error("unmatched '}}' at byte {offset} in '{template}'")]
    UnmatchedClose {
        /// The template being parsed.
        template: String,
        /// Byte offset of the stray brace.
        offset: usize,
    },

    /// The token kind is not one of `time:` or `env:`.
    #[error("unknown token '{{{token}}}'")]
    UnknownToken {
        /// The token body, without braces.
        token: String,
    },

    /// A `{time:}` token has an empty or invalid strftime pattern.
    #[error("invalid time pattern '{pattern}'")]
    InvalidTimePattern {
        /// The rejected pattern.
        pattern: String,
    },

    /// Formatting an instant failed.
    #[error("failed to format instant with pattern '{pattern}'")]
    Format {
        /// The pattern in use.
        pattern: String,
    },
}

/// An encoding name that is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown encoding '{0}'")]
pub struct UnknownEncoding(pub String);

/// Failure of a backend append attempt.
///
/// `Unsupported` is a structural capability gap that triggers the
/// rename-then-create fallback; `Io` is a transient fault that fails the open.
#[derive(Error, Debug)]
pub enum AppendError {
    /// The backend cannot append to existing files.
    #[error("append not supported: {0}")]
    Unsupported(String),

    /// Append is supported but the call failed.
    #[error("append failed: {0}")]
    Io(#[from] io::Error),
}

/// Why a single open attempt failed.
#[derive(Error, Debug)]
pub enum OpenError {
    /// The path template could not be resolved for the window.
    #[error("failed to resolve path: {0}")]
    Resolve(#[from] TemplateError),

    /// Checking whether the target exists failed.
    #[error("failed to check existence of '{path}': {source}")]
    Exists {
        /// The target path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Appending to the existing file failed with a transient fault.
    #[error("failed to append to '{path}': {source}")]
    Append {
        /// The target path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The backend cannot append and the existing file could not be moved aside.
    #[error("failed to move '{path}' aside to '{moved}'")]
    Rename {
        /// The existing file.
        path: String,
        /// The name it was to be moved to.
        moved: String,
        /// The underlying I/O error, when the backend reported one.
        #[source]
        source: Option<io::Error>,
    },

    /// Creating the file failed and no directory recovery applied.
    #[error("failed to create '{path}': {source}")]
    Create {
        /// The target path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Creating the file failed and the path has no parent to create.
    #[error("failed to create '{path}' and it has no parent directory: {source}")]
    NoParent {
        /// The target path.
        path: String,
        /// The error from the create call.
        #[source]
        source: io::Error,
    },

    /// Creating the missing parent directories failed.
    #[error("failed to create parent directories '{parent}'")]
    MakeDirectories {
        /// The parent path.
        parent: String,
        /// The underlying I/O error, when the backend reported one.
        #[source]
        source: Option<io::Error>,
    },
}

/// Errors raised by the WebHDFS backend.
#[cfg(feature = "webhdfs")]
#[derive(Error, Debug)]
pub enum WebHdfsError {
    /// Failed to create the HTTP client.
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The base URL could not be parsed.
    #[error("invalid base URL '{url}'")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },
}

/// Type alias for `Result<T, RollsinkError>`.
pub type Result<T> = std::result::Result<T, RollsinkError>;
