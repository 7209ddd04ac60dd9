//! # rollsink
//!
//! Time-rotated append writer for forwarding audit records to remote file stores.
//!
//! rollsink writes one record per line to a file on an append-oriented store
//! (HDFS, a local spool directory, or anything else that offers
//! open/append/create/rename/mkdir) and rolls to a new file on fixed time
//! boundaries. It is built for audit pipelines where the store may be
//! unavailable for stretches at a time: the writer never blocks the caller on
//! retries and never hammers a failing store.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Rollover windows aligned to multiples of the interval since the epoch
//! - Filenames resolved from templates such as `/audit/{time:%Y%m%d}/app.log`
//! - Append to an existing window file, or move it aside when the store cannot append
//! - Cooldown between failed open attempts
//! - At-most-once delivery: a failed write drops that record and closes the file
//! - No background threads; all I/O happens on the calling thread under one lock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rollsink::{DestinationConfig, LocalFsBackend, RollingDestination};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DestinationConfig::new("/audit/{time:%Y-%m-%d}", "service-{time:%H}.log")
//!     .with_rollover_interval_seconds(3600)
//!     .with_flush_interval_seconds(10);
//!
//! let destination = RollingDestination::new(config, LocalFsBackend::with_root("./spool"))?;
//! destination.start();
//!
//! if !destination.send_stringified("user=alice action=read resource=/data/x") {
//!     eprintln!("record dropped; destination available: {}", destination.is_available());
//! }
//!
//! destination.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`RollingDestination`] — Public lifecycle: start, stop, send
//! - [`DestinationConfig`] — Templates, intervals, encoding, append mode, cooldown
//! - [`Backend`] — The store primitives the writer needs
//! - [`LogDestination`] — Object-safe sink trait implemented by the destination
//!
//! ## Modules
//!
//! - [`destination`] — Destination controller and sink trait
//! - [`schedule`] — Rollover boundary and flush deadline arithmetic
//! - [`template`] — Path templates with time tokens
//! - [`backend`] — Local, in-memory, and WebHDFS stores
//! - [`encoding`] — Record text encodings
//! - [`clock`] — Injectable time sources
//! - [`config`] — Destination configuration
//! - [`error`] — Error types

pub mod backend;
pub mod clock;
pub mod config;
pub mod destination;
pub mod encoding;
pub mod error;
pub mod schedule;
mod session;
pub mod template;

// Re-export primary API types at crate root for convenience.
pub use backend::{Backend, LocalFsBackend, MemoryBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DestinationConfig;
pub use destination::{LogDestination, RollingDestination};
pub use encoding::TextEncoding;
pub use error::{Result, RollsinkError};
pub use template::PathTemplate;
