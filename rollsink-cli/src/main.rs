//! CLI for the rollsink rotating audit writer.
//!
//! Provides commands for tailing records into a destination, resolving path
//! templates, and validating destination configs.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rollsink::backend::Backend;
use rollsink::clock::{Clock, SystemClock};
use rollsink::schedule::Window;
use rollsink::{DestinationConfig, LocalFsBackend, PathTemplate, RollingDestination};
use tracing_subscriber::EnvFilter;

/// rollsink: time-rotated append writer CLI.
#[derive(Parser)]
#[command(name = "rollsink", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Read records from stdin, one per line, and send each to a destination.
    Tail {
        /// Path to a JSON destination config.
        #[arg(long)]
        config: PathBuf,

        /// Local directory that backend paths are resolved under.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Override the directory template from the config.
        #[arg(long)]
        directory: Option<String>,

        /// Override the filename template from the config.
        #[arg(long)]
        filename: Option<String>,

        /// WebHDFS base URL (e.g. `http://namenode:9870/webhdfs/v1`).
        #[cfg(feature = "webhdfs")]
        #[arg(long, conflicts_with = "root")]
        webhdfs: Option<String>,

        /// User name passed to WebHDFS as `user.name`.
        #[cfg(feature = "webhdfs")]
        #[arg(long, requires = "webhdfs")]
        user: Option<String>,
    },

    /// Print the path a template resolves to for the window containing an instant.
    Resolve {
        /// Path template, e.g. `/audit/{time:%Y%m%d}/app.log`.
        template: String,

        /// Instant in RFC 3339 form. Defaults to now.
        #[arg(long)]
        at: Option<String>,

        /// Rollover interval in seconds.
        #[arg(long, default_value = "86400")]
        interval: u64,
    },

    /// Validate a JSON destination config and print its current path.
    Check {
        /// Path to a JSON destination config.
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        #[cfg(feature = "webhdfs")]
        Commands::Tail {
            config,
            root,
            directory,
            filename,
            webhdfs,
            user,
        } => cmd_tail(&config, root, directory, filename, webhdfs, user),
        #[cfg(not(feature = "webhdfs"))]
        Commands::Tail {
            config,
            root,
            directory,
            filename,
        } => cmd_tail(&config, root, directory, filename),
        Commands::Resolve {
            template,
            at,
            interval,
        } => cmd_resolve(&template, at.as_deref(), interval),
        Commands::Check { config } => cmd_check(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Counts of records written and dropped by `tail`.
#[derive(Debug, Default, PartialEq, Eq)]
struct TailSummary {
    sent: u64,
    dropped: u64,
}

/// Implements `rollsink tail` over the local filesystem.
#[cfg(not(feature = "webhdfs"))]
fn cmd_tail(
    config_path: &Path,
    root: Option<PathBuf>,
    directory: Option<String>,
    filename: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = apply_overrides(load_config(config_path)?, directory, filename);
    tail_local(config, root)
}

/// Implements `rollsink tail` over the local filesystem or WebHDFS.
#[cfg(feature = "webhdfs")]
fn cmd_tail(
    config_path: &Path,
    root: Option<PathBuf>,
    directory: Option<String>,
    filename: Option<String>,
    webhdfs: Option<String>,
    user: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    use rollsink::backend::{WebHdfsBackend, WebHdfsConfig};

    let config = apply_overrides(load_config(config_path)?, directory, filename);

    let Some(url) = webhdfs else {
        return tail_local(config, root);
    };

    let mut webhdfs_config = WebHdfsConfig::new(url);
    if let Some(user) = user {
        webhdfs_config = webhdfs_config.with_user(user);
    }
    let backend = WebHdfsBackend::new(webhdfs_config)?;
    let destination = RollingDestination::new(config, backend)?;
    run_tail(&destination, io::stdin().lock())
}

fn tail_local(
    config: DestinationConfig,
    root: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = match root {
        Some(root) => LocalFsBackend::with_root(root),
        None => LocalFsBackend::new(),
    };
    let destination = RollingDestination::new(config, backend)?;
    run_tail(&destination, io::stdin().lock())
}

fn run_tail<B: Backend, C: Clock>(
    destination: &RollingDestination<B, C>,
    input: impl BufRead,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(destination = %destination, "tailing stdin");
    destination.start();
    let mut summary = TailSummary::default();
    let result = pump_lines(destination, input, &mut summary);
    destination.stop();

    println!("sent: {}", summary.sent);
    println!("dropped: {}", summary.dropped);

    result.map_err(|e| format!("failed to read input: {e}").into())
}

/// Sends every line of `input`, counting into `summary`. Stops at EOF or
/// the first read error.
fn pump_lines<B: Backend, C: Clock>(
    destination: &RollingDestination<B, C>,
    input: impl BufRead,
    summary: &mut TailSummary,
) -> io::Result<()> {
    for line in input.lines() {
        if destination.send_stringified(&line?) {
            summary.sent += 1;
        } else {
            summary.dropped += 1;
        }
    }
    Ok(())
}

/// Implements `rollsink resolve <template>`.
fn cmd_resolve(
    template: &str,
    at: Option<&str>,
    interval_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let instant = match at {
        Some(at) => parse_instant(at)?,
        None => SystemClock.now(),
    };
    let (window, path) = resolve_window(template, instant, interval_secs)?;

    println!("{path}");
    tracing::debug!(start = %window.start, end = %window.end, "window");
    Ok(())
}

/// Implements `rollsink check <config>`.
fn cmd_check(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    config.validate()?;

    let (window, path) = resolve_window(
        &config.path_template(),
        SystemClock.now(),
        config.rollover_interval_seconds,
    )?;

    println!("Config: {}", config_path.display());
    println!("  Template: {}", config.path_template());
    println!("  Rollover interval: {}", format_duration_secs(config.rollover_interval_seconds));
    println!("  Flush interval: {}", format_duration_secs(config.flush_interval_seconds));
    println!("  Open retry cooldown: {}", format_duration_secs(config.open_retry_cooldown_seconds));
    println!("  Append: {}", config.append);
    println!(
        "  Encoding: {}",
        rollsink::TextEncoding::resolve(config.encoding.as_deref())
    );
    println!();
    println!("Current window: {} .. {}", window.start.to_rfc3339(), window.end.to_rfc3339());
    println!("Current path: {path}");

    Ok(())
}

/// Loads a destination config from a JSON file.
fn load_config(path: &Path) -> Result<DestinationConfig, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
    let config: DestinationConfig = serde_json::from_str(&data)
        .map_err(|e| format!("invalid config '{}': {e}", path.display()))?;
    Ok(config)
}

fn apply_overrides(
    mut config: DestinationConfig,
    directory: Option<String>,
    filename: Option<String>,
) -> DestinationConfig {
    if let Some(directory) = directory {
        config.directory = directory;
    }
    if let Some(filename) = filename {
        config.filename = filename;
    }
    config
}

/// Resolves `template` for the window of `interval_secs` that contains `instant`.
fn resolve_window(
    template: &str,
    instant: DateTime<Utc>,
    interval_secs: u64,
) -> Result<(Window, String), Box<dyn std::error::Error>> {
    if interval_secs == 0 {
        return Err("interval must be greater than zero".into());
    }
    let template = PathTemplate::parse(template)?;
    let window = Window::containing(instant, Duration::from_secs(interval_secs));
    let path = template.resolve(window.start)?;
    Ok((window, path))
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let parsed = DateTime::parse_from_rfc3339(s.trim())
        .map_err(|e| format!("invalid RFC 3339 instant '{s}': {e}"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Formats seconds as a human-readable duration.
fn format_duration_secs(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollsink::backend::MemoryBackend;
    use rollsink::clock::ManualClock;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_window_uses_window_start() {
        let instant = parse_instant("2024-01-01T13:45:10Z").unwrap();
        let (window, path) =
            resolve_window("/audit/{time:%Y%m%d}/app-{time:%H%M}.log", instant, 3600).unwrap();

        assert_eq!(path, "/audit/20240101/app-1300.log");
        assert_eq!(window.start, parse_instant("2024-01-01T13:00:00Z").unwrap());
        assert_eq!(window.end, parse_instant("2024-01-01T14:00:00Z").unwrap());
    }

    #[test]
    fn test_resolve_window_rejects_zero_interval() {
        let instant = parse_instant("2024-01-01T00:00:00Z").unwrap();
        assert!(resolve_window("/a.log", instant, 0).is_err());
    }

    #[test]
    fn test_parse_instant_with_offset() {
        let instant = parse_instant("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(instant, parse_instant("2024-01-01T00:00:00Z").unwrap());
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_load_config_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"directory": "/audit/{time:%Y%m%d}", "filename": "app.log", "flush_interval_seconds": 5}"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.directory, "/audit/{time:%Y%m%d}");
        assert_eq!(config.flush_interval_seconds, 5);
        assert_eq!(config.rollover_interval_seconds, 86_400);
        assert!(config.append);
    }

    #[test]
    fn test_load_config_rejects_unknown_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"filename": "app.log", "rotate": true}"#).unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let config = DestinationConfig::new("/audit", "app.log");
        let config = apply_overrides(config, None, Some("other.log".to_string()));
        assert_eq!(config.directory, "/audit");
        assert_eq!(config.filename, "other.log");
    }

    #[test]
    fn test_pump_lines_counts_sent_and_dropped() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::at_millis(1_704_067_200_000);
        let config = DestinationConfig::new("/audit", "app.log");
        let destination =
            RollingDestination::with_clock(config, backend.clone(), clock).unwrap();

        destination.start();
        let mut summary = TailSummary::default();
        pump_lines(&destination, Cursor::new("one\ntwo\n"), &mut summary).unwrap();
        assert_eq!(summary, TailSummary { sent: 2, dropped: 0 });

        backend.set_fail_writes(true);
        pump_lines(&destination, Cursor::new("three\n"), &mut summary).unwrap();
        assert_eq!(summary, TailSummary { sent: 2, dropped: 1 });
        destination.stop();

        let content = backend.contents_string("/audit/app.log").unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn test_format_duration_secs() {
        assert_eq!(format_duration_secs(86_400), "1d");
        assert_eq!(format_duration_secs(7200), "2h");
        assert_eq!(format_duration_secs(90), "90s");
        assert_eq!(format_duration_secs(300), "5m");
    }
}
