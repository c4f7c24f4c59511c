//! Logging module for bpq-auth-proxy
//!
//! This module provides logging functionality using tracing and tracing-subscriber.
//! It supports:
//! - Configurable log levels via verbose/quiet flags
//! - An optional JSONL audit log of session and login events
//! - Stderr output for human-readable logs

pub mod jsonl;

pub use jsonl::{Decision, JsonlWriter, LogEvent, LogEventKind};

use std::path::Path;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Verbosity level adjustment: -1 for quiet, 0 for normal, +1 for verbose
    pub verbosity: i8,
}

impl LogConfig {
    /// Create a new log configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbose mode (+1 verbosity)
    pub fn verbose(mut self) -> Self {
        self.verbosity = 1;
        self
    }

    /// Set quiet mode (-1 verbosity)
    pub fn quiet(mut self) -> Self {
        self.verbosity = -1;
        self
    }

    /// Get the minimum log level based on verbosity
    fn min_level(&self) -> Level {
        match self.verbosity {
            v if v < 0 => Level::WARN,
            0 => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}

/// Initialize the logging subsystem
///
/// `RUST_LOG` overrides the level chosen by `verbose`/`quiet`.
pub fn init(verbose: bool, quiet: bool) -> crate::Result<()> {
    let config = if quiet {
        LogConfig::new().quiet()
    } else if verbose {
        LogConfig::new().verbose()
    } else {
        LogConfig::new()
    };
    init_with_config(config)
}

/// Initialize logging with full configuration
pub fn init_with_config(config: LogConfig) -> crate::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.min_level().into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| crate::Error::Other(format!("Failed to set tracing subscriber: {}", e)))
}

/// Sink for audit events
///
/// Disabled unless an audit log path is configured; recording into a
/// disabled log is a no-op. Write failures are reported through tracing and
/// never interrupt a session.
#[derive(Default)]
pub struct AuditLog {
    writer: Option<JsonlWriter>,
}

impl AuditLog {
    /// Audit log that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open (or create) a JSONL audit log for appending
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self {
            writer: Some(JsonlWriter::new(path)?),
        })
    }

    /// Whether events are being written anywhere
    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Write an event to the audit log
    pub fn record(&self, event: &LogEvent) {
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.write(event) {
                tracing::warn!("Failed to write audit log event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_levels() {
        assert_eq!(LogConfig::new().min_level(), Level::INFO);
        assert_eq!(LogConfig::new().verbose().min_level(), Level::DEBUG);
        assert_eq!(LogConfig::new().quiet().min_level(), Level::WARN);
    }

    #[test]
    fn test_disabled_audit_log_is_noop() {
        let audit = AuditLog::disabled();
        assert!(!audit.is_enabled());
        audit.record(&LogEvent::server_stop());
    }

    #[test]
    fn test_audit_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let audit = AuditLog::open(&path).unwrap();
        assert!(audit.is_enabled());
        audit.record(&LogEvent::session_start(1, "127.0.0.1:4000"));
        audit.record(&LogEvent::server_stop());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
