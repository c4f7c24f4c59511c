//! JSONL (JSON Lines) audit log
//!
//! One JSON object per line describing what happened to each session:
//! when it started, which callsign it presented, and whether it was let in.
//! Passwords are never written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Log event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    /// Listener started
    ServerStart,
    /// Listener stopped
    ServerStop,
    /// Client accepted and backend connected
    SessionStart,
    /// Session torn down
    SessionEnd,
    /// Backend could not be reached for a new client
    BackendUnavailable,
    /// First client line captured as the identifier
    IdentifierCaptured,
    /// Backend asked for the password
    PromptObserved,
    /// Credentials accepted
    AuthSuccess,
    /// Credentials refused
    AuthFailure,
    /// Client did not finish the login dialogue in time
    LoginTimeout,
    /// Shared credential snapshot reloaded
    CredentialsReload,
    /// Error occurred
    Error,
}

impl std::fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogEventKind::ServerStart => "server_start",
            LogEventKind::ServerStop => "server_stop",
            LogEventKind::SessionStart => "session_start",
            LogEventKind::SessionEnd => "session_end",
            LogEventKind::BackendUnavailable => "backend_unavailable",
            LogEventKind::IdentifierCaptured => "identifier_captured",
            LogEventKind::PromptObserved => "prompt_observed",
            LogEventKind::AuthSuccess => "auth_success",
            LogEventKind::AuthFailure => "auth_failure",
            LogEventKind::LoginTimeout => "login_timeout",
            LogEventKind::CredentialsReload => "credentials_reload",
            LogEventKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// Authentication decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Credentials matched
    Allowed,
    /// Credentials refused
    Denied,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

/// A structured audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp of the event
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Kind of event
    pub kind: LogEventKind,

    /// Per-process session number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,

    /// Remote address of the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,

    /// Identifier (callsign) the client presented
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Session phase at the time of the event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Authentication decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Reason for the decision or action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Number of credential entries (for reload events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,

    /// Error message (for error events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Additional context as key-value pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEvent {
    /// Create a new log event with the current timestamp
    pub fn new(kind: LogEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            session_id: None,
            peer: None,
            identifier: None,
            phase: None,
            decision: None,
            reason: None,
            entries: None,
            error: None,
            context: None,
        }
    }

    /// Set the session number
    pub fn with_session_id(mut self, id: u64) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Set the peer address
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Set the identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set the phase
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Set the decision
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the entry count
    pub fn with_entries(mut self, entries: u64) -> Self {
        self.entries = Some(entries);
        self
    }

    /// Set the error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set additional context
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Create a server start event
    pub fn server_start(listen_addr: impl Into<String>) -> Self {
        Self::new(LogEventKind::ServerStart)
            .with_context(serde_json::json!({ "listen": listen_addr.into() }))
    }

    /// Create a server stop event
    pub fn server_stop() -> Self {
        Self::new(LogEventKind::ServerStop)
    }

    /// Create a session start event
    pub fn session_start(session_id: u64, peer: impl Into<String>) -> Self {
        Self::new(LogEventKind::SessionStart)
            .with_session_id(session_id)
            .with_peer(peer)
    }

    /// Create an authentication decision event
    pub fn auth_decision(
        session_id: u64,
        peer: impl Into<String>,
        identifier: impl Into<String>,
        decision: Decision,
    ) -> Self {
        let kind = match decision {
            Decision::Allowed => LogEventKind::AuthSuccess,
            Decision::Denied => LogEventKind::AuthFailure,
        };
        Self::new(kind)
            .with_session_id(session_id)
            .with_peer(peer)
            .with_identifier(identifier)
            .with_decision(decision)
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error).with_error(message)
    }

    /// Serialize the event to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSONL file writer with thread-safe buffered output
pub struct JsonlWriter {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    /// Create a new JSONL writer
    ///
    /// Opens the file for appending. Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Write a log event to the file
    pub fn write(&self, event: &LogEvent) -> std::io::Result<()> {
        let json = event
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Flush any buffered data to the file
    pub fn flush(&self) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writer.flush()
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
