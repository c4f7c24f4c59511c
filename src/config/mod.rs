//! Configuration module for bpq-auth-proxy
//!
//! This module handles loading and parsing of configuration files,
//! including environment variable expansion and duration parsing.

mod file;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::relay::SessionConfig;

pub use file::{
    ConfigFile, ConfigPath, config_search_paths, find_config_file, load_config,
    load_config_from_path_or_default,
};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port the listener binds to
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Path to the two-column CSV credential file
    /// Supports environment variable and tilde expansion
    #[serde(default = "default_credential_source_path")]
    pub credential_source_path: String,

    /// Host name or address of the BPQ telnet port
    #[serde(default = "default_backend_host")]
    pub backend_host: String,

    /// Port of the BPQ telnet port
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    /// Literal text in backend output that means "send the password now"
    #[serde(default = "default_prompt_marker")]
    pub prompt_marker: String,

    /// Line sent to a client whose credentials were refused
    #[serde(default = "default_rejection_message")]
    pub rejection_message: String,

    /// How long to wait for the first client line ("0" disables)
    #[serde(default = "default_identifier_timeout")]
    pub identifier_timeout: String,

    /// How long to wait for the password once prompted ("0" disables)
    #[serde(default = "default_password_timeout")]
    pub password_timeout: String,

    /// Timeout for opening the backend connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// When the credential file is re-read
    #[serde(default)]
    pub credential_reload: CredentialReload,

    /// Path to the JSONL audit log
    /// Supports environment variable and tilde expansion
    #[serde(default)]
    pub audit_log: Option<String>,
}

/// Credential file reload policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialReload {
    /// Read the file again for every new connection
    #[default]
    PerSession,
    /// Share one snapshot, re-read on SIGHUP
    OnSignal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            credential_source_path: default_credential_source_path(),
            backend_host: default_backend_host(),
            backend_port: default_backend_port(),
            prompt_marker: default_prompt_marker(),
            rejection_message: default_rejection_message(),
            identifier_timeout: default_identifier_timeout(),
            password_timeout: default_password_timeout(),
            connect_timeout: default_connect_timeout(),
            credential_reload: CredentialReload::default(),
            audit_log: None,
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8773
}

fn default_credential_source_path() -> String {
    "users.csv".to_string()
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_backend_port() -> u16 {
    8772
}

fn default_prompt_marker() -> String {
    "Password :".to_string()
}

fn default_rejection_message() -> String {
    "ERROR: Authentication Failed\n".to_string()
}

fn default_identifier_timeout() -> String {
    "2m".to_string()
}

fn default_password_timeout() -> String {
    "1m".to_string()
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

impl Config {
    /// Expand paths, parse durations and validate values
    pub fn resolve(&self) -> crate::Result<ResolvedConfig> {
        if self.backend_host.trim().is_empty() {
            return Err(crate::Error::Config("backend_host must not be empty".to_string()));
        }
        if self.backend_port == 0 {
            return Err(crate::Error::Config("backend_port must not be 0".to_string()));
        }
        if self.prompt_marker.is_empty() {
            return Err(crate::Error::Config("prompt_marker must not be empty".to_string()));
        }

        let connect_timeout = parse_duration(&self.connect_timeout)?;
        if connect_timeout.is_zero() {
            return Err(crate::Error::Config("connect_timeout must not be 0".to_string()));
        }

        Ok(ResolvedConfig {
            listen_address: self.listen_address.clone(),
            listen_port: self.listen_port,
            credential_source_path: PathBuf::from(expand_path(&self.credential_source_path)?),
            backend_host: self.backend_host.clone(),
            backend_port: self.backend_port,
            prompt_marker: self.prompt_marker.clone(),
            rejection_message: self.rejection_message.clone(),
            identifier_timeout: non_zero(parse_duration(&self.identifier_timeout)?),
            password_timeout: non_zero(parse_duration(&self.password_timeout)?),
            connect_timeout,
            credential_reload: self.credential_reload,
            audit_log: self
                .audit_log
                .as_ref()
                .map(|p| expand_path(p))
                .transpose()?
                .map(PathBuf::from),
        })
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

/// Configuration with expanded paths and parsed durations
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub credential_source_path: PathBuf,
    pub backend_host: String,
    pub backend_port: u16,
    pub prompt_marker: String,
    pub rejection_message: String,
    /// `None` when the deadline is disabled
    pub identifier_timeout: Option<Duration>,
    /// `None` when the deadline is disabled
    pub password_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub credential_reload: CredentialReload,
    pub audit_log: Option<PathBuf>,
}

impl ResolvedConfig {
    /// `address:port` string for the listener
    pub fn listen_addr(&self) -> String {
        join_host_port(&self.listen_address, self.listen_port)
    }

    /// `host:port` string for the backend
    pub fn backend_addr(&self) -> String {
        join_host_port(&self.backend_host, self.backend_port)
    }

    /// Per-session protocol settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            prompt_marker: self.prompt_marker.clone(),
            rejection_message: self.rejection_message.clone(),
            identifier_timeout: self.identifier_timeout,
            password_timeout: self.password_timeout,
        }
    }
}

/// Join a host and port, bracketing bare IPv6 literals
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Split a `host:port` string as given on the command line
pub fn split_host_port(s: &str) -> crate::Result<(String, u16)> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| crate::Error::Config(format!("Expected HOST:PORT, got '{}'", s)))?;
    let port: u16 = port
        .parse()
        .map_err(|e| crate::Error::Config(format!("Invalid port in '{}': {}", s, e)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(crate::Error::Config(format!("Missing host in '{}'", s)));
    }
    Ok((host.to_string(), port))
}

/// Expand environment variables and tilde in a path string
pub fn expand_path(path: &str) -> crate::Result<String> {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .map_err(|e| crate::Error::Config(format!("Failed to expand path '{}': {}", path, e)))
}

/// Parse a duration string like "1h", "30m", "10s", "1d"
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::Config("Empty duration string".to_string()));
    }

    // Find the position where the numeric part ends
    let (num_str, unit) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, "s"));

    let num: u64 = num_str.trim().parse().map_err(|e| {
        crate::Error::Config(format!("Invalid duration number '{}': {}", num_str, e))
    })?;

    let seconds = match unit.to_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => num,
        "m" | "min" | "mins" | "minute" | "minutes" => num * 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => num * 60 * 60,
        "d" | "day" | "days" => num * 60 * 60 * 24,
        _ => {
            return Err(crate::Error::Config(format!(
                "Unknown duration unit '{}' in '{}'",
                unit, s
            )));
        }
    };

    Ok(Duration::from_secs(seconds))
}
