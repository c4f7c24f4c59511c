//! Integration tests for configuration and credential files

use bpq_auth_proxy::config::{Config, CredentialReload, load_config, parse_duration};
use bpq_auth_proxy::credentials::{CredentialSource, CredentialStore};
use bpq_auth_proxy::relay::{Outcome, Phase, Session, SessionConfig};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[test]
fn test_load_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
listen_address = "127.0.0.1"
listen_port = 8011
backend_host = "bpq.local"
backend_port = 8010
credential_source_path = "/srv/bpq/users.csv"
credential_reload = "on_signal"
prompt_marker = "password:"
rejection_message = "Access denied\r\n"
identifier_timeout = "30s"
password_timeout = "0"
connect_timeout = "5s"
audit_log = "/var/log/bpq-auth-proxy/audit.jsonl"
"#,
    )
    .unwrap();

    let file = load_config(&path).unwrap();
    assert_eq!(file.path, path);

    let resolved = file.config.resolve().unwrap();
    assert_eq!(resolved.listen_addr(), "127.0.0.1:8011");
    assert_eq!(resolved.backend_addr(), "bpq.local:8010");
    assert_eq!(resolved.credential_reload, CredentialReload::OnSignal);
    assert_eq!(resolved.identifier_timeout, Some(Duration::from_secs(30)));
    assert_eq!(resolved.password_timeout, None);
    assert_eq!(resolved.connect_timeout, Duration::from_secs(5));

    let session = resolved.session_config();
    assert_eq!(session.prompt_marker, "password:");
    assert_eq!(session.rejection_message, "Access denied\r\n");
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "backend_port = 8010\n").unwrap();

    let config = load_config(&path).unwrap().config;
    assert_eq!(config.backend_port, 8010);
    assert_eq!(config.listen_port, Config::default().listen_port);
    assert_eq!(config.prompt_marker, "Password :");
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "listen_prot = 8011\n").unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("listen_prot"));
}

#[test]
fn test_invalid_durations() {
    assert!(parse_duration("soon").is_err());
    assert!(parse_duration("5 fortnights").is_err());
    assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
}

#[tokio::test]
async fn test_credential_file_with_header_and_junk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.csv");
    fs::write(
        &path,
        "callsign,password\r\nN0CALL,secret1\r\nbroken line\r\nG4ABC,\"pass,word\"\r\nN0CALL,rotated\r\n",
    )
    .unwrap();

    let (store, report) = CredentialStore::try_load(&path).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.duplicates, 1);
    assert!(store.verify("N0CALL", "rotated"));
    assert!(!store.verify("N0CALL", "secret1"));
    assert!(store.verify("G4ABC", "pass,word"));
    // A header row is just another entry
    assert!(store.contains("callsign"));
}

#[tokio::test]
async fn test_missing_credential_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.csv");

    assert!(CredentialStore::try_load(&path).await.is_err());
    assert!(CredentialStore::load(&path).await.is_empty());
}

#[tokio::test]
async fn test_shared_source_keeps_snapshot_until_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.csv");
    fs::write(&path, "N0CALL,secret1\n").unwrap();

    let source = CredentialSource::from_policy(CredentialReload::OnSignal, &path).await;
    let before = source.snapshot().await;

    fs::write(&path, "N0CALL,secret2\nG4ABC,hunter2\n").unwrap();
    assert!(source.snapshot().await.verify("N0CALL", "secret1"));

    assert_eq!(source.reload().await, Some(2));
    assert!(source.snapshot().await.verify("N0CALL", "secret2"));
    // Sessions holding the old snapshot are unaffected
    assert!(before.verify("N0CALL", "secret1"));
}

#[tokio::test]
async fn test_custom_prompt_and_rejection_message() {
    let config = SessionConfig {
        prompt_marker: "password:".to_string(),
        rejection_message: "Access denied\r\n".to_string(),
        ..SessionConfig::default()
    };
    let credentials = Arc::new(CredentialStore::parse("N0CALL,secret1\n"));

    let (client, mut client_far) = tokio::io::duplex(1024);
    let (backend, mut backend_far) = tokio::io::duplex(1024);
    let session = tokio::spawn(Session::new(client, backend, Arc::new(config), credentials).run());

    client_far.write_all(b"N0CALL\r").await.unwrap();
    let mut buf = [0u8; 7];
    backend_far.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"N0CALL\r");

    backend_far.write_all(b"password:").await.unwrap();
    let mut buf = [0u8; 9];
    client_far.read_exact(&mut buf).await.unwrap();

    client_far.write_all(b"guess\r").await.unwrap();
    let mut rest = String::new();
    client_far.read_to_string(&mut rest).await.unwrap();
    assert_eq!(rest, "Access denied\r\n");

    let report = session.await.unwrap();
    assert!(matches!(report.outcome, Outcome::Rejected));
    assert_eq!(report.phase, Phase::Rejected);
    assert_eq!(report.identifier.as_deref(), Some("N0CALL"));

    let mut leaked = Vec::new();
    backend_far.read_to_end(&mut leaked).await.unwrap();
    assert!(leaked.is_empty());
}
