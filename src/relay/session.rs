//! One relayed client connection
//!
//! A session owns a client stream and a backend stream. Two copy loops
//! run concurrently with the arbiter under one `select!`; whichever
//! finishes first ends the session, the others are dropped, and both
//! connections are shut down exactly once.

use bytes::Bytes;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use super::arbiter::{Arbiter, Event, Phase, Verdict};
use super::link::Link;
use super::prompt::PromptDetector;
use crate::credentials::CredentialStore;
use crate::logging::{AuditLog, LogEvent, LogEventKind};

/// Read buffer size for both directions
pub const RELAY_BUFFER_SIZE: usize = 4096;

/// Longest identifier or password line held back while logging in
pub const MAX_LOGIN_LINE: usize = 1024;

/// Protocol settings shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Text in backend output that means the password is requested next
    pub prompt_marker: String,
    /// Sent to the client when its credentials are refused
    pub rejection_message: String,
    /// Limit on waiting for the first client line
    pub identifier_timeout: Option<Duration>,
    /// Limit on waiting for the password after the prompt
    pub password_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prompt_marker: "Password :".to_string(),
            rejection_message: "ERROR: Authentication Failed\n".to_string(),
            identifier_timeout: Some(Duration::from_secs(120)),
            password_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Why a session ended
#[derive(Debug)]
pub enum Outcome {
    /// The client closed its connection
    ClientClosed,
    /// The backend closed, or forwarding its output to the client failed
    BackendClosed,
    /// Credentials refused or the password never arrived
    Rejected,
    /// No identifier arrived in time
    LoginTimeout,
    /// The first client line exceeded [`MAX_LOGIN_LINE`]
    LineTooLong,
    /// Reading from the client or writing to the backend failed
    Io(io::Error),
}

impl Outcome {
    /// Snake-case name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::ClientClosed => "client_closed",
            Outcome::BackendClosed => "backend_closed",
            Outcome::Rejected => "rejected",
            Outcome::LoginTimeout => "login_timeout",
            Outcome::LineTooLong => "line_too_long",
            Outcome::Io(_) => "io_error",
        }
    }
}

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub phase: Phase,
    pub identifier: Option<String>,
}

/// Identity and audit sink of a session, used for logging
pub struct SessionContext {
    pub id: u64,
    pub peer: String,
    pub audit: Arc<AuditLog>,
}

/// A client connection paired with its backend connection
pub struct Session<C, B> {
    ctx: SessionContext,
    config: Arc<SessionConfig>,
    credentials: Arc<CredentialStore>,
    client: C,
    backend: B,
}

impl<C, B> Session<C, B>
where
    C: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    /// Pair a client stream with an already connected backend stream
    pub fn new(
        client: C,
        backend: B,
        config: Arc<SessionConfig>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            ctx: SessionContext {
                id: 0,
                peer: String::new(),
                audit: Arc::new(AuditLog::disabled()),
            },
            config,
            credentials,
            client,
            backend,
        }
    }

    /// Set the session number and peer address used in logs
    pub fn with_identity(mut self, id: u64, peer: impl Into<String>) -> Self {
        self.ctx.id = id;
        self.ctx.peer = peer.into();
        self
    }

    /// Record login events to an audit log
    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.ctx.audit = audit;
        self
    }

    /// Relay until either side closes, the login fails or a deadline passes
    pub async fn run(self) -> SessionReport {
        let Session {
            ctx,
            config,
            credentials,
            client,
            backend,
        } = self;

        let (mut client_rd, client_wr) = tokio::io::split(client);
        let (mut backend_rd, backend_wr) = tokio::io::split(backend);
        let mut client_link = Link::new("client", client_wr);
        let mut backend_link = Link::new("backend", backend_wr);

        let mut arbiter = Arbiter::new(credentials);
        let mut detector = PromptDetector::new(config.prompt_marker.clone());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        ctx.audit
            .record(&LogEvent::session_start(ctx.id, ctx.peer.clone()));

        let outcome = tokio::select! {
            outcome = client_to_backend(&mut client_rd, &mut backend_link, &events_tx) => outcome,
            outcome = backend_to_client(&mut backend_rd, &mut client_link, &mut detector, &events_tx) => outcome,
            outcome = arbiter.serve(&mut events_rx, &config, &ctx) => outcome,
        };

        if matches!(outcome, Outcome::Rejected) {
            if let Err(e) = client_link.write(config.rejection_message.as_bytes()).await {
                debug!(session = ctx.id, error = %e, "Failed to send rejection message");
            }
        }
        backend_link.close().await;
        client_link.close().await;

        let phase = arbiter.finish();
        let identifier = arbiter.identifier().map(str::to_string);

        match &outcome {
            Outcome::Io(e) => {
                debug!(session = ctx.id, peer = %ctx.peer, error = %e, phase = %phase, "Session ended on I/O error")
            }
            _ => {
                info!(session = ctx.id, peer = %ctx.peer, outcome = outcome.as_str(), phase = %phase, "Session ended")
            }
        }

        let mut event = LogEvent::new(LogEventKind::SessionEnd)
            .with_session_id(ctx.id)
            .with_peer(ctx.peer.clone())
            .with_phase(phase.as_str())
            .with_reason(outcome.as_str());
        if let Some(id) = &identifier {
            event = event.with_identifier(id.clone());
        }
        if let Outcome::Io(e) = &outcome {
            event = event.with_error(e.to_string());
        }
        ctx.audit.record(&event);

        SessionReport {
            outcome,
            phase,
            identifier,
        }
    }
}

/// Submit a client chunk to the arbiter and wait for its verdict
async fn consult(events: &mpsc::UnboundedSender<Event>, data: Bytes) -> Option<Verdict> {
    let (reply, verdict) = oneshot::channel();
    events.send(Event::ClientData { data, reply }).ok()?;
    verdict.await.ok()
}

fn arbiter_gone() -> Outcome {
    Outcome::Io(io::Error::other("session arbiter stopped"))
}

/// Client to backend: every chunk is vetted by the arbiter until the login settles
async fn client_to_backend<C, W>(
    reader: &mut ReadHalf<C>,
    backend: &mut Link<W>,
    events: &mpsc::UnboundedSender<Event>,
) -> Outcome
where
    C: AsyncRead,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut settled = false;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if !settled {
                    let (reply, rest) = oneshot::channel();
                    if events.send(Event::ClientEof { reply }).is_ok() {
                        if let Ok(rest) = rest.await {
                            if !rest.is_empty() {
                                if let Err(e) = backend.write(&rest).await {
                                    debug!(error = %e, "Error flushing buffered client data");
                                }
                            }
                        }
                    }
                }
                trace!("Client reached end of stream");
                return Outcome::ClientClosed;
            }
            Ok(n) => n,
            Err(e) => return Outcome::Io(e),
        };

        let chunk = &buf[..n];
        let forward = if settled {
            Bytes::copy_from_slice(chunk)
        } else {
            match consult(events, Bytes::copy_from_slice(chunk)).await {
                Some(Verdict::Forward(bytes)) => bytes,
                Some(Verdict::Release(bytes)) => {
                    settled = true;
                    bytes
                }
                Some(Verdict::Reject) => return Outcome::Rejected,
                Some(Verdict::Abort) => return Outcome::LineTooLong,
                None => return arbiter_gone(),
            }
        };

        if !forward.is_empty() {
            if let Err(e) = backend.write(&forward).await {
                return Outcome::Io(e);
            }
        }
    }
}

/// Backend to client: forward everything, watching for the password prompt
///
/// The prompt is reported to the arbiter before the chunk reaches the
/// client, so the client's answer can never overtake it.
async fn backend_to_client<B, W>(
    reader: &mut ReadHalf<B>,
    client: &mut Link<W>,
    detector: &mut PromptDetector,
    events: &mpsc::UnboundedSender<Event>,
) -> Outcome
where
    B: AsyncRead,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                trace!("Backend reached end of stream");
                return Outcome::BackendClosed;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Error reading backend data");
                return Outcome::BackendClosed;
            }
        };

        let chunk = &buf[..n];
        if detector.observe(chunk) {
            let _ = events.send(Event::PromptObserved);
        }

        if let Err(e) = client.write(chunk).await {
            debug!(error = %e, "Error forwarding backend data");
            return Outcome::BackendClosed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::parse("N0CALL,secret1\n"))
    }

    /// Start a session over in-memory pipes; returns the far ends
    fn spawn_session(
        config: SessionConfig,
        credentials: Arc<CredentialStore>,
    ) -> (
        DuplexStream,
        DuplexStream,
        tokio::task::JoinHandle<SessionReport>,
    ) {
        let (client_far, client_near) = duplex(1024);
        let (backend_near, backend_far) = duplex(1024);
        let session = Session::new(client_near, backend_near, Arc::new(config), credentials)
            .with_identity(1, "test");
        let handle = tokio::spawn(session.run());
        (client_far, backend_far, handle)
    }

    async fn read_exact_str(stream: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_authenticated_session_relays_both_ways() {
        let (mut client, mut backend, handle) = spawn_session(SessionConfig::default(), store());

        client.write_all(b"N0CALL\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 8).await, "N0CALL\r\n");

        backend.write_all(b"Password :").await.unwrap();
        assert_eq!(read_exact_str(&mut client, 10).await, "Password :");

        client.write_all(b"secret1\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 9).await, "secret1\r\n");

        client.write_all(b"BBS\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 5).await, "BBS\r\n");

        backend.write_all(b"Welcome\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut client, 9).await, "Welcome\r\n");

        drop(client);
        let report = handle.await.unwrap();
        assert_eq!(report.phase, Phase::Authenticated);
        assert_eq!(report.identifier.as_deref(), Some("N0CALL"));
        assert!(matches!(report.outcome, Outcome::ClientClosed));
    }

    #[tokio::test]
    async fn test_rejected_session_never_forwards_password() {
        let (mut client, mut backend, handle) = spawn_session(SessionConfig::default(), store());

        client.write_all(b"N0CALL\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 8).await, "N0CALL\r\n");

        backend.write_all(b"Password :").await.unwrap();
        assert_eq!(read_exact_str(&mut client, 10).await, "Password :");

        client.write_all(b"wrongpass\r\n").await.unwrap();

        let mut rejection = Vec::new();
        client.read_to_end(&mut rejection).await.unwrap();
        assert_eq!(rejection, b"ERROR: Authentication Failed\n");

        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "backend must not see the failed password");

        let report = handle.await.unwrap();
        assert_eq!(report.phase, Phase::Rejected);
        assert!(matches!(report.outcome, Outcome::Rejected));
    }

    #[tokio::test]
    async fn test_backend_close_ends_session() {
        let (mut client, backend, handle) = spawn_session(SessionConfig::default(), store());

        drop(backend);
        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, Outcome::BackendClosed));
        assert_eq!(report.phase, Phase::PassthroughNoAuthRequired);

        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_passthrough_without_prompt() {
        let (mut client, mut backend, handle) = spawn_session(SessionConfig::default(), store());

        client.write_all(b"N0CALL\r\n").await.unwrap();
        client.write_all(b"anything at all").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 23).await, "N0CALL\r\nanything at all");

        backend.write_all(b"Hello").await.unwrap();
        assert_eq!(read_exact_str(&mut client, 5).await, "Hello");

        drop(client);
        let report = handle.await.unwrap();
        assert_eq!(report.phase, Phase::PassthroughNoAuthRequired);
    }

    #[tokio::test]
    async fn test_identifier_and_traffic_in_one_write() {
        let (mut client, mut backend, handle) = spawn_session(SessionConfig::default(), store());

        client.write_all(b"N0CALL\r\nINFO\r\nBYE\r\n").await.unwrap();
        assert_eq!(
            read_exact_str(&mut backend, 19).await,
            "N0CALL\r\nINFO\r\nBYE\r\n"
        );

        drop(client);
        let report = handle.await.unwrap();
        assert_eq!(report.phase, Phase::PassthroughNoAuthRequired);
        assert_eq!(report.identifier.as_deref(), Some("N0CALL"));
    }

    #[tokio::test]
    async fn test_overlong_first_line_closes_quietly() {
        let (mut client, mut backend, handle) = spawn_session(SessionConfig::default(), store());

        client.write_all(&vec![b'A'; MAX_LOGIN_LINE + 1]).await.unwrap();

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, Outcome::LineTooLong));

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_overlong_password_is_rejected() {
        let (mut client, mut backend, handle) = spawn_session(SessionConfig::default(), store());

        client.write_all(b"N0CALL\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 8).await, "N0CALL\r\n");
        backend.write_all(b"Password :").await.unwrap();
        assert_eq!(read_exact_str(&mut client, 10).await, "Password :");

        client.write_all(&vec![b'x'; MAX_LOGIN_LINE + 1]).await.unwrap();

        let mut rejection = Vec::new();
        client.read_to_end(&mut rejection).await.unwrap();
        assert_eq!(rejection, b"ERROR: Authentication Failed\n");

        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, Outcome::Rejected));
        assert_eq!(report.phase, Phase::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_password_timeout_rejects() {
        let config = SessionConfig {
            password_timeout: Some(Duration::from_secs(5)),
            ..SessionConfig::default()
        };
        let (mut client, mut backend, handle) = spawn_session(config, store());

        client.write_all(b"N0CALL\r\n").await.unwrap();
        assert_eq!(read_exact_str(&mut backend, 8).await, "N0CALL\r\n");
        backend.write_all(b"Password :").await.unwrap();
        assert_eq!(read_exact_str(&mut client, 10).await, "Password :");

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, Outcome::Rejected));
        assert_eq!(report.phase, Phase::Rejected);

        let mut rejection = Vec::new();
        client.read_to_end(&mut rejection).await.unwrap();
        assert_eq!(rejection, b"ERROR: Authentication Failed\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifier_timeout_closes_quietly() {
        let config = SessionConfig {
            identifier_timeout: Some(Duration::from_secs(5)),
            ..SessionConfig::default()
        };
        let (mut client, _backend, handle) = spawn_session(config, store());

        let report = handle.await.unwrap();
        assert!(matches!(report.outcome, Outcome::LoginTimeout));

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
