//! Login state machine
//!
//! The arbiter is the only owner of a session's phase and captured
//! identifier. The two copy loops never touch that state: the client loop
//! submits each chunk and waits for a [`Verdict`], the backend loop posts
//! [`Event::PromptObserved`]. Both go through one FIFO channel, so the order
//! the arbiter sees events in is the order they happened on the wire.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::line::{LineBuffer, decode_line};
use super::session::{MAX_LOGIN_LINE, Outcome, SessionConfig, SessionContext};
use crate::credentials::CredentialStore;
use crate::logging::{Decision, LogEvent, LogEventKind};

/// Where a session is in the login dialogue
///
/// Phases only move forward (in declaration order), and the last three are
/// terminal and mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    AwaitingFirstMessage,
    AwaitingPasswordPrompt,
    AwaitingPassword,
    Authenticated,
    PassthroughNoAuthRequired,
    Rejected,
}

impl Phase {
    /// Whether the phase can no longer change
    pub fn is_terminal(self) -> bool {
        self >= Phase::Authenticated
    }

    /// Snake-case name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AwaitingFirstMessage => "awaiting_first_message",
            Phase::AwaitingPasswordPrompt => "awaiting_password_prompt",
            Phase::AwaitingPassword => "awaiting_password",
            Phase::Authenticated => "authenticated",
            Phase::PassthroughNoAuthRequired => "passthrough_no_auth_required",
            Phase::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the client loop should do with the bytes it just read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward these bytes to the backend and keep consulting the arbiter
    Forward(Bytes),
    /// Forward these bytes; the login is settled, copy raw from now on
    Release(Bytes),
    /// Credentials refused: nothing is forwarded and the session ends
    Reject,
    /// The first line grew past [`MAX_LOGIN_LINE`]: end the session quietly
    Abort,
}

/// Messages from the copy loops to the arbiter
#[derive(Debug)]
pub enum Event {
    /// A chunk read from the client
    ClientData {
        data: Bytes,
        reply: oneshot::Sender<Verdict>,
    },
    /// The client reached end of stream; reply carries bytes still to flush
    ClientEof { reply: oneshot::Sender<Bytes> },
    /// The backend emitted the password prompt marker
    PromptObserved,
}

/// Login state machine for one session
#[derive(Debug)]
pub struct Arbiter {
    phase: Phase,
    identifier: Option<String>,
    prompt_seen: bool,
    lines: LineBuffer,
    credentials: Arc<CredentialStore>,
    rejection_reason: &'static str,
}

impl Arbiter {
    /// Create an arbiter checking against the given snapshot
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            phase: Phase::AwaitingFirstMessage,
            identifier: None,
            prompt_seen: false,
            lines: LineBuffer::new(),
            credentials,
            rejection_reason: "",
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Identifier captured from the first client line
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Whether the backend has asked for a password
    pub fn prompt_seen(&self) -> bool {
        self.prompt_seen
    }

    /// The backend emitted the prompt marker
    ///
    /// Returns `true` if this moved the session to `AwaitingPassword`. A
    /// prompt seen before any identifier is remembered and takes effect as
    /// soon as the identifier arrives.
    pub fn on_prompt(&mut self) -> bool {
        if self.prompt_seen {
            return false;
        }
        self.prompt_seen = true;
        if self.phase == Phase::AwaitingPasswordPrompt {
            self.phase = Phase::AwaitingPassword;
            return true;
        }
        false
    }

    /// Classify a chunk from the client
    pub fn on_client_data(&mut self, data: &[u8]) -> Verdict {
        match self.phase {
            Phase::Authenticated => Verdict::Release(Bytes::copy_from_slice(data)),
            Phase::Rejected => Verdict::Reject,
            Phase::AwaitingPasswordPrompt | Phase::PassthroughNoAuthRequired => {
                self.lines.passed_through(data);
                Verdict::Forward(Bytes::copy_from_slice(data))
            }
            Phase::AwaitingFirstMessage | Phase::AwaitingPassword => self.classify_lines(data),
        }
    }

    fn classify_lines(&mut self, data: &[u8]) -> Verdict {
        self.lines.extend(data);
        let mut out = BytesMut::new();

        // Lines are only taken while the phase still inspects them; anything
        // after a settled line stays buffered and is forwarded below
        while matches!(
            self.phase,
            Phase::AwaitingFirstMessage | Phase::AwaitingPassword
        ) {
            let Some(line) = self.lines.next_line() else {
                break;
            };

            if self.phase == Phase::AwaitingFirstMessage {
                out.extend_from_slice(&line);
                let text = decode_line(&line);
                // Blank lines before the callsign are ordinary traffic
                if text.is_empty() {
                    continue;
                }
                self.identifier = Some(text);
                self.phase = if self.prompt_seen {
                    Phase::AwaitingPassword
                } else {
                    Phase::AwaitingPasswordPrompt
                };
                continue;
            }

            let secret = decode_line(&line);
            let accepted = self
                .identifier
                .as_deref()
                .is_some_and(|id| self.credentials.verify(id, &secret));
            if !accepted {
                return self.reject("credentials did not match");
            }
            self.phase = Phase::Authenticated;
            out.extend_from_slice(&line);
            out.extend_from_slice(&self.lines.take_remaining());
            return Verdict::Release(out.freeze());
        }

        match self.phase {
            Phase::AwaitingPasswordPrompt => {
                out.extend_from_slice(&self.lines.take_remaining());
            }
            Phase::AwaitingFirstMessage if self.lines.len() > MAX_LOGIN_LINE => {
                self.lines.clear();
                return Verdict::Abort;
            }
            Phase::AwaitingPassword if self.lines.len() > MAX_LOGIN_LINE => {
                return self.reject("password line too long");
            }
            _ => {}
        }
        Verdict::Forward(out.freeze())
    }

    fn reject(&mut self, reason: &'static str) -> Verdict {
        self.phase = Phase::Rejected;
        self.rejection_reason = reason;
        self.lines.clear();
        Verdict::Reject
    }

    /// The client closed its side; returns buffered bytes to flush
    ///
    /// A partial password is never forwarded.
    pub fn on_client_eof(&mut self) -> Bytes {
        if self.phase == Phase::AwaitingPassword {
            self.lines.clear();
            return Bytes::new();
        }
        self.lines.take_remaining()
    }

    /// The password deadline passed
    pub fn on_password_timeout(&mut self) {
        if self.phase == Phase::AwaitingPassword {
            self.reject("password timeout");
        }
    }

    /// Settle the phase when the session ends
    ///
    /// A session that never saw the prompt marker is labelled
    /// `PassthroughNoAuthRequired`.
    pub fn finish(&mut self) -> Phase {
        if !self.prompt_seen && self.phase < Phase::AwaitingPassword {
            self.phase = Phase::PassthroughNoAuthRequired;
        }
        self.phase
    }

    /// Process events until the session is cancelled or a login deadline passes
    ///
    /// Returns only on a deadline (or if every sender is gone); in the normal
    /// case the session ends because one of the copy loops finishes first.
    pub async fn serve(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<Event>,
        config: &SessionConfig,
        ctx: &SessionContext,
    ) -> Outcome {
        let identifier_deadline = config.identifier_timeout.map(|t| Instant::now() + t);
        let mut password_deadline: Option<Instant> = None;

        loop {
            if self.phase == Phase::AwaitingPassword && password_deadline.is_none() {
                password_deadline = config.password_timeout.map(|t| Instant::now() + t);
            }
            let deadline = match self.phase {
                Phase::AwaitingFirstMessage => identifier_deadline,
                Phase::AwaitingPassword => password_deadline,
                _ => None,
            };

            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return Outcome::ClientClosed,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    return self.deadline_passed(ctx);
                }
            };

            match event {
                Event::PromptObserved => self.handle_prompt(ctx),
                Event::ClientData { data, reply } => {
                    let verdict = self.handle_client_data(&data, ctx);
                    let _ = reply.send(verdict);
                }
                Event::ClientEof { reply } => {
                    let _ = reply.send(self.on_client_eof());
                }
            }
        }
    }

    fn handle_prompt(&mut self, ctx: &SessionContext) {
        let advanced = self.on_prompt();
        debug!(session = ctx.id, advanced, "Password prompt observed");
        let mut event = LogEvent::new(LogEventKind::PromptObserved)
            .with_session_id(ctx.id)
            .with_peer(ctx.peer.clone())
            .with_phase(self.phase.as_str());
        if let Some(id) = &self.identifier {
            event = event.with_identifier(id.clone());
        }
        ctx.audit.record(&event);
    }

    fn handle_client_data(&mut self, data: &[u8], ctx: &SessionContext) -> Verdict {
        let had_identifier = self.identifier.is_some();
        let phase_before = self.phase;
        let verdict = self.on_client_data(data);
        let identifier = self.identifier.clone().unwrap_or_default();

        if !had_identifier && self.identifier.is_some() {
            info!(session = ctx.id, identifier = %identifier, "Captured identifier");
            ctx.audit.record(
                &LogEvent::new(LogEventKind::IdentifierCaptured)
                    .with_session_id(ctx.id)
                    .with_peer(ctx.peer.clone())
                    .with_identifier(identifier.clone())
                    .with_phase(self.phase.as_str()),
            );
        }

        match &verdict {
            Verdict::Release(_) if phase_before != Phase::Authenticated => {
                info!(session = ctx.id, identifier = %identifier, "Authentication successful");
                ctx.audit.record(&LogEvent::auth_decision(
                    ctx.id,
                    ctx.peer.clone(),
                    identifier,
                    Decision::Allowed,
                ));
            }
            Verdict::Reject if phase_before != Phase::Rejected => {
                warn!(session = ctx.id, identifier = %identifier, reason = self.rejection_reason, "Authentication failed, disconnecting client");
                ctx.audit.record(
                    &LogEvent::auth_decision(ctx.id, ctx.peer.clone(), identifier, Decision::Denied)
                        .with_reason(self.rejection_reason),
                );
            }
            Verdict::Abort => {
                warn!(session = ctx.id, limit = MAX_LOGIN_LINE, "First line too long, disconnecting client");
            }
            _ => {}
        }

        verdict
    }

    fn deadline_passed(&mut self, ctx: &SessionContext) -> Outcome {
        let identifier = self.identifier.clone().unwrap_or_default();
        match self.phase {
            Phase::AwaitingPassword => {
                self.on_password_timeout();
                warn!(session = ctx.id, identifier = %identifier, "Timed out waiting for password");
                ctx.audit.record(
                    &LogEvent::auth_decision(ctx.id, ctx.peer.clone(), identifier, Decision::Denied)
                        .with_reason(self.rejection_reason),
                );
                Outcome::Rejected
            }
            _ => {
                warn!(session = ctx.id, phase = %self.phase, "Timed out waiting for identifier");
                ctx.audit.record(
                    &LogEvent::new(LogEventKind::LoginTimeout)
                        .with_session_id(ctx.id)
                        .with_peer(ctx.peer.clone())
                        .with_phase(self.phase.as_str()),
                );
                Outcome::LoginTimeout
            }
        }
    }
}
