//! Authenticating telnet relay
//!
//! A [`Server`] accepts clients, a [`Proxy`] pairs each one with a fresh
//! backend connection, and a [`Session`] relays bytes both ways while the
//! [`Arbiter`] decides what client data may reach the backend during login.

mod arbiter;
mod backend;
mod line;
mod link;
mod prompt;
mod proxy;
mod server;
mod session;

pub use arbiter::{Arbiter, Event, Phase, Verdict};
pub use backend::Backend;
pub use line::{LineBuffer, decode_line};
pub use link::Link;
pub use prompt::PromptDetector;
pub use proxy::Proxy;
pub use server::Server;
pub use session::{
    MAX_LOGIN_LINE, Outcome, RELAY_BUFFER_SIZE, Session, SessionConfig, SessionContext, SessionReport,
};
