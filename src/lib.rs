//! bpq-auth-proxy - authenticating telnet relay for BPQ nodes
//!
//! This library sits between telnet clients and a BPQ packet-radio BBS.
//! It watches the login dialogue, checks the callsign/password pair against
//! a local credential file once the node asks for a password, and relays
//! bytes unmodified in both directions for sessions that pass.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod relay;

pub use error::{Error, Result};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");
