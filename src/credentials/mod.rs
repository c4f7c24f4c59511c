//! Credential handling
//!
//! - `CredentialStore`: callsign to password snapshot parsed from CSV
//! - `CredentialSource`: hands each new session its snapshot

mod source;
mod store;

pub use source::CredentialSource;
pub use store::{CredentialStore, LoadReport};
