//! Command implementations for bpq-auth-proxy CLI

pub mod completion;
pub mod config;
pub mod run;
pub mod users;
pub mod version;
