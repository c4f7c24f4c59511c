//! Exit code definitions for bpq-auth-proxy
//!
//! Provides standardized exit codes for different error conditions.

use crate::Error;

/// Exit codes for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Configuration error (invalid config, unreadable credential file)
    ConfigError = 2,
    /// Socket error (cannot bind the listen port)
    SocketError = 3,
    /// Backend error (cannot reach the BPQ node)
    BackendError = 4,
}

impl ExitCode {
    /// Pick the exit code for an error returned by a command
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.chain().find_map(|cause| cause.downcast_ref::<Error>()) {
            Some(Error::Config(_) | Error::TomlParse(_) | Error::Credentials(_)) => {
                Self::ConfigError
            }
            Some(Error::Socket(_)) => Self::SocketError,
            Some(Error::BackendUnavailable(_)) => Self::BackendError,
            _ => Self::GeneralError,
        }
    }
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(u8::from(ExitCode::Success), 0);
        assert_eq!(u8::from(ExitCode::ConfigError), 2);
        assert_eq!(u8::from(ExitCode::BackendError), 4);
    }

    #[test]
    fn test_for_error_sees_through_context() {
        let err = Err::<(), _>(Error::Socket("in use".to_string()))
            .context("Failed to start listener")
            .unwrap_err();
        assert_eq!(ExitCode::for_error(&err), ExitCode::SocketError);
    }

    #[test]
    fn test_for_error_config() {
        let err = anyhow::Error::new(Error::Config("bad".to_string()));
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
    }

    #[test]
    fn test_for_error_unknown() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    }
}
