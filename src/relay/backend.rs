//! Backend (BPQ telnet port) connection
//!
//! Every accepted client gets its own backend connection, opened before
//! any client bytes are read.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::trace;

/// Default connection timeout for the backend
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Address of the backend telnet service
#[derive(Debug, Clone)]
pub struct Backend {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl Backend {
    /// Create a backend connector
    ///
    /// # Arguments
    /// * `host` - Host name or IP address of the BPQ node
    /// * `port` - Telnet port of the BPQ node
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` for display
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open a new connection to the backend with timeout
    pub async fn connect(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            Error::BackendUnavailable(format!(
                "Connection to backend at {} timed out after {:?}",
                self.addr(),
                self.connect_timeout
            ))
        })?
        .map_err(|e| {
            Error::BackendUnavailable(format!(
                "Failed to connect to backend at {}: {}",
                self.addr(),
                e
            ))
        })?;

        // Interactive traffic: do not hold back small writes
        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "Failed to set TCP_NODELAY on backend connection");
        }

        trace!(backend = %self.addr(), "Connected to backend");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_backend_new() {
        let backend = Backend::new("127.0.0.1", 8772);
        assert_eq!(backend.host(), "127.0.0.1");
        assert_eq!(backend.port(), 8772);
        assert_eq!(backend.addr(), "127.0.0.1:8772");
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let backend = Backend::new("127.0.0.1", port);
        let (connected, accepted) = tokio::join!(backend.connect(), listener.accept());
        assert!(connected.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let backend = Backend::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(2));
        let err = backend.connect().await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert!(err.to_string().contains("backend"));
    }
}
