//! Where sessions get their credential snapshot from

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::CredentialStore;
use crate::config::CredentialReload;

/// Supplier of credential snapshots for new sessions
#[derive(Debug)]
pub enum CredentialSource {
    /// Re-read the file for every session
    PerSession { path: PathBuf },
    /// One snapshot shared by all sessions, replaced by [`CredentialSource::reload`]
    Shared {
        path: PathBuf,
        current: RwLock<Arc<CredentialStore>>,
    },
}

impl CredentialSource {
    /// Source that reads the file again for every session
    pub fn per_session<P: AsRef<Path>>(path: P) -> Self {
        Self::PerSession {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Source that loads the file once and shares it until reloaded
    pub async fn shared<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let store = CredentialStore::load(&path).await;
        info!(path = %path.display(), entries = store.len(), "Loaded shared credentials");
        Self::Shared {
            path,
            current: RwLock::new(Arc::new(store)),
        }
    }

    /// Build the source selected by the reload policy
    pub async fn from_policy<P: AsRef<Path>>(policy: CredentialReload, path: P) -> Self {
        match policy {
            CredentialReload::PerSession => Self::per_session(path),
            CredentialReload::OnSignal => Self::shared(path).await,
        }
    }

    /// Path of the credential file
    pub fn path(&self) -> &Path {
        match self {
            Self::PerSession { path } | Self::Shared { path, .. } => path,
        }
    }

    /// Snapshot for one session
    pub async fn snapshot(&self) -> Arc<CredentialStore> {
        match self {
            Self::PerSession { path } => Arc::new(CredentialStore::load(path).await),
            Self::Shared { current, .. } => Arc::clone(&*current.read().await),
        }
    }

    /// Re-read the file into the shared snapshot
    ///
    /// Returns the new entry count, or `None` for a per-session source, which
    /// has nothing to refresh. Sessions already running keep their old snapshot.
    pub async fn reload(&self) -> Option<usize> {
        match self {
            Self::PerSession { .. } => None,
            Self::Shared { path, current } => {
                let store = Arc::new(CredentialStore::load(path).await);
                let count = store.len();
                *current.write().await = store;
                info!(path = %path.display(), entries = count, "Reloaded shared credentials");
                Some(count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_per_session_sees_file_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(&path, "N0CALL,secret1\n").unwrap();

        let source = CredentialSource::per_session(&path);
        assert!(source.snapshot().await.verify("N0CALL", "secret1"));

        std::fs::write(&path, "N0CALL,changed\n").unwrap();
        assert!(source.snapshot().await.verify("N0CALL", "changed"));
        assert_eq!(source.reload().await, None);
    }

    #[tokio::test]
    async fn test_shared_only_changes_on_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(&path, "N0CALL,secret1\n").unwrap();

        let source = CredentialSource::from_policy(CredentialReload::OnSignal, &path).await;
        let before = source.snapshot().await;

        std::fs::write(&path, "N0CALL,changed\nG4ABC,pw\n").unwrap();
        assert!(source.snapshot().await.verify("N0CALL", "secret1"));

        assert_eq!(source.reload().await, Some(2));
        assert!(source.snapshot().await.verify("N0CALL", "changed"));
        // Snapshots handed out earlier are unaffected
        assert!(before.verify("N0CALL", "secret1"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_closed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.csv");

        let source = CredentialSource::shared(&path).await;
        assert!(source.snapshot().await.is_empty());
        assert_eq!(source.path(), path.as_path());
    }
}
