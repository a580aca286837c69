use std::path::PathBuf;

use logdeck_logs::{LogSource, LogSubscription, SourceError};
use logdeck_types::SessionFile;

use crate::follow::{FileFollower, FollowOptions};
use crate::hub::NativeLogHub;
use crate::sessions::SessionDirectory;

/// Log source backed by the local backend process: a live hub plus the
/// directory of session log files it writes.
#[derive(Clone)]
pub struct NativeBackend {
    hub: NativeLogHub,
    sessions: SessionDirectory,
}

impl NativeBackend {
    pub fn new(hub: NativeLogHub, sessions: SessionDirectory) -> Self {
        Self { hub, sessions }
    }

    /// Backend with a fresh hub over `session_dir`
    pub fn with_session_dir(session_dir: impl Into<PathBuf>) -> Self {
        Self::new(NativeLogHub::new(), SessionDirectory::new(session_dir))
    }

    pub fn hub(&self) -> &NativeLogHub {
        &self.hub
    }

    pub fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    /// Tail a session file into the live hub
    pub fn follow(&self, name: &str, options: FollowOptions) -> FileFollower {
        FileFollower::start(self.sessions.path_of(name), self.hub.clone(), options)
    }
}

impl LogSource for NativeBackend {
    fn subscribe(&self) -> Result<LogSubscription, SourceError> {
        self.hub.subscribe()
    }

    async fn list_session_files(&self) -> Result<Vec<SessionFile>, SourceError> {
        self.sessions.list().await
    }

    async fn read_session_file(&self, path: &str) -> Result<String, SourceError> {
        self.sessions.read(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logdeck_logs::{IngestOptions, LogIngestor, LogStore, SessionBrowser};
    use logdeck_types::{LogLevel, RawLogRecord};
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for_len(store: &LogStore, len: usize) {
        let mut revisions = store.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.len() < len {
                revisions.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_hub_batches_reach_store() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(NativeBackend::with_session_dir(dir.path()));
        let store = LogStore::default();
        let _ingestor = LogIngestor::start(
            Arc::clone(&backend),
            store.clone(),
            IngestOptions::default(),
        );

        backend.hub().emit(vec![
            RawLogRecord::new("WARN", "disk almost full"),
            RawLogRecord::new("verbose", "unknown level"),
        ]);
        wait_for_len(&store, 2).await;

        let entries = store.entries();
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[1].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_offline_backend_refuses_subscriptions() {
        let dir = tempfile::tempdir().unwrap();
        let backend = NativeBackend::with_session_dir(dir.path());
        backend.hub().set_online(false);
        assert!(matches!(backend.subscribe(), Err(SourceError::Disconnected)));
    }

    #[tokio::test]
    async fn test_session_browser_over_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("2024-01-15.log"),
            "2024-01-15T10:30:00Z [INFO] booted\n",
        )
        .unwrap();

        let backend = Arc::new(NativeBackend::with_session_dir(dir.path()));
        let store = LogStore::default();
        let browser = SessionBrowser::new(backend, store.clone());

        let files = browser.refresh().await.unwrap();
        assert_eq!(files.len(), 1);

        let content = browser.open("2024-01-15.log").await.unwrap().unwrap();
        assert!(content.content.contains("booted"));
        assert_eq!(store.selected_log_file().as_deref(), Some("2024-01-15.log"));
        // Session content never touches the live buffer
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_follow_feeds_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("live.log"), "[ERROR] crashed\n").unwrap();

        let backend = Arc::new(NativeBackend::with_session_dir(dir.path()));
        let store = LogStore::default();
        let _ingestor = LogIngestor::start(
            Arc::clone(&backend),
            store.clone(),
            IngestOptions::default(),
        );
        let _follower = backend.follow(
            "live.log",
            FollowOptions {
                poll_interval: Duration::from_millis(10),
                from_start: true,
            },
        );

        wait_for_len(&store, 1).await;
        let entry = &store.entries()[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "crashed");
    }
}
