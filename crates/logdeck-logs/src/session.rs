use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use logdeck_types::{SessionFile, SessionFileContent};

use crate::error::SourceError;
use crate::ingest::LogSource;
use crate::store::LogStore;

/// Browses historical session files through the native source.
///
/// These are one-shot requests, independent of the live buffer. When several
/// reads are in flight the most recently requested one wins; responses to
/// superseded requests are discarded.
pub struct SessionBrowser<S> {
    source: Arc<S>,
    store: LogStore,
    /// Generation of the latest `open` request
    generation: Arc<AtomicU64>,
}

impl<S> Clone for SessionBrowser<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            store: self.store.clone(),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<S: LogSource> SessionBrowser<S> {
    pub fn new(source: Arc<S>, store: LogStore) -> Self {
        Self {
            source,
            store,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reload the session file list into the store, newest first
    pub async fn refresh(&self) -> Result<Vec<SessionFile>, SourceError> {
        let mut files = self.source.list_session_files().await?;
        files.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        tracing::debug!(count = files.len(), "loaded session file list");
        self.store.set_log_files(files.clone());
        Ok(files)
    }

    /// Select a file by name and load its content.
    ///
    /// Returns `Ok(None)` if a later `open` or `close` superseded this one.
    pub async fn open(&self, name: &str) -> Result<Option<SessionFileContent>, SourceError> {
        let file = self
            .store
            .log_files()
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SourceError::NotFound(name.to_string()))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.select_log_file(Some(file.name.clone()));

        let result = self.source.read_session_file(&file.path).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(file = %file.name, "discarding superseded session file read");
            return Ok(None);
        }

        let content = SessionFileContent {
            name: file.name,
            path: file.path,
            content: result?,
        };
        self.store.set_session_content(Some(content.clone()));
        Ok(Some(content))
    }

    /// Deselect the current file and invalidate in-flight reads
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.select_log_file(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::TestSource;
    use std::time::Duration;

    fn file(name: &str, modified_at: i64) -> SessionFile {
        SessionFile {
            name: name.to_string(),
            path: format!("/sessions/{name}"),
            size_bytes: 10,
            modified_at,
        }
    }

    fn source_with(files: &[(&str, i64, &str, u64)]) -> Arc<TestSource> {
        let source = TestSource::new();
        for (name, modified_at, content, delay_ms) in files {
            source.files.lock().push(file(name, *modified_at));
            source.contents.lock().insert(
                format!("/sessions/{name}"),
                (content.to_string(), Duration::from_millis(*delay_ms)),
            );
        }
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_refresh_sorts_newest_first() {
        let source = source_with(&[("old.log", 1, "", 0), ("new.log", 5, "", 0)]);
        let store = LogStore::default();
        let browser = SessionBrowser::new(source, store.clone());

        browser.refresh().await.unwrap();

        let names: Vec<_> = store.log_files().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["new.log", "old.log"]);
    }

    #[tokio::test]
    async fn test_open_loads_content_without_touching_buffer() {
        let source = source_with(&[("a.log", 1, "line one\nline two", 0)]);
        let store = LogStore::default();
        let browser = SessionBrowser::new(source, store.clone());
        browser.refresh().await.unwrap();

        let content = browser.open("a.log").await.unwrap().unwrap();

        assert_eq!(content.content, "line one\nline two");
        assert_eq!(store.selected_log_file().as_deref(), Some("a.log"));
        assert_eq!(store.session_content(), Some(content));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_open_unknown_file() {
        let store = LogStore::default();
        let browser = SessionBrowser::new(Arc::new(TestSource::new()), store);
        assert!(matches!(
            browser.open("missing.log").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_requested_wins() {
        let source = source_with(&[("slow.log", 1, "slow", 100), ("fast.log", 2, "fast", 10)]);
        let store = LogStore::default();
        let browser = SessionBrowser::new(source, store.clone());
        browser.refresh().await.unwrap();

        let first = browser.clone();
        let slow = tokio::spawn(async move { first.open("slow.log").await });
        tokio::task::yield_now().await;
        let fast = browser.open("fast.log").await.unwrap();

        // The slow read resolves last but was requested first
        let slow = slow.await.unwrap().unwrap();

        assert!(slow.is_none());
        assert_eq!(fast.map(|c| c.content).as_deref(), Some("fast"));
        assert_eq!(store.session_content().map(|c| c.content).as_deref(), Some("fast"));
        assert_eq!(store.selected_log_file().as_deref(), Some("fast.log"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_in_flight_read() {
        let source = source_with(&[("a.log", 1, "content", 50)]);
        let store = LogStore::default();
        let browser = SessionBrowser::new(source, store.clone());
        browser.refresh().await.unwrap();

        let reader = browser.clone();
        let pending = tokio::spawn(async move { reader.open("a.log").await });
        tokio::task::yield_now().await;
        browser.close();

        assert!(pending.await.unwrap().unwrap().is_none());
        assert!(store.selected_log_file().is_none());
        assert!(store.session_content().is_none());
    }
}
