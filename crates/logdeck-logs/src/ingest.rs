use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logdeck_types::{LogEntry, RawLogRecord, SessionFile, now_millis};

use crate::error::SourceError;
use crate::store::LogStore;

/// The native backend's log boundary
pub trait LogSource: Send + Sync + 'static {
    /// Register for live record batches. Fails when the backend is unreachable.
    fn subscribe(&self) -> Result<LogSubscription, SourceError>;

    /// Historical session log files
    fn list_session_files(
        &self,
    ) -> impl Future<Output = Result<Vec<SessionFile>, SourceError>> + Send;

    /// Raw content of one historical file
    fn read_session_file(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// A live registration with the native log stream.
///
/// The stream ends (`next_batch` returns None) when the source disconnects.
/// Dropping the subscription unsubscribes.
pub struct LogSubscription {
    batches: mpsc::UnboundedReceiver<Vec<RawLogRecord>>,
    on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl LogSubscription {
    pub fn new(
        batches: mpsc::UnboundedReceiver<Vec<RawLogRecord>>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            batches,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Subscription with no unsubscribe hook
    pub fn from_receiver(batches: mpsc::UnboundedReceiver<Vec<RawLogRecord>>) -> Self {
        Self {
            batches,
            on_unsubscribe: None,
        }
    }

    pub async fn next_batch(&mut self) -> Option<Vec<RawLogRecord>> {
        self.batches.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// Wait before resubscribing after the source goes away
    pub reconnect_delay: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct IngestCounters {
    batches: AtomicU64,
    records: AtomicU64,
    dropped_paused: AtomicU64,
    disconnects: AtomicU64,
}

/// Snapshot of ingestion counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub batches: u64,
    pub records: u64,
    pub dropped_paused: u64,
    pub disconnects: u64,
}

/// Bridges the native log stream into a [`LogStore`].
///
/// Delivery is at-most-once: batches emitted while disconnected are lost.
pub struct LogIngestor {
    /// Cancellation token for stopping the task
    cancel: CancellationToken,

    task: Option<tokio::task::JoinHandle<()>>,

    counters: Arc<IngestCounters>,
}

impl LogIngestor {
    /// Subscribe to `source` and start forwarding into `store`.
    ///
    /// The first subscription is made before this returns, so batches emitted
    /// right after `start` are not missed. Must be called within a tokio runtime.
    pub fn start<S: LogSource>(source: Arc<S>, store: LogStore, options: IngestOptions) -> Self {
        let cancel = CancellationToken::new();
        let counters = Arc::new(IngestCounters::default());
        let initial = match source.subscribe() {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::debug!(error = %e, "log source unavailable at startup");
                None
            }
        };

        let task = tokio::spawn(run_ingest(
            source,
            store,
            options,
            initial,
            cancel.clone(),
            Arc::clone(&counters),
        ));

        Self {
            cancel,
            task: Some(task),
            counters,
        }
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            batches: self.counters.batches.load(Ordering::Relaxed),
            records: self.counters.records.load(Ordering::Relaxed),
            dropped_paused: self.counters.dropped_paused.load(Ordering::Relaxed),
            disconnects: self.counters.disconnects.load(Ordering::Relaxed),
        }
    }

    /// Check if the ingest task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop forwarding and drop the subscription
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LogIngestor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ingest<S: LogSource>(
    source: Arc<S>,
    store: LogStore,
    options: IngestOptions,
    mut initial: Option<LogSubscription>,
    cancel: CancellationToken,
    counters: Arc<IngestCounters>,
) {
    loop {
        let subscription = match initial.take() {
            Some(subscription) => Ok(subscription),
            None => source.subscribe(),
        };

        match subscription {
            Ok(mut subscription) => {
                tracing::debug!("subscribed to native log stream");
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,

                        batch = subscription.next_batch() => {
                            match batch {
                                Some(batch) => forward(&store, &counters, batch),
                                // Source went away
                                None => break,
                            }
                        }
                    }
                }
                counters.disconnects.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("native log stream disconnected");
            }
            Err(e) => {
                tracing::debug!(error = %e, "log source unavailable, will retry");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(options.reconnect_delay) => {}
        }
    }
}

fn forward(store: &LogStore, counters: &IngestCounters, batch: Vec<RawLogRecord>) {
    if batch.is_empty() {
        return;
    }

    let len = batch.len() as u64;
    counters.batches.fetch_add(1, Ordering::Relaxed);

    // The store drops while paused anyway; skip the conversion
    if store.is_paused() {
        counters.dropped_paused.fetch_add(len, Ordering::Relaxed);
        return;
    }

    let now = now_millis();
    let entries: Vec<LogEntry> = batch.into_iter().map(|r| r.into_entry(now)).collect();
    let stored = store.append(entries) as u64;

    counters.records.fetch_add(stored, Ordering::Relaxed);
    counters
        .dropped_paused
        .fetch_add(len - stored, Ordering::Relaxed);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory source: tests push batches and can cut the connection
    #[derive(Default)]
    pub(crate) struct TestSource {
        senders: Mutex<Vec<mpsc::UnboundedSender<Vec<RawLogRecord>>>>,
        pub(crate) available: Mutex<bool>,
        pub(crate) files: Mutex<Vec<SessionFile>>,
        /// path -> (content, delay before responding)
        pub(crate) contents: Mutex<HashMap<String, (String, Duration)>>,
        pub(crate) subscribe_calls: AtomicU64,
    }

    impl TestSource {
        pub(crate) fn new() -> Self {
            Self {
                available: Mutex::new(true),
                ..Default::default()
            }
        }

        pub(crate) fn emit(&self, batch: Vec<RawLogRecord>) {
            self.senders
                .lock()
                .retain(|tx| tx.send(batch.clone()).is_ok());
        }

        pub(crate) fn disconnect(&self) {
            self.senders.lock().clear();
        }

        pub(crate) fn subscribers(&self) -> usize {
            self.senders.lock().len()
        }
    }

    impl LogSource for TestSource {
        fn subscribe(&self) -> Result<LogSubscription, SourceError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            if !*self.available.lock() {
                return Err(SourceError::Disconnected);
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().push(tx);
            Ok(LogSubscription::from_receiver(rx))
        }

        async fn list_session_files(&self) -> Result<Vec<SessionFile>, SourceError> {
            Ok(self.files.lock().clone())
        }

        async fn read_session_file(&self, path: &str) -> Result<String, SourceError> {
            let found = self.contents.lock().get(path).cloned();
            let (content, delay) = found.ok_or_else(|| SourceError::NotFound(path.to_string()))?;
            tokio::time::sleep(delay).await;
            Ok(content)
        }
    }

    fn record(message: &str) -> RawLogRecord {
        RawLogRecord {
            timestamp: Some(1),
            ..RawLogRecord::new("info", message)
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn messages(store: &LogStore) -> Vec<String> {
        store.entries().iter().map(|e| e.message.clone()).collect()
    }

    #[tokio::test]
    async fn test_forwards_batches_in_order() {
        let source = Arc::new(TestSource::new());
        let store = LogStore::default();
        let ingestor = LogIngestor::start(Arc::clone(&source), store.clone(), IngestOptions::default());

        source.emit(vec![record("a"), record("b")]);
        source.emit(vec![record("c")]);
        settle().await;

        assert_eq!(messages(&store), vec!["a", "b", "c"]);
        let stats = ingestor.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.records, 3);
    }

    #[tokio::test]
    async fn test_normalizes_records() {
        let source = Arc::new(TestSource::new());
        let store = LogStore::default();
        let _ingestor = LogIngestor::start(Arc::clone(&source), store.clone(), IngestOptions::default());

        source.emit(vec![RawLogRecord::new("WARNING", "low disk"), RawLogRecord::new("bogus", "?")]);
        settle().await;

        let entries = store.entries();
        assert_eq!(entries[0].level, logdeck_types::LogLevel::Warn);
        assert_eq!(entries[1].level, logdeck_types::LogLevel::Info);
        assert!(entries[0].timestamp > 0);
    }

    #[tokio::test]
    async fn test_paused_batches_are_dropped() {
        let source = Arc::new(TestSource::new());
        let store = LogStore::default();
        let ingestor = LogIngestor::start(Arc::clone(&source), store.clone(), IngestOptions::default());

        store.set_paused(true);
        source.emit(vec![record("lost")]);
        settle().await;
        assert!(store.is_empty());

        store.set_paused(false);
        source.emit(vec![record("kept")]);
        settle().await;

        assert_eq!(messages(&store), vec!["kept"]);
        assert_eq!(ingestor.stats().dropped_paused, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_disconnect() {
        let source = Arc::new(TestSource::new());
        let store = LogStore::default();
        let options = IngestOptions {
            reconnect_delay: Duration::from_millis(50),
        };
        let ingestor = LogIngestor::start(Arc::clone(&source), store.clone(), options);

        source.emit(vec![record("before")]);
        settle().await;

        *source.available.lock() = false;
        source.disconnect();
        settle().await;
        source.emit(vec![record("during")]);

        // One failed retry while the backend is down
        tokio::time::sleep(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(source.subscribers(), 0);

        *source.available.lock() = true;
        tokio::time::sleep(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(source.subscribers(), 1);

        source.emit(vec![record("after")]);
        settle().await;

        assert_eq!(messages(&store), vec!["before", "after"]);
        assert_eq!(ingestor.stats().disconnects, 1);
        assert!(ingestor.is_running());
    }

    #[tokio::test]
    async fn test_stop_unsubscribes() {
        let source = Arc::new(TestSource::new());
        let store = LogStore::default();
        let mut ingestor = LogIngestor::start(Arc::clone(&source), store.clone(), IngestOptions::default());

        ingestor.stop();
        settle().await;
        source.emit(vec![record("late")]);

        assert!(store.is_empty());
        assert_eq!(source.subscribers(), 0);
        assert!(!ingestor.is_running());
    }

    #[test]
    fn test_subscription_drop_runs_hook() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicU64::new(0));
        let hook = Arc::clone(&fired);

        let subscription = LogSubscription::new(rx, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        });
        subscription.unsubscribe();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
