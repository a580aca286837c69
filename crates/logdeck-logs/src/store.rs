//! Process-wide log store backing the log drawer and toolbar.
//!
//! The whole state sits behind a single lock so every mutator is applied
//! atomically. Reads go through the filter engine on demand, with the last
//! result memoized on `(buffer revision, filter)`.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use logdeck_types::{
    ArcLogEntry, LogEntry, LogFilter, LogLevel, SessionFile, SessionFileContent, TimeRange,
};

use crate::buffer::{LevelCounts, LogBuffer};
use crate::filter::{CompiledFilter, TextMatcher};

/// Lower bound for `max_logs`; smaller values are raised to this
pub const MIN_MAX_LOGS: usize = 100;

pub const DEFAULT_MAX_LOGS: usize = 5000;

/// Initial settings for a store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub max_logs: usize,
    pub auto_scroll: bool,
    pub filter: LogFilter,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            auto_scroll: true,
            filter: LogFilter::default(),
        }
    }
}

/// Partial update merged into the current filter by [`LogStore::set_filter`]
#[derive(Clone, Debug, Default)]
pub struct FilterUpdate {
    pub levels: Option<BTreeSet<LogLevel>>,
    pub search: Option<String>,
    pub use_regex: Option<bool>,
    /// `Some(None)` clears the bound
    pub start_time: Option<Option<i64>>,
    pub end_time: Option<Option<i64>>,
    pub search_fields: Option<bool>,
}

impl FilterUpdate {
    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn use_regex(mut self, use_regex: bool) -> Self {
        self.use_regex = Some(use_regex);
        self
    }

    pub fn time_range(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn search_fields(mut self, search_fields: bool) -> Self {
        self.search_fields = Some(search_fields);
        self
    }

    fn apply(self, filter: &mut LogFilter) {
        if let Some(levels) = self.levels {
            filter.levels = levels;
        }
        if let Some(search) = self.search {
            filter.search = search;
        }
        if let Some(use_regex) = self.use_regex {
            filter.use_regex = use_regex;
        }
        if let Some(start) = self.start_time {
            filter.start_time = start;
        }
        if let Some(end) = self.end_time {
            filter.end_time = end;
        }
        if let Some(search_fields) = self.search_fields {
            filter.search_fields = search_fields;
        }
    }
}

/// Toolbar statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogStats {
    pub total: usize,
    pub matching: usize,
    pub paused: bool,
    pub level_counts: LevelCounts,
}

struct StoreState {
    buffer: LogBuffer,
    max_logs: usize,
    filter: LogFilter,
    /// Filter restored by `reset_filter`
    initial_filter: LogFilter,
    auto_scroll: bool,
    paused: bool,
    drawer_open: bool,
    log_files: Vec<SessionFile>,
    selected_log_file: Option<String>,
    session_content: Option<SessionFileContent>,
}

/// Cache for compiled matchers and filtered results
#[derive(Default)]
struct FilterCache {
    matcher_key: Option<(String, bool)>,
    matcher: Option<TextMatcher>,
    /// Number of matcher compilations so far
    compilations: u64,
    result_key: Option<(u64, LogFilter)>,
    entries: Vec<ArcLogEntry>,
}

impl FilterCache {
    fn compiled(&mut self, filter: &LogFilter) -> CompiledFilter {
        let key = (filter.search.clone(), filter.use_regex);
        let matcher = match (&self.matcher_key, &self.matcher) {
            (Some(cached), Some(matcher)) if *cached == key => matcher.clone(),
            _ => {
                let matcher = TextMatcher::compile(&filter.search, filter.use_regex);
                if let Some(error) = matcher.error() {
                    tracing::warn!(
                        pattern = %filter.search,
                        %error,
                        "invalid regex in log filter, no entries will match"
                    );
                }
                self.compilations += 1;
                self.matcher_key = Some(key);
                self.matcher = Some(matcher.clone());
                matcher
            }
        };
        CompiledFilter::with_matcher(filter, matcher)
    }

    fn filtered(&mut self, buffer: &LogBuffer, filter: &LogFilter) -> Vec<ArcLogEntry> {
        if let Some((revision, cached)) = &self.result_key {
            if *revision == buffer.revision() && cached == filter {
                return self.entries.clone();
            }
        }

        let entries: Vec<ArcLogEntry> = if filter.is_unconstrained() {
            buffer.all()
        } else {
            let compiled = self.compiled(filter);
            buffer
                .iter()
                .filter(|e| compiled.matches(e))
                .cloned()
                .collect()
        };

        self.result_key = Some((buffer.revision(), filter.clone()));
        self.entries = entries.clone();
        entries
    }
}

/// Shared handle to the log store. Clones refer to the same state.
#[derive(Clone)]
pub struct LogStore {
    state: Arc<RwLock<StoreState>>,
    cache: Arc<Mutex<FilterCache>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl LogStore {
    pub fn new(config: StoreConfig) -> Self {
        let max_logs = config.max_logs.max(MIN_MAX_LOGS);
        let (revision, _) = watch::channel(0);

        Self {
            state: Arc::new(RwLock::new(StoreState {
                buffer: LogBuffer::new(max_logs),
                max_logs,
                initial_filter: config.filter.clone(),
                filter: config.filter,
                auto_scroll: config.auto_scroll,
                paused: false,
                drawer_open: false,
                log_files: Vec::new(),
                selected_log_file: None,
                session_content: None,
            })),
            cache: Arc::new(Mutex::new(FilterCache::default())),
            revision: Arc::new(revision),
        }
    }

    /// Receive a revision number that changes after every mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let result = f(&mut self.state.write());
        self.notify();
        result
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Append records in arrival order, evicting the oldest beyond `max_logs`.
    ///
    /// Dropped entirely while paused. Returns the number of records stored.
    pub fn append(&self, records: Vec<LogEntry>) -> usize {
        if records.is_empty() {
            return 0;
        }

        let mut state = self.state.write();
        if state.paused {
            return 0;
        }

        let count = records.len();
        let evicted = state.buffer.push_batch(records);
        drop(state);

        if evicted > 0 {
            tracing::trace!(evicted, "evicted oldest log entries");
        }
        self.notify();
        count
    }

    /// Empty the buffer. Filter, capacity, pause, and file state are untouched.
    pub fn clear(&self) {
        self.mutate(|state| state.buffer.clear());
    }

    // ------------------------------------------------------------------
    // Filter
    // ------------------------------------------------------------------

    /// Merge a partial update into the filter. Regex validity is checked at read time.
    pub fn set_filter(&self, update: FilterUpdate) {
        self.mutate(|state| update.apply(&mut state.filter));
    }

    pub fn set_levels(&self, levels: impl IntoIterator<Item = LogLevel>) {
        self.set_filter(FilterUpdate::default().levels(levels));
    }

    /// Add or remove a single level from the filter.
    ///
    /// The last remaining level stays selected; an empty set is only
    /// reachable through [`LogStore::set_levels`].
    pub fn toggle_level(&self, level: LogLevel) {
        self.mutate(|state| {
            let levels = &mut state.filter.levels;
            if levels.len() == 1 && levels.contains(&level) {
                return;
            }
            if !levels.remove(&level) {
                levels.insert(level);
            }
        });
    }

    pub fn set_search(&self, search: impl Into<String>) {
        self.set_filter(FilterUpdate::default().search(search));
    }

    pub fn set_use_regex(&self, use_regex: bool) {
        self.set_filter(FilterUpdate::default().use_regex(use_regex));
    }

    pub fn set_search_fields(&self, search_fields: bool) {
        self.set_filter(FilterUpdate::default().search_fields(search_fields));
    }

    /// Set a custom time window; `(None, None)` reverts to all time
    pub fn set_time_range(&self, start: Option<i64>, end: Option<i64>) {
        self.set_filter(FilterUpdate::default().time_range(start, end));
    }

    /// Apply a preset window ending at `now_ms`
    pub fn apply_time_range(&self, range: TimeRange, now_ms: i64) {
        let (start, end) = range.window(now_ms);
        self.set_time_range(start, end);
    }

    /// Restore the filter the store was created with
    pub fn reset_filter(&self) {
        self.mutate(|state| state.filter = state.initial_filter.clone());
    }

    pub fn filter(&self) -> LogFilter {
        self.state.read().filter.clone()
    }

    /// Pending notice for an invalid regex in the current filter
    pub fn filter_error(&self) -> Option<String> {
        let state = self.state.read();
        let mut cache = self.cache.lock();
        cache.compiled(&state.filter).error().map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Capacity, pause, and UI flags
    // ------------------------------------------------------------------

    /// Set the capacity, raising values below [`MIN_MAX_LOGS`]
    pub fn set_max_logs(&self, max_logs: usize) {
        let max_logs = max_logs.max(MIN_MAX_LOGS);
        let evicted = self.mutate(|state| {
            state.max_logs = max_logs;
            state.buffer.set_capacity(max_logs)
        });
        if evicted > 0 {
            tracing::trace!(evicted, max_logs, "capacity lowered, evicted oldest log entries");
        }
    }

    pub fn max_logs(&self) -> usize {
        self.state.read().max_logs
    }

    pub fn toggle_pause(&self) {
        self.mutate(|state| state.paused = !state.paused);
    }

    pub fn set_paused(&self, paused: bool) {
        self.mutate(|state| state.paused = paused);
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().paused
    }

    pub fn toggle_auto_scroll(&self) {
        self.mutate(|state| state.auto_scroll = !state.auto_scroll);
    }

    pub fn set_auto_scroll(&self, auto_scroll: bool) {
        self.mutate(|state| state.auto_scroll = auto_scroll);
    }

    pub fn auto_scroll(&self) -> bool {
        self.state.read().auto_scroll
    }

    pub fn open_drawer(&self) {
        self.mutate(|state| state.drawer_open = true);
    }

    pub fn close_drawer(&self) {
        self.mutate(|state| state.drawer_open = false);
    }

    pub fn toggle_drawer(&self) {
        self.mutate(|state| state.drawer_open = !state.drawer_open);
    }

    pub fn is_drawer_open(&self) -> bool {
        self.state.read().drawer_open
    }

    // ------------------------------------------------------------------
    // Session files
    // ------------------------------------------------------------------

    pub fn set_log_files(&self, files: Vec<SessionFile>) {
        self.mutate(|state| state.log_files = files);
    }

    pub fn log_files(&self) -> Vec<SessionFile> {
        self.state.read().log_files.clone()
    }

    /// Select a session file by name. Content of a different file is dropped.
    pub fn select_log_file(&self, name: Option<String>) {
        self.mutate(|state| {
            if state.session_content.as_ref().map(|c| &c.name) != name.as_ref() {
                state.session_content = None;
            }
            state.selected_log_file = name;
        });
    }

    pub fn selected_log_file(&self) -> Option<String> {
        self.state.read().selected_log_file.clone()
    }

    pub fn set_session_content(&self, content: Option<SessionFileContent>) {
        self.mutate(|state| state.session_content = content);
    }

    pub fn session_content(&self) -> Option<SessionFileContent> {
        self.state.read().session_content.clone()
    }

    // ------------------------------------------------------------------
    // Derived queries
    // ------------------------------------------------------------------

    /// Entries passing the current filter, in arrival order
    pub fn filtered_entries(&self) -> Vec<ArcLogEntry> {
        let state = self.state.read();
        let mut cache = self.cache.lock();
        cache.filtered(&state.buffer, &state.filter)
    }

    /// Matching entries appended at or after sequence `cursor`, plus the
    /// cursor to pass next time. Used to follow the buffer incrementally.
    pub fn filtered_since(&self, cursor: u64) -> (Vec<ArcLogEntry>, u64) {
        let state = self.state.read();
        let first = state.buffer.first_sequence();
        let skip = cursor.saturating_sub(first) as usize;

        let mut cache = self.cache.lock();
        let compiled = cache.compiled(&state.filter);
        let entries = state
            .buffer
            .iter()
            .skip(skip)
            .filter(|e| compiled.matches(e))
            .cloned()
            .collect();

        (entries, state.buffer.pushed_total())
    }

    /// All stored entries regardless of filter
    pub fn entries(&self) -> Vec<ArcLogEntry> {
        self.state.read().buffer.all()
    }

    pub fn len(&self) -> usize {
        self.state.read().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().buffer.is_empty()
    }

    pub fn stats(&self) -> LogStats {
        let state = self.state.read();
        let matching = self.cache.lock().filtered(&state.buffer, &state.filter).len();

        LogStats {
            total: state.buffer.len(),
            matching,
            paused: state.paused,
            level_counts: state.buffer.level_counts(),
        }
    }

    #[cfg(test)]
    fn matcher_compilations(&self) -> u64 {
        self.cache.lock().compilations
    }
}
