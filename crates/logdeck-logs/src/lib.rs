//! Log processing for logdeck
//!
//! This crate provides the bounded log store behind the log drawer, the filter
//! engine it reads through, ingestion from the native log source, session file
//! browsing, and export.

mod buffer;
mod error;
mod export;
mod filter;
mod ingest;
mod parser;
mod session;
mod store;

pub use buffer::{LevelCounts, LogBuffer};
pub use error::{ExportError, SourceError};
pub use export::{
    ExportFormat, ExportSink, Exporter, FileSink, format_entries, format_json, format_text,
    format_text_line, format_timestamp,
};
pub use filter::{CompiledFilter, TextMatcher, level_ok, passes, text_ok, time_ok};
pub use ingest::{IngestOptions, IngestStats, LogIngestor, LogSource, LogSubscription};
pub use parser::LogParser;
pub use session::SessionBrowser;
pub use store::{DEFAULT_MAX_LOGS, FilterUpdate, LogStats, LogStore, MIN_MAX_LOGS, StoreConfig};

// Re-export types used in our public API
pub use logdeck_types::{
    ArcLogEntry, LogEntry, LogFilter, LogLevel, RawLogRecord, SessionFile, SessionFileContent,
    TimeRange,
};
