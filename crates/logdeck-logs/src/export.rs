use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

use logdeck_types::{ArcLogEntry, LogEntry};

use crate::error::ExportError;
use crate::store::LogStore;

/// Serialization format for exported logs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Text,
    Json,
}

impl ExportFormat {
    /// File extension used when saving
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown export format '{other}' (expected txt or json)")),
        }
    }
}

/// Format a timestamp as RFC 3339 UTC with millisecond precision
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp.to_string())
}

/// `<timestamp> [<LEVEL>] <message>`
pub fn format_text_line(entry: &LogEntry) -> String {
    format!(
        "{} [{}] {}",
        format_timestamp(entry.timestamp),
        entry.level.label(),
        entry.message
    )
}

pub fn format_text(entries: &[ArcLogEntry]) -> String {
    entries
        .iter()
        .map(|e| format_text_line(e))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_json(entries: &[ArcLogEntry]) -> Result<String, ExportError> {
    let entries: Vec<&LogEntry> = entries.iter().map(|e| e.as_ref()).collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

pub fn format_entries(entries: &[ArcLogEntry], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Text => Ok(format_text(entries)),
        ExportFormat::Json => format_json(entries),
    }
}

/// Host-specific delivery of an export (download, clipboard, file save)
pub trait ExportSink {
    fn deliver(&self, content: &str, format: ExportFormat) -> Result<(), ExportError>;
}

impl<F> ExportSink for F
where
    F: Fn(&str, ExportFormat) -> Result<(), ExportError>,
{
    fn deliver(&self, content: &str, format: ExportFormat) -> Result<(), ExportError> {
        self(content, format)
    }
}

/// Writes each export to a timestamped file in a directory
pub struct FileSink {
    dir: PathBuf,
    last_path: Mutex<Option<PathBuf>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_path: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the most recently written export
    pub fn last_path(&self) -> Option<PathBuf> {
        self.last_path.lock().clone()
    }

    fn path_for(&self, format: ExportFormat, now: DateTime<Utc>) -> PathBuf {
        let stem = format!("logs-{}", now.format("%Y%m%d-%H%M%S%.3f"));
        self.dir.join(format!("{stem}.{}", format.extension()))
    }
}

impl ExportSink for FileSink {
    fn deliver(&self, content: &str, format: ExportFormat) -> Result<(), ExportError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(format, Utc::now());
        std::fs::write(&path, content)?;
        *self.last_path.lock() = Some(path);
        Ok(())
    }
}

/// Serializes the store's filtered view and hands it to a sink
pub struct Exporter {
    sink: Box<dyn ExportSink + Send + Sync>,
}

impl Exporter {
    pub fn new(sink: impl ExportSink + Send + Sync + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Export the currently filtered entries. Returns how many were exported.
    pub fn export(&self, store: &LogStore, format: ExportFormat) -> Result<usize, ExportError> {
        let entries = store.filtered_entries();
        let content = format_entries(&entries, format)?;
        self.sink.deliver(&content, format)?;

        tracing::debug!(count = entries.len(), format = format.extension(), "exported logs");
        Ok(entries.len())
    }
}
