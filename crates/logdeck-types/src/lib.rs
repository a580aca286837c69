//! Shared types for logdeck
//!
//! This crate contains the level taxonomy and the data structures passed between
//! the native log source, the log store, and its consumers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ============================================================================
// Level Taxonomy
// ============================================================================

/// Log severity level, ordered from least to most severe
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Badge style used when a level is shown as a pill in the toolbar or drawer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadgeVariant {
    Default,
    Secondary,
    Outline,
    Destructive,
}

impl LogLevel {
    /// All levels in severity order
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// Normalize a level string of unknown origin.
    ///
    /// Matching is case-insensitive and accepts the usual aliases emitted by
    /// logging libraries. Anything unrecognized becomes `Info`.
    pub fn normalize(s: &str) -> Self {
        Self::recognize(s).unwrap_or(Self::Info)
    }

    /// Strict variant of [`LogLevel::normalize`]: None when the string is not a level
    pub fn recognize(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" | "trc" | "trce" => Some(Self::Trace),
            "debug" | "dbg" | "debg" => Some(Self::Debug),
            "info" | "inf" | "information" => Some(Self::Info),
            "warn" | "warning" | "wrn" => Some(Self::Warn),
            "error" | "err" | "erro" | "fatal" | "critical" | "crit" | "panic" => {
                Some(Self::Error)
            }
            _ => None,
        }
    }

    /// Every level at or above `min`
    pub fn at_least(min: LogLevel) -> BTreeSet<LogLevel> {
        Self::ALL.into_iter().filter(|l| *l >= min).collect()
    }

    /// Short display string (3 chars)
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
        }
    }

    /// Upper-case name, as written in text exports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Lower-case canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Semantic color class for this level
    pub fn color_class(&self) -> &'static str {
        match self {
            Self::Trace => "text-zinc-500",
            Self::Debug => "text-sky-500",
            Self::Info => "text-emerald-500",
            Self::Warn => "text-amber-500",
            Self::Error => "text-red-500",
        }
    }

    pub fn badge_variant(&self) -> BadgeVariant {
        match self {
            Self::Trace => BadgeVariant::Outline,
            Self::Debug | Self::Warn => BadgeVariant::Secondary,
            Self::Info => BadgeVariant::Default,
            Self::Error => BadgeVariant::Destructive,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        Self::normalize(&s)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// A single ingested log record. Never mutated once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,

    pub level: LogLevel,

    pub message: String,

    /// Structured fields, kept ordered so serialization is deterministic
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Shared handle to a stored entry
pub type ArcLogEntry = Arc<LogEntry>;

impl LogEntry {
    pub fn new(timestamp: i64, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style helper for attaching a structured field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A record as emitted by the native log source, before normalization
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLogRecord {
    #[serde(default)]
    pub timestamp: Option<i64>,

    #[serde(default)]
    pub level: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub fields: Option<BTreeMap<String, serde_json::Value>>,
}

impl RawLogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            level: level.into(),
            message: message.into(),
            fields: None,
        }
    }

    /// Convert into a stored entry. `now_ms` fills a missing timestamp.
    pub fn into_entry(self, now_ms: i64) -> LogEntry {
        let fields = self
            .fields
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, field_to_string(v)))
            .collect();

        LogEntry {
            timestamp: self.timestamp.unwrap_or(now_ms),
            level: LogLevel::normalize(&self.level),
            message: self.message,
            fields,
        }
    }
}

impl From<LogEntry> for RawLogRecord {
    fn from(entry: LogEntry) -> Self {
        let fields = if entry.fields.is_empty() {
            None
        } else {
            Some(
                entry
                    .fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect(),
            )
        };

        Self {
            timestamp: Some(entry.timestamp),
            level: entry.level.as_str().to_string(),
            message: entry.message,
            fields,
        }
    }
}

/// Render a JSON field value as display text (strings stay unquoted)
pub fn field_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ============================================================================
// Filter Types
// ============================================================================

/// Filter specification applied to the live buffer on every read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    /// Levels to include. An empty set shows nothing.
    pub levels: BTreeSet<LogLevel>,

    /// Free-text or regex search (empty = no text constraint)
    pub search: String,

    pub use_regex: bool,

    /// Inclusive lower bound, epoch ms
    pub start_time: Option<i64>,

    /// Inclusive upper bound, epoch ms
    pub end_time: Option<i64>,

    /// Also search structured field values, not only the message
    pub search_fields: bool,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            levels: LogLevel::ALL.into_iter().collect(),
            search: String::new(),
            use_regex: false,
            start_time: None,
            end_time: None,
            search_fields: true,
        }
    }
}

impl LogFilter {
    /// True when the filter lets every entry through
    pub fn is_unconstrained(&self) -> bool {
        self.levels.len() == LogLevel::ALL.len()
            && self.search.is_empty()
            && !self.has_time_window()
    }

    pub fn has_time_window(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

/// Time range presets for the toolbar
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[default]
    All,
    Last5m,
    Last15m,
    Last30m,
    Last1h,
    Last6h,
    Last24h,
}

impl TimeRange {
    /// Length of the window in milliseconds
    pub fn as_millis(&self) -> Option<i64> {
        const MINUTE: i64 = 60 * 1000;
        match self {
            Self::All => None,
            Self::Last5m => Some(5 * MINUTE),
            Self::Last15m => Some(15 * MINUTE),
            Self::Last30m => Some(30 * MINUTE),
            Self::Last1h => Some(60 * MINUTE),
            Self::Last6h => Some(6 * 60 * MINUTE),
            Self::Last24h => Some(24 * 60 * MINUTE),
        }
    }

    /// `(start, end)` bounds for a window ending at `now_ms`
    pub fn window(&self, now_ms: i64) -> (Option<i64>, Option<i64>) {
        match self.as_millis() {
            Some(len) => (Some(now_ms - len), Some(now_ms)),
            None => (None, None),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Last5m => "5m",
            Self::Last15m => "15m",
            Self::Last30m => "30m",
            Self::Last1h => "1h",
            Self::Last6h => "6h",
            Self::Last24h => "24h",
        }
    }

    /// Cycle to the next time range
    pub fn next(&self) -> Self {
        match self {
            Self::All => Self::Last5m,
            Self::Last5m => Self::Last15m,
            Self::Last15m => Self::Last30m,
            Self::Last30m => Self::Last1h,
            Self::Last1h => Self::Last6h,
            Self::Last6h => Self::Last24h,
            Self::Last24h => Self::All,
        }
    }

    /// Cycle to the previous time range
    pub fn prev(&self) -> Self {
        match self {
            Self::All => Self::Last24h,
            Self::Last5m => Self::All,
            Self::Last15m => Self::Last5m,
            Self::Last30m => Self::Last15m,
            Self::Last1h => Self::Last30m,
            Self::Last6h => Self::Last1h,
            Self::Last24h => Self::Last6h,
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "5m" => Ok(Self::Last5m),
            "15m" => Ok(Self::Last15m),
            "30m" => Ok(Self::Last30m),
            "1h" => Ok(Self::Last1h),
            "6h" => Ok(Self::Last6h),
            "24h" => Ok(Self::Last24h),
            other => Err(format!(
                "unknown time range '{other}' (expected all, 5m, 15m, 30m, 1h, 6h or 24h)"
            )),
        }
    }
}

// ============================================================================
// Session Files
// ============================================================================

/// Descriptor of a historical session log file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    /// Epoch milliseconds
    pub modified_at: i64,
}

/// Raw content of one session file, shown as a one-shot view
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionFileContent {
    pub name: String,
    pub path: String,
    pub content: String,
}
