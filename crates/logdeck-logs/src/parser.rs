use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeMap;

use logdeck_types::{LogEntry, LogLevel, field_to_string};

/// Parser for lines of historical session log files
pub struct LogParser;

impl LogParser {
    /// Parse a whole file. Lines without a timestamp inherit the previous
    /// entry's, or `fallback_ts` at the start of the file.
    pub fn parse_content(content: &str, fallback_ts: i64) -> Vec<LogEntry> {
        let mut last_ts = fallback_ts;
        content
            .lines()
            .filter_map(|line| {
                let entry = Self::parse_line(line, last_ts)?;
                last_ts = entry.timestamp;
                Some(entry)
            })
            .collect()
    }

    /// Parse one line into an entry. Blank lines yield None.
    pub fn parse_line(raw: &str, fallback_ts: i64) -> Option<LogEntry> {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        if let Some(entry) = Self::try_parse_json(line, fallback_ts) {
            return Some(entry);
        }

        let (timestamp, content) = Self::extract_timestamp(line);
        let (level, message) = Self::extract_level_from_text(content);

        Some(LogEntry {
            timestamp: timestamp.unwrap_or(fallback_ts),
            level,
            message: message.to_string(),
            fields: BTreeMap::new(),
        })
    }

    /// Extract a leading RFC 3339 (or `YYYY-MM-DD HH:MM:SS`) timestamp
    fn extract_timestamp(line: &str) -> (Option<i64>, &str) {
        let trimmed = line.trim_start();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        if let Ok(ts) = DateTime::parse_from_rfc3339(first) {
            return (Some(ts.timestamp_millis()), rest.trim_start());
        }

        // Space-separated date and time, read as UTC
        let mut parts = rest.splitn(2, char::is_whitespace);
        let time = parts.next().unwrap_or_default();
        let after = parts.next().unwrap_or_default();
        let candidate = format!("{first} {time}");
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(&candidate, format) {
                return (Some(naive.and_utc().timestamp_millis()), after.trim_start());
            }
        }

        (None, line)
    }

    /// Try to parse the line as a JSON object log record
    fn try_parse_json(line: &str, fallback_ts: i64) -> Option<LogEntry> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }

        let value: Value = serde_json::from_str(trimmed).ok()?;
        let Value::Object(mut obj) = value else {
            return None;
        };

        let level = ["level", "lvl", "severity", "log_level"]
            .iter()
            .find_map(|key| obj.remove(*key))
            .map(|v| Self::level_from_json(&v))
            .unwrap_or_default();

        let message = ["message", "msg", "text"]
            .iter()
            .find_map(|key| obj.remove(*key))
            .map(field_to_string)
            .unwrap_or_default();

        let timestamp = ["timestamp", "time", "ts"]
            .iter()
            .find_map(|key| obj.remove(*key))
            .and_then(|v| Self::timestamp_from_json(&v))
            .unwrap_or(fallback_ts);

        let fields = obj
            .into_iter()
            .map(|(k, v)| (k, field_to_string(v)))
            .collect();

        Some(LogEntry {
            timestamp,
            level,
            message,
            fields,
        })
    }

    fn level_from_json(value: &Value) -> LogLevel {
        match value {
            Value::String(s) => LogLevel::normalize(s),
            // Numeric levels as used by pino/bunyan
            Value::Number(n) => match n.as_u64() {
                Some(0..=10) => LogLevel::Trace,
                Some(11..=20) => LogLevel::Debug,
                Some(21..=30) => LogLevel::Info,
                Some(31..=40) => LogLevel::Warn,
                Some(_) => LogLevel::Error,
                None => LogLevel::Info,
            },
            _ => LogLevel::Info,
        }
    }

    fn timestamp_from_json(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.timestamp_millis()),
            _ => None,
        }
    }

    /// Extract the level marker from plain text, returning the remaining message
    fn extract_level_from_text(content: &str) -> (LogLevel, &str) {
        let trimmed = content.trim_start();

        // [ERROR] message
        if let Some(rest) = trimmed.strip_prefix('[') {
            if let Some((marker, message)) = rest.split_once(']') {
                if let Some(level) = LogLevel::recognize(marker) {
                    return (level, message.trim_start());
                }
            }
        }

        // ERROR: message, or ERROR message (tracing's default format).
        // A bare word only counts when upper-case, so "Error loading x" stays intact.
        let (word, message) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        let (word, marked) = match word.strip_suffix(':') {
            Some(word) => (word, true),
            None => (word, word.chars().all(|c| c.is_ascii_uppercase())),
        };
        if marked {
            if let Some(level) = LogLevel::recognize(word) {
                return (level, message.trim_start());
            }
        }

        (LogLevel::Info, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exported_text_line() {
        let entry = LogParser::parse_line("2024-01-15T10:30:00.123Z [ERROR] solve failed", 0).unwrap();
        assert_eq!(entry.timestamp, 1_705_314_600_123);
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "solve failed");
    }

    #[test]
    fn test_parse_tracing_style_line() {
        let entry =
            LogParser::parse_line("2024-01-15T10:30:00Z  WARN backend::wsl: distro stopped", 0)
                .unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.message, "backend::wsl: distro stopped");
    }

    #[test]
    fn test_parse_space_separated_timestamp() {
        let entry = LogParser::parse_line("2024-01-15 10:30:00 info: cache cleaned", 0).unwrap();
        assert_eq!(entry.timestamp, 1_705_314_600_000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "cache cleaned");
    }

    #[test]
    fn test_parse_json_line() {
        let line = r#"{"level":"warn","msg":"retrying download","ts":1700000000000,"attempt":2}"#;
        let entry = LogParser::parse_line(line, 0).unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.message, "retrying download");
        assert_eq!(entry.timestamp, 1_700_000_000_000);
        assert_eq!(entry.fields.get("attempt").map(String::as_str), Some("2"));
        assert!(!entry.fields.contains_key("msg"));
    }

    #[test]
    fn test_plain_line_defaults_to_info() {
        let entry = LogParser::parse_line("just some output", 99).unwrap();
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.timestamp, 99);
        assert_eq!(entry.message, "just some output");

        let entry = LogParser::parse_line("Error loading package index", 0).unwrap();
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "Error loading package index");
    }

    #[test]
    fn test_parse_content_inherits_timestamps() {
        let content = "2024-01-15T10:30:00Z [ERROR] traceback\n  at frame one\n\n  at frame two\n";
        let entries = LogParser::parse_content(content, 0);

        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.timestamp == 1_705_314_600_000));
        assert_eq!(entries[1].message, "at frame one");
    }

    #[test]
    fn test_parse_multibyte_utf8_no_panic() {
        let line = "─────────────────────────────────────────";
        let entry = LogParser::parse_line(line, 5).unwrap();
        assert_eq!(entry.timestamp, 5);

        let line2 = "2024-01-15T10:30:00Z ╭────────────────────────────╮";
        let entry2 = LogParser::parse_line(line2, 5).unwrap();
        assert_eq!(entry2.timestamp, 1_705_314_600_000);
    }
}
