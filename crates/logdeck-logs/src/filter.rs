use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

use logdeck_types::{LogEntry, LogFilter, LogLevel};

/// Text half of a filter, compiled once per `(search, use_regex)` pair
#[derive(Clone, Debug)]
pub enum TextMatcher {
    /// Empty search: everything passes
    Any,

    /// Case-insensitive substring, stored lower-cased
    Substring(String),

    Regex(Regex),

    /// Pattern failed to compile; nothing passes
    Invalid(String),
}

impl TextMatcher {
    /// Compile the text matcher. Never fails: a bad regex becomes `Invalid`.
    pub fn compile(search: &str, use_regex: bool) -> Self {
        if search.is_empty() {
            return Self::Any;
        }

        if !use_regex {
            return Self::Substring(search.to_lowercase());
        }

        match RegexBuilder::new(search).case_insensitive(true).build() {
            Ok(re) => Self::Regex(re),
            Err(e) => Self::Invalid(e.to_string()),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Substring(needle) => text.to_lowercase().contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
            Self::Invalid(_) => false,
        }
    }

    /// Compilation error, if the pattern was rejected
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

/// A [`LogFilter`] with its text matcher compiled, ready for a filtering pass
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    levels: BTreeSet<LogLevel>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    search_fields: bool,
    matcher: TextMatcher,
}

impl CompiledFilter {
    pub fn compile(filter: &LogFilter) -> Self {
        Self::with_matcher(filter, TextMatcher::compile(&filter.search, filter.use_regex))
    }

    /// Build from a matcher compiled earlier for the same search settings
    pub fn with_matcher(filter: &LogFilter, matcher: TextMatcher) -> Self {
        Self {
            levels: filter.levels.clone(),
            start_time: filter.start_time,
            end_time: filter.end_time,
            search_fields: filter.search_fields,
            matcher,
        }
    }

    /// Check if a log entry passes level, time window, and text tests
    pub fn matches(&self, entry: &LogEntry) -> bool {
        // Level first, it's the cheapest
        if !self.levels.contains(&entry.level) {
            return false;
        }

        if !within_window(entry.timestamp, self.start_time, self.end_time) {
            return false;
        }

        self.text_matches(entry)
    }

    fn text_matches(&self, entry: &LogEntry) -> bool {
        if let TextMatcher::Any = self.matcher {
            return true;
        }
        self.matcher.is_match(&entry.message)
            || (self.search_fields && entry.fields.values().any(|v| self.matcher.is_match(v)))
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.matcher {
            TextMatcher::Regex(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            TextMatcher::Substring(needle) => find_substring(text, needle),
            TextMatcher::Any | TextMatcher::Invalid(_) => Vec::new(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.matcher.error()
    }
}

/// Byte spans of case-insensitive occurrences of `needle` in `text`
fn find_substring(text: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    match RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        Err(_) => Vec::new(),
    }
}

fn within_window(timestamp: i64, start: Option<i64>, end: Option<i64>) -> bool {
    start.is_none_or(|s| timestamp >= s) && end.is_none_or(|e| timestamp <= e)
}

/// Level sub-test
pub fn level_ok(entry: &LogEntry, filter: &LogFilter) -> bool {
    filter.levels.contains(&entry.level)
}

/// Time window sub-test (inclusive bounds)
pub fn time_ok(entry: &LogEntry, filter: &LogFilter) -> bool {
    within_window(entry.timestamp, filter.start_time, filter.end_time)
}

/// Text sub-test. Compiles the pattern on each call; use [`CompiledFilter`] in loops.
pub fn text_ok(entry: &LogEntry, filter: &LogFilter) -> bool {
    CompiledFilter::compile(filter).text_matches(entry)
}

/// One-off membership test of a single entry
pub fn passes(entry: &LogEntry, filter: &LogFilter) -> bool {
    CompiledFilter::compile(filter).matches(entry)
}
