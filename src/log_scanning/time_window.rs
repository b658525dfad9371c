//! Retention-window filtering for log lines.
//!
//! A [`TimestampRule`] pulls a timestamp off the start of a line; a
//! [`TimeWindowFilter`] compares it against the run's cutoff. Lines whose
//! timestamp cannot be extracted are never in the window.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;

/// Format keyword selecting RFC 3339 parsing instead of a strftime pattern.
pub const RFC3339_FORMAT: &str = "rfc3339";

pub const DEFAULT_TIMESTAMP_PATTERN: &str = r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns true when `timestamp` is at or after `cutoff`.
pub fn in_window(timestamp: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    timestamp >= cutoff
}

/// How to recognise and parse the timestamp at the start of a log line.
///
/// The pattern must match at offset 0. If it has a capture group, group 1 is
/// parsed; otherwise the whole match is. Timestamps without an offset are
/// taken to be UTC.
#[derive(Debug, Clone)]
pub struct TimestampRule {
    pattern: Regex,
    format: String,
}

impl TimestampRule {
    pub fn new(pattern: &str, format: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            format: format.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
        let caps = self.pattern.captures(line)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 {
            return None;
        }
        let raw = caps.get(1).unwrap_or(whole).as_str().trim();

        if self.format.eq_ignore_ascii_case(RFC3339_FORMAT) {
            return DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }

        DateTime::parse_from_str(raw, &self.format)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, &self.format).map(|n| n.and_utc()))
            .ok()
    }
}

#[derive(Debug, Clone)]
pub struct TimeWindowFilter {
    cutoff: DateTime<Utc>,
    rule: TimestampRule,
}

impl TimeWindowFilter {
    /// Window covering `lookback` before `run_start`.
    ///
    /// A lookback reaching past the earliest representable time keeps
    /// everything.
    pub fn new(run_start: DateTime<Utc>, lookback: Duration, rule: TimestampRule) -> Self {
        let cutoff = run_start
            .checked_sub_signed(lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::with_cutoff(cutoff, rule)
    }

    pub fn with_cutoff(cutoff: DateTime<Utc>, rule: TimestampRule) -> Self {
        Self { cutoff, rule }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn extract_timestamp(&self, line: &str) -> Option<DateTime<Utc>> {
        self.rule.extract(line)
    }

    /// Extracted timestamp (if any) and whether the line is kept.
    pub fn evaluate(&self, line: &str) -> (Option<DateTime<Utc>>, bool) {
        match self.extract_timestamp(line) {
            Some(ts) => (Some(ts), in_window(ts, self.cutoff)),
            None => (None, false),
        }
    }
}
