use chrono::{DateTime, Utc};
use serde_json::Value;

use okemcp_types::LogLevel;

/// Structure recovered from one raw log line
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedLine<'a> {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
    pub message: &'a str,
}

/// Severity tokens in priority order; the first match wins
const LEVEL_TOKENS: &[(&str, LogLevel)] = &[
    ("FATAL", LogLevel::Fatal),
    ("PANIC", LogLevel::Fatal),
    ("CRITICAL", LogLevel::Fatal),
    ("ERROR", LogLevel::Error),
    ("ERR", LogLevel::Error),
    ("WARNING", LogLevel::Warn),
    ("WARN", LogLevel::Warn),
    ("INFO", LogLevel::Info),
    ("DEBUG", LogLevel::Debug),
    ("TRACE", LogLevel::Trace),
];

const JSON_LEVEL_KEYS: &[&str] = &[
    "level",
    "lvl",
    "severity",
    "log.level",
    "loglevel",
    "log_level",
    "Level",
    "LEVEL",
];

/// Extracts timestamps and severity from container log lines
pub struct LogParser;

impl LogParser {
    pub fn parse(raw: &str) -> ParsedLine<'_> {
        let (timestamp, message) = Self::split_timestamp(raw);
        let level = Self::json_level(message).unwrap_or_else(|| Self::text_level(message));
        ParsedLine {
            timestamp,
            level,
            message,
        }
    }

    /// Split off the RFC 3339 prefix the API server adds with `timestamps=true`
    fn split_timestamp(raw: &str) -> (Option<DateTime<Utc>>, &str) {
        let Some((prefix, rest)) = raw.split_once(' ') else {
            return (None, raw);
        };
        if prefix.len() < 20 || !prefix.ends_with('Z') {
            return (None, raw);
        }
        match DateTime::parse_from_rfc3339(prefix) {
            Ok(ts) => (Some(ts.with_timezone(&Utc)), rest.trim_start()),
            Err(_) => (None, raw),
        }
    }

    fn json_level(message: &str) -> Option<LogLevel> {
        let trimmed = message.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let value: Value = serde_json::from_str(trimmed).ok()?;
        let fields = value.as_object()?;

        let level = JSON_LEVEL_KEYS
            .iter()
            .find_map(|key| fields.get(*key))
            .and_then(|value| match value {
                Value::String(s) => Some(LogLevel::parse(s)),
                // bunyan/pino numeric levels
                Value::Number(n) => n.as_u64().map(|num| match num {
                    0..=10 => LogLevel::Trace,
                    11..=20 => LogLevel::Debug,
                    21..=30 => LogLevel::Info,
                    31..=40 => LogLevel::Warn,
                    41..=50 => LogLevel::Error,
                    _ => LogLevel::Fatal,
                }),
                _ => None,
            });
        Some(level.unwrap_or(LogLevel::Unknown))
    }

    fn text_level(message: &str) -> LogLevel {
        let upper = message.to_uppercase();

        // Delimited forms anywhere in the line: [ERROR], ERROR:, " ERROR "
        for (token, level) in LEVEL_TOKENS {
            let delimited = [
                format!("[{}]", token),
                format!("{}:", token),
                format!(" {} ", token),
            ];
            if delimited.iter().any(|form| upper.contains(form.as_str())) {
                return *level;
            }
        }

        // Bare token at the start of the line
        let start = upper.trim_start();
        LEVEL_TOKENS
            .iter()
            .find(|(token, _)| start.starts_with(token))
            .map(|(_, level)| *level)
            .unwrap_or(LogLevel::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_k8s_timestamp() {
        let line = LogParser::parse("2024-01-15T10:30:00.123456789Z some log message");
        assert!(line.timestamp.is_some());
        assert_eq!(line.message, "some log message");
    }

    #[test]
    fn test_no_timestamp() {
        let line = LogParser::parse("plain message without prefix");
        assert!(line.timestamp.is_none());
        assert_eq!(line.message, "plain message without prefix");
    }

    #[test]
    fn test_json_level() {
        let line = LogParser::parse(r#"{"level":"error","msg":"boom"}"#);
        assert_eq!(line.level, LogLevel::Error);

        let line = LogParser::parse(r#"{"level":40,"msg":"careful"}"#);
        assert_eq!(line.level, LogLevel::Warn);

        let line = LogParser::parse(r#"{"msg":"no level"}"#);
        assert_eq!(line.level, LogLevel::Unknown);
    }

    #[test]
    fn test_text_levels() {
        assert_eq!(LogParser::parse("[WARN] disk almost full").level, LogLevel::Warn);
        assert_eq!(LogParser::parse("ERROR: connection refused").level, LogLevel::Error);
        assert_eq!(LogParser::parse("2024/01/15 10:30 INFO started").level, LogLevel::Info);
        assert_eq!(LogParser::parse("debug output follows").level, LogLevel::Debug);
        assert_eq!(LogParser::parse("nothing to see").level, LogLevel::Unknown);
    }

    #[test]
    fn test_multibyte_prefix_is_safe() {
        let line = LogParser::parse("ñññññññññññññññññññññññ ERROR: x");
        assert!(line.timestamp.is_none());
        assert_eq!(line.level, LogLevel::Error);
    }
}
