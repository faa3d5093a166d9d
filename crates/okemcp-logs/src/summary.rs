use okemcp_types::LogSummary;

use crate::parser::LogParser;

/// Line count, per-level counts and timestamp range of a log body
pub fn summarize(text: &str) -> LogSummary {
    let mut summary = LogSummary::default();
    for raw in text.lines().filter(|l| !l.trim().is_empty()) {
        let line = LogParser::parse(raw);
        summary.lines += 1;
        summary.levels.record(line.level);
        if let Some(ts) = line.timestamp {
            summary.first_timestamp = Some(summary.first_timestamp.map_or(ts, |first| first.min(ts)));
            summary.last_timestamp = Some(summary.last_timestamp.map_or(ts, |last| last.max(ts)));
        }
    }
    summary
}

/// Number of lines at warn level or above
pub fn problem_lines(summary: &LogSummary) -> usize {
    summary.levels.warn + summary.levels.error + summary.levels.fatal
}
