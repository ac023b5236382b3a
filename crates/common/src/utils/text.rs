//! Text helpers for log output.

/// Longest path or field copied verbatim into a log line.
pub const LOG_FIELD_LIMIT: usize = 128;

/// Truncate `s` to at most `max` bytes on a char boundary, appending `...` when cut.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
