//! Bounds for caller-supplied result counts.

pub const CASE_LIST_DEFAULT: usize = 50;
pub const CASE_LIST_MAX: usize = 200;
pub const KNOWLEDGE_SEARCH_DEFAULT: usize = 10;
pub const KNOWLEDGE_SEARCH_MAX: usize = 50;

/// Number of prior chat messages sent as context with each chat turn.
pub const CHAT_HISTORY_WINDOW: usize = 10;

/// Clamp a requested count into `[1, max]`. Zero and negative values become 1.
pub fn clamp_limit(requested: i64, max: usize) -> usize {
    let max = max.max(1) as i64;
    requested.clamp(1, max) as usize
}

/// Parse a raw `limit` query value leniently: absent or non-integer input
/// falls back to `default`, anything else is clamped into `[1, max]`.
pub fn parse_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    match raw.map(str::trim).and_then(|v| v.parse::<i64>().ok()) {
        Some(requested) => clamp_limit(requested, max),
        None => clamp_limit(default as i64, max),
    }
}
