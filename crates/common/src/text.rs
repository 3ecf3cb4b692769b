//! Text helpers for log fields and chat replies.

/// Truncate `text` to at most `max_chars` characters, appending `…` when cut.
///
/// Operates on `char` boundaries so multi-byte input never panics.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Collapse all runs of whitespace (including newlines) into single spaces.
#[must_use]
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
