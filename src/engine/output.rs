// src/engine/output.rs

/// Appended to output cut down to the configured threshold.
pub const TRUNCATION_SUFFIX: &str = "\n...[truncated]";

/// Keep at most `max_chars` characters of `text`, marking the cut.
///
/// Cuts on a character boundary; text at or under the limit is returned
/// unchanged.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_index, _)) => {
            let mut out = String::with_capacity(byte_index + TRUNCATION_SUFFIX.len());
            out.push_str(&text[..byte_index]);
            out.push_str(TRUNCATION_SUFFIX);
            out
        }
    }
}
