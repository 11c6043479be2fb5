//! Shared utility functions used across the codebase.

/// Parse an environment variable as a boolean, returning `default` if unset.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// any other set value maps to `false`.
pub fn env_var_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

/// First `max_chars` characters of `text`, never splitting a UTF-8 sequence.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Characters `[start, end)` of `text`, or `None` if the range is empty or
/// runs past the end.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start >= end {
        return None;
    }
    let mut indices = text.char_indices().map(|(i, _)| i).chain(Some(text.len()));
    let begin = indices.nth(start)?;
    let finish = indices.nth(end - start - 1)?;
    Some(&text[begin..finish])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_prefix_respects_char_boundaries() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("abc", 10), "abc");
        assert_eq!(char_prefix("", 5), "");
        assert_eq!(char_prefix("abc", 0), "");
    }

    #[test]
    fn char_slice_extracts_ranges() {
        assert_eq!(char_slice("héllo world", 1, 5), Some("éllo"));
        assert_eq!(char_slice("abc", 0, 3), Some("abc"));
        assert_eq!(char_slice("abc", 2, 4), None);
        assert_eq!(char_slice("abc", 2, 2), None);
        assert_eq!(char_slice("abc", 3, 1), None);
    }

    #[test]
    fn env_var_bool_uses_default_when_unset() {
        assert!(env_var_bool("LIBRARIAN_TEST_UNSET_FLAG_1", true));
        assert!(!env_var_bool("LIBRARIAN_TEST_UNSET_FLAG_1", false));
    }
}
