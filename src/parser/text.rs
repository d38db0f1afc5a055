/// Collapse every whitespace run (including NBSP) to a single space and trim.
pub fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace and cap the result at `max` characters.
/// Returns `None` when nothing is left.
pub fn normalize(s: &str, max: usize) -> Option<String> {
    let collapsed = collapse(&s.replace('\u{a0}', " "));
    let capped = truncate_chars(&collapsed, max);
    let trimmed = capped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Cut at `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Lower-case fold used for phrase matching. Accents are kept; phrase lists
/// carry both accented and unaccented spellings.
pub fn fold(s: &str) -> String {
    collapse(s).to_lowercase()
}

/// True when any needle occurs in `haystack` as whole words.
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| contains_phrase(haystack, n))
}

/// `phrase` occurs with no letter or digit directly before or after it.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, hit)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + hit.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
