//! Text normalization shared by the cache, slug resolver and adapters

/// Sanitize a cache key into a filesystem-safe stem.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9._-]` into a
/// single hyphen, and trims leading/trailing hyphens. Lossy: keys differing
/// only in case or punctuation map to the same stem.
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut in_run = false;

    for c in key.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }

    out.trim_matches('-').to_string()
}

/// Generate a URL-safe slug from free text.
///
/// Lowercases, drops apostrophes, collapses non-alphanumeric runs into
/// hyphens and trims hyphens from both ends.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_hyphen = false;

    for c in value.chars().flat_map(char::to_lowercase) {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}') {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    out
}

/// Normalize a vocabulary term for table lookup: trim, lowercase, single spaces
pub fn normalize_term(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Replace typographic en/em dashes with ASCII hyphens
pub fn replace_dashes(value: &str) -> String {
    value.replace(['\u{2013}', '\u{2014}'], "-")
}
