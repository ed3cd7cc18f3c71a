//! ISBN normalization helpers

/// Strip hyphens/spaces from an ISBN and uppercase a trailing `x` check digit.
///
/// Returns `None` unless the result has 10 or 13 characters of the right shape.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match cleaned.len() {
        10 if cleaned[..9].chars().all(|c| c.is_ascii_digit()) => Some(cleaned),
        13 if cleaned.chars().all(|c| c.is_ascii_digit()) => Some(cleaned),
        _ => None,
    }
}

/// Convert an ISBN-10 to its ISBN-13 (`978` prefix) form
pub fn isbn10_to_isbn13(isbn10: &str) -> Option<String> {
    let normalized = normalize_isbn(isbn10)?;
    if normalized.len() != 10 {
        return None;
    }

    let stem = format!("978{}", &normalized[..9]);
    let sum: u32 = stem
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    let check = (10 - (sum % 10)) % 10;

    Some(format!("{}{}", stem, check))
}
