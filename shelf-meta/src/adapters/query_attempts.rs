//! Progressive query relaxation
//!
//! Bibliographic search backends are brittle against extra words, but a bare
//! single-word query invites false positives. Attempts therefore run from most
//! specific to most degraded and the caller stops at the first one that
//! returns anything:
//!
//! 1. identifier attempts (added by adapters whose backend supports them)
//! 2. title + first author
//! 3. full title
//! 4. main title (subtitle after `:` dropped)
//! 5. leading bigram of significant title tokens
//! 6. individual significant tokens

use crate::types::AdapterInput;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tokens shorter than this never form a single-token attempt
pub const MIN_TOKEN_LEN: usize = 4;

/// Upper bound on single-token attempts per lookup
pub const MAX_TOKEN_ATTEMPTS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "book", "books", "but", "by", "for", "from",
    "into", "its", "novel", "of", "on", "or", "part", "over", "series", "that", "the", "their",
    "this", "through", "to", "under", "upon", "volume", "with", "without",
];

/// How much an attempt has been relaxed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Identifier,
    TitleAuthor,
    Title,
    MainTitle,
    Bigram,
    Token,
}

impl AttemptKind {
    /// Single-token matches carry the highest false-positive risk
    pub fn is_degraded(self) -> bool {
        matches!(self, AttemptKind::Token)
    }
}

/// One query to try against a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAttempt {
    pub kind: AttemptKind,
    pub query: String,
}

impl QueryAttempt {
    pub fn new(kind: AttemptKind, query: impl Into<String>) -> Self {
        Self {
            kind,
            query: query.into(),
        }
    }
}

/// Lowercased title words worth searching on their own
pub fn significant_tokens(title: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    title
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Title-derived attempts, most specific first, without duplicates
pub fn title_attempts(input: &AdapterInput) -> Vec<QueryAttempt> {
    let mut attempts = Vec::new();
    let Some(title) = input.title() else {
        return attempts;
    };
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(author) = input.authors().next() {
        attempts.push(QueryAttempt::new(
            AttemptKind::TitleAuthor,
            format!("{} {}", title, author),
        ));
    }

    attempts.push(QueryAttempt::new(AttemptKind::Title, title.clone()));

    if let Some((main, _subtitle)) = title.split_once(':') {
        let main = main.trim();
        if !main.is_empty() {
            attempts.push(QueryAttempt::new(AttemptKind::MainTitle, main));
        }
    }

    let tokens = significant_tokens(&title);
    if tokens.len() >= 2 {
        attempts.push(QueryAttempt::new(
            AttemptKind::Bigram,
            format!("{} {}", tokens[0], tokens[1]),
        ));
    }
    for token in tokens.iter().take(MAX_TOKEN_ATTEMPTS) {
        attempts.push(QueryAttempt::new(AttemptKind::Token, token.clone()));
    }

    dedup_attempts(attempts)
}

/// Drop attempts whose query repeats an earlier one (case-insensitive)
pub fn dedup_attempts(attempts: Vec<QueryAttempt>) -> Vec<QueryAttempt> {
    let mut seen = HashSet::new();
    attempts
        .into_iter()
        .filter(|a| seen.insert(a.query.to_lowercase()))
        .collect()
}
