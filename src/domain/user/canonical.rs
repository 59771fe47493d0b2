//! Canonical forms of user-identifying fields

use std::fmt::Debug;

/// Normalizes usernames and emails into the form used for lookups and
/// uniqueness comparison.
pub trait Canonicalizer: Send + Sync + Debug {
    fn canonicalize(&self, value: &str) -> String;
}

/// Trims surrounding whitespace and lowercases (Unicode-aware)
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCanonicalizer;

impl Canonicalizer for DefaultCanonicalizer {
    fn canonicalize(&self, value: &str) -> String {
        value.trim().to_lowercase()
    }
}
