// Within-run duplicate suppression for rendered comments

use std::collections::HashSet;

/// Characters of comment text that take part in the fingerprint
pub const FINGERPRINT_TEXT_CHARS: usize = 120;

/// `(author, first 120 chars of text)`; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    author: String,
    text_prefix: String,
}

impl Fingerprint {
    pub fn new(author: &str, text: &str) -> Self {
        Self {
            author: author.to_string(),
            text_prefix: text.chars().take(FINGERPRINT_TEXT_CHARS).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<Fingerprint>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Returns `true` when the fingerprint was not present before
    pub fn add(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
