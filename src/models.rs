//! Core data models shared by the indexing pipeline and the query loop.

use std::path::PathBuf;

use crate::ledger::ContentDigest;

/// A file found by the directory scan, with the digest of its content at
/// scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub digest: ContentDigest,
}

/// One searchable fragment of a source file.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    /// Path of the originating file.
    pub source: String,
    pub fragment_index: i64,
    pub content: String,
    /// SHA-256 of `content`.
    pub content_hash: String,
    /// Digest of the whole file the fragment was extracted from.
    pub file_digest: String,
    pub vector: Vec<f32>,
}

/// A record returned by a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub source: String,
    pub fragment_index: i64,
    pub content: String,
    pub score: f32,
}

impl SearchHit {
    /// Single-line excerpt: first `chars` characters, newlines collapsed to
    /// spaces, outer whitespace trimmed.
    pub fn preview(&self, chars: usize) -> String {
        truncate_chars(&self.content, chars)
            .replace('\n', " ")
            .trim()
            .to_string()
    }
}

/// One question/answer turn of the query loop. Never persisted.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub hits: Vec<SearchHit>,
    pub context: String,
    pub answer: String,
}

/// The first `max` characters of `text` (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
