//! Core domain types for redraft documents and analyses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from a derived [`StableBlockId`].
pub const STABLE_ID_LEN: usize = 16;

// ---------------------------------------------------------------------------
// DocumentId / Document
// ---------------------------------------------------------------------------

/// Identifier of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A stored document as read from the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    /// Free-form document type (`post`, `page`, ...).
    pub kind: String,
    /// Raw block markup.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Identity & integrity primitives
// ---------------------------------------------------------------------------

/// Short fingerprint addressing one rewritable block across tree walks.
///
/// A persisted id is authoritative. Otherwise the id is derived from the
/// block's name and trimmed inner markup, so identical blocks share an id
/// and an edited block gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableBlockId(String);

impl StableBlockId {
    /// Wrap an id that was persisted on a block or echoed back by a caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a block name and its inner markup.
    pub fn derive(block_name: &str, inner_markup: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(block_name.as_bytes());
        hasher.update(b"|");
        hasher.update(inner_markup.as_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(STABLE_ID_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StableBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full SHA-256 of a block's plain text, used only for drift detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Fingerprint extracted plain text.
    pub fn of(text: &str) -> Self {
        Self(format!("{:x}", Sha256::digest(text.as_bytes())))
    }

    /// Compare against an expected fingerprint without short-circuiting on
    /// the first differing byte.
    pub fn matches(&self, expected: &str) -> bool {
        let ours = self.0.as_bytes();
        let theirs = expected.as_bytes();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter()
            .zip(theirs)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Extracted facts
// ---------------------------------------------------------------------------

/// A heading found in the document. Level is taken verbatim, not clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: i64,
    pub text: String,
}

/// An image block and its resolved attachment URL (empty when unresolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub attachment_id: i64,
    pub url: String,
}

/// Block kinds that may be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Paragraph,
    Heading,
}

/// An addressable, rewritable block surfaced to the proposal generator.
///
/// Field names on the wire are the ones the generator echoes back in a
/// `rewrite_blocks` suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteCandidate {
    #[serde(rename = "client_id")]
    pub id: StableBlockId,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub text: String,
    #[serde(rename = "before_hash")]
    pub fingerprint: ContentFingerprint,
}

// ---------------------------------------------------------------------------
// AnalysisSnapshot
// ---------------------------------------------------------------------------

/// Identity of the analyzed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub id: DocumentId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// SEO meta currently stored for the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMeta {
    pub title: String,
    pub meta_description: String,
}

/// Simple counts derived from one analysis pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Character count of the declared title.
    pub title_length: usize,
    pub word_count: usize,
    pub headings_count: usize,
    pub images_count: usize,
    /// Counted before the missing-alt list is capped.
    pub missing_alt_count: usize,
    pub rewrite_candidates_count: usize,
}

/// Heuristic scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub seo: u32,
    pub a11y: u32,
    pub ux: u32,
}

/// Full, immutable output of one analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub document: DocumentHeader,
    pub seo: SeoMeta,
    pub metrics: Metrics,
    pub headings: Vec<Heading>,
    pub missing_alt: Vec<ImageRef>,
    pub rewrite_candidates: Vec<RewriteCandidate>,
    pub scores: Scores,
}

// ---------------------------------------------------------------------------
// Rewrite requests
// ---------------------------------------------------------------------------

/// One caller-supplied rewrite. Missing fields deserialize as empty strings
/// so malformed items can be dropped individually instead of failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteItem {
    #[serde(rename = "client_id", default)]
    pub id: String,
    #[serde(rename = "before_hash", default)]
    pub expected_fingerprint: String,
    #[serde(rename = "after", default)]
    pub new_text: String,
}

impl RewriteItem {
    /// An item is usable only when id, fingerprint and new text are all present.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty() && !self.expected_fingerprint.is_empty() && !self.new_text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_roundtrip() {
        let id: DocumentId = "42".parse().expect("parse DocumentId");
        assert_eq!(id, DocumentId(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn derived_id_is_short_and_deterministic() {
        let a = StableBlockId::derive("core/paragraph", "<p>Hello</p>");
        let b = StableBlockId::derive("core/paragraph", "<p>Hello</p>");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), STABLE_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derived_id_depends_on_name_and_markup() {
        let para = StableBlockId::derive("core/paragraph", "<p>Hello</p>");
        let heading = StableBlockId::derive("core/heading", "<p>Hello</p>");
        let edited = StableBlockId::derive("core/paragraph", "<p>Hello!</p>");
        assert_ne!(para, heading);
        assert_ne!(para, edited);
    }

    #[test]
    fn fingerprint_is_full_sha256() {
        let fp = ContentFingerprint::of("abc");
        assert_eq!(
            fp.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_changes_with_one_character() {
        let a = ContentFingerprint::of("Short body.");
        let b = ContentFingerprint::of("Short body!");
        assert_ne!(a, b);
        assert!(a.matches(ContentFingerprint::of("Short body.").as_str()));
        assert!(!a.matches(b.as_str()));
        assert!(!a.matches(""));
    }

    #[test]
    fn candidate_uses_generator_field_names() {
        let candidate = RewriteCandidate {
            id: StableBlockId::new("abcdef0123456789"),
            kind: CandidateKind::Paragraph,
            text: "Body".into(),
            fingerprint: ContentFingerprint::of("Body"),
        };
        let json = serde_json::to_value(&candidate).expect("serialize");
        assert_eq!(json["client_id"], "abcdef0123456789");
        assert_eq!(json["type"], "paragraph");
        assert!(json["before_hash"].is_string());
    }

    #[test]
    fn rewrite_item_tolerates_missing_fields() {
        let item: RewriteItem =
            serde_json::from_str(r#"{"client_id":"x","after":"New"}"#).expect("deserialize");
        assert_eq!(item.id, "x");
        assert!(item.expected_fingerprint.is_empty());
        assert!(!item.is_well_formed());
    }

    #[test]
    fn snapshot_fixture_validates() {
        let fixture = std::fs::read_to_string(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../../fixtures/json/snapshot.fixture.json"
        ))
        .expect("read fixture");
        let parsed: AnalysisSnapshot =
            serde_json::from_str(&fixture).expect("deserialize fixture snapshot");
        assert_eq!(parsed.document.id, DocumentId(7));
        assert_eq!(parsed.headings.len(), 2);
        assert_eq!(parsed.rewrite_candidates[0].kind, CandidateKind::Heading);
        assert_eq!(parsed.scores.a11y, 90);
    }
}
