//! Fact extraction over a parsed block tree.
//!
//! A single pre-order walk collects headings, image references and rewrite
//! candidates. Every list is capped, earliest blocks first, so the payload
//! handed to a proposal generator stays bounded.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use redraft_blocks::{Block, BlockKind, count_words, parse, strip_tags, walk};
use redraft_shared::{
    AnalysisSnapshot, ContentFingerprint, Document, DocumentHeader, Heading, ImageRef, Metrics,
    RewriteCandidate, SeoMeta,
};

use crate::score::score;

pub const MAX_HEADINGS: usize = 50;
pub const MAX_IMAGES: usize = 60;
pub const MAX_MISSING_ALT: usize = 30;
pub const MAX_CANDIDATES: usize = 12;

static HEADING_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h([1-6])[^>]*>").expect("valid regex"));

static HEADING_CLOSE_RE: LazyLock<[Regex; 6]> = LazyLock::new(|| {
    std::array::from_fn(|i| Regex::new(&format!("(?i)</h{}>", i + 1)).expect("valid regex"))
});

// ---------------------------------------------------------------------------
// Attachment lookup
// ---------------------------------------------------------------------------

/// Read-only view of attachment metadata, keyed by attachment id.
pub trait AttachmentLookup {
    /// Public URL of the attachment, if known.
    fn url(&self, attachment_id: i64) -> Option<String>;
    /// Stored alternative text, if any.
    fn alt_text(&self, attachment_id: i64) -> Option<String>;
}

/// In-memory [`AttachmentLookup`].
#[derive(Debug, Clone, Default)]
pub struct AttachmentTable {
    entries: HashMap<i64, (String, String)>,
}

impl AttachmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i64, url: impl Into<String>, alt: impl Into<String>) {
        self.entries.insert(id, (url.into(), alt.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AttachmentLookup for AttachmentTable {
    fn url(&self, attachment_id: i64) -> Option<String> {
        self.entries.get(&attachment_id).map(|(url, _)| url.clone())
    }

    fn alt_text(&self, attachment_id: i64) -> Option<String> {
        self.entries.get(&attachment_id).map(|(_, alt)| alt.clone())
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Capped facts collected from one walk of a tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facts {
    pub headings: Vec<Heading>,
    pub images: Vec<ImageRef>,
    pub rewrite_candidates: Vec<RewriteCandidate>,
}

/// Collect headings, images and rewrite candidates from `tree`.
///
/// When the tree yields no heading, `raw_markup` is scanned for `<h1>`..`<h6>`
/// elements instead.
pub fn extract(tree: &[Block], raw_markup: &str, lookup: &dyn AttachmentLookup) -> Facts {
    let mut facts = Facts::default();

    for block in walk(tree) {
        match block.kind {
            BlockKind::Heading if facts.headings.len() < MAX_HEADINGS => {
                let text = block.text();
                if !text.is_empty() {
                    facts.headings.push(Heading {
                        level: block.level(),
                        text,
                    });
                }
            }
            BlockKind::Image if facts.images.len() < MAX_IMAGES => {
                let attachment_id = block.attachment_id();
                let url = if attachment_id > 0 {
                    lookup.url(attachment_id).unwrap_or_default()
                } else {
                    String::new()
                };
                facts.images.push(ImageRef { attachment_id, url });
            }
            _ => {}
        }

        if facts.rewrite_candidates.len() < MAX_CANDIDATES {
            if let Some(candidate) = rewrite_candidate(block) {
                facts.rewrite_candidates.push(candidate);
            }
        }
    }

    if facts.headings.is_empty() {
        facts.headings = scan_headings(raw_markup);
        if !facts.headings.is_empty() {
            debug!(count = facts.headings.len(), "headings taken from raw markup scan");
        }
    }

    facts
}

fn rewrite_candidate(block: &Block) -> Option<RewriteCandidate> {
    let kind = block.kind.candidate_kind()?;
    let text = block.text();
    if text.is_empty() {
        return None;
    }
    Some(RewriteCandidate {
        id: block.stable_id(),
        kind,
        fingerprint: ContentFingerprint::of(&text),
        text,
    })
}

/// A heading element located in raw markup.
struct HeadingSpan {
    level: usize,
    /// The whole element, tags included.
    element: std::ops::Range<usize>,
    /// The element's inner markup.
    inner: std::ops::Range<usize>,
}

/// Heading elements in raw markup, in document order.
///
/// Each opening tag is paired with the nearest following closing tag of the
/// same level; an opener without one is skipped.
fn heading_spans(markup: &str) -> Vec<HeadingSpan> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(open) = HEADING_OPEN_RE.captures_at(markup, pos) {
        let (Some(tag), Some(level)) = (open.get(0), open.get(1)) else {
            break;
        };
        let level: usize = level.as_str().parse().unwrap_or(2);

        match HEADING_CLOSE_RE[level - 1].find_at(markup, tag.end()) {
            Some(close) => {
                spans.push(HeadingSpan {
                    level,
                    element: tag.start()..close.end(),
                    inner: tag.end()..close.start(),
                });
                pos = close.end();
            }
            None => pos = tag.start() + 1,
        }
    }

    spans
}

fn scan_headings(markup: &str) -> Vec<Heading> {
    heading_spans(markup)
        .into_iter()
        .take(MAX_HEADINGS)
        .map(|span| Heading {
            level: span.level as i64,
            text: strip_tags(&markup[span.inner]),
        })
        .collect()
}

/// Words of body text. Heading blocks and heading elements are not body text.
fn body_word_count(tree: &[Block], raw_markup: &str) -> usize {
    if tree.is_empty() {
        return words_outside_headings(raw_markup);
    }
    walk(tree)
        .filter(|block| block.kind != BlockKind::Heading)
        .map(|block| words_outside_headings(&block.inner_markup()))
        .sum()
}

fn words_outside_headings(markup: &str) -> usize {
    let mut body = String::with_capacity(markup.len());
    let mut cursor = 0;
    for span in heading_spans(markup) {
        body.push_str(&markup[cursor..span.element.start]);
        body.push(' ');
        cursor = span.element.end;
    }
    body.push_str(&markup[cursor..]);
    count_words(&body)
}

/// Images whose attachment has no usable alt text. Images without an
/// attachment id are never reported.
fn missing_alt(images: &[ImageRef], lookup: &dyn AttachmentLookup) -> Vec<ImageRef> {
    images
        .iter()
        .filter(|image| {
            image.attachment_id != 0
                && lookup
                    .alt_text(image.attachment_id)
                    .is_none_or(|alt| alt.trim().is_empty())
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Attachment ids referenced by image blocks in `markup`, in document order
/// and without duplicates.
pub fn referenced_attachments(markup: &str) -> Vec<i64> {
    let tree = parse(markup);
    let mut ids: Vec<i64> = Vec::new();
    for block in walk(&tree) {
        let id = block.attachment_id();
        if block.kind == BlockKind::Image && id > 0 && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Analyze a document: parse its content, extract facts, compute metrics and scores.
#[instrument(skip_all, fields(document = %document.id))]
pub fn analyze(document: &Document, lookup: &dyn AttachmentLookup) -> AnalysisSnapshot {
    let tree = parse(&document.content);
    let facts = extract(&tree, &document.content, lookup);

    let mut missing = missing_alt(&facts.images, lookup);
    let metrics = Metrics {
        title_length: document.title.chars().count(),
        word_count: body_word_count(&tree, &document.content),
        headings_count: facts.headings.len(),
        images_count: facts.images.len(),
        missing_alt_count: missing.len(),
        rewrite_candidates_count: facts.rewrite_candidates.len(),
    };
    missing.truncate(MAX_MISSING_ALT);

    let scores = score(&metrics);
    debug!(?metrics, ?scores, blocks = tree.len(), "analysis complete");

    AnalysisSnapshot {
        document: DocumentHeader {
            id: document.id,
            title: document.title.clone(),
            kind: document.kind.clone(),
        },
        seo: SeoMeta {
            title: document.seo_title.clone().unwrap_or_default(),
            meta_description: document.meta_description.clone().unwrap_or_default(),
        },
        metrics,
        headings: facts.headings,
        missing_alt: missing,
        rewrite_candidates: facts.rewrite_candidates,
        scores,
    }
}
