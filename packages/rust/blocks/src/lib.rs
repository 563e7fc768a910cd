//! Content tree model for comment-delimited block markup.
//!
//! A document is a sequence of [`Block`]s. Each block has a kind, a map of
//! tagged attributes, its own inner markup, and ordered children. The
//! [`parse`] / [`serialize`] pair round-trips block structure: kinds,
//! nesting, attributes and the markup between delimiters are preserved.
//!
//! Markup between top-level blocks is kept as [`BlockKind::Freeform`]
//! segments so nothing outside a block is lost on re-serialization.

mod attrs;
mod parser;
mod serializer;
mod text;

use redraft_shared::{CandidateKind, ContentFingerprint, StableBlockId};

pub use attrs::{AttrValue, Attributes};
pub use parser::parse;
pub use serializer::serialize;
pub use text::{count_words, strip_tags};

/// Attribute under which a block's [`StableBlockId`] is persisted.
pub const STABLE_ID_ATTR: &str = "__redraftId";

/// Heading level assumed when the block does not declare one.
pub const DEFAULT_HEADING_LEVEL: i64 = 2;

// ---------------------------------------------------------------------------
// BlockKind
// ---------------------------------------------------------------------------

/// The kind tag of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Top-level markup outside any block delimiter.
    Freeform,
    Paragraph,
    Heading,
    Image,
    /// Any other block, by its fully qualified name (`core/group`, `acme/card`).
    Other(String),
}

impl BlockKind {
    /// Resolve a fully qualified block name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "core/paragraph" => Self::Paragraph,
            "core/heading" => Self::Heading,
            "core/image" => Self::Image,
            other => Self::Other(other.to_string()),
        }
    }

    /// Fully qualified block name, `None` for freeform markup.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Freeform => None,
            Self::Paragraph => Some("core/paragraph"),
            Self::Heading => Some("core/heading"),
            Self::Image => Some("core/image"),
            Self::Other(name) => Some(name),
        }
    }

    /// The rewritable kind this block maps to, if any.
    pub fn candidate_kind(&self) -> Option<CandidateKind> {
        match self {
            Self::Paragraph => Some(CandidateKind::Paragraph),
            Self::Heading => Some(CandidateKind::Heading),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A piece of a block's own content: markup, or the position of the next child.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InnerPiece {
    Markup(String),
    Child,
}

/// One node of the content tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub attrs: Attributes,
    inner: Vec<InnerPiece>,
    children: Vec<Block>,
}

impl Block {
    /// Create an empty block.
    pub fn new(kind: BlockKind, attrs: Attributes) -> Self {
        Self {
            kind,
            attrs,
            inner: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create a freeform segment holding raw markup.
    pub fn freeform(markup: impl Into<String>) -> Self {
        let mut block = Self::new(BlockKind::Freeform, Attributes::new());
        block.push_markup(markup);
        block
    }

    /// Append markup to this block's own content.
    pub fn push_markup(&mut self, markup: impl Into<String>) {
        let markup = markup.into();
        if markup.is_empty() {
            return;
        }
        match self.inner.last_mut() {
            Some(InnerPiece::Markup(last)) => last.push_str(&markup),
            _ => self.inner.push(InnerPiece::Markup(markup)),
        }
    }

    /// Append a child block at the current position of the content.
    pub fn push_child(&mut self, child: Block) {
        self.inner.push(InnerPiece::Child);
        self.children.push(child);
    }

    pub fn children(&self) -> &[Block] {
        &self.children
    }

    /// Mutable access to the children. The slice keeps the child count fixed.
    pub fn children_mut(&mut self) -> &mut [Block] {
        &mut self.children
    }

    /// This block's own markup, without child blocks.
    pub fn inner_markup(&self) -> String {
        self.inner
            .iter()
            .filter_map(|piece| match piece {
                InnerPiece::Markup(m) => Some(m.as_str()),
                InnerPiece::Child => None,
            })
            .collect()
    }

    /// Replace this block's own markup. Existing children are kept, after the new markup.
    pub fn replace_inner_markup(&mut self, markup: impl Into<String>) {
        let mut inner = vec![InnerPiece::Markup(markup.into())];
        inner.extend(self.children.iter().map(|_| InnerPiece::Child));
        self.inner = inner;
    }

    pub(crate) fn pieces(&self) -> &[InnerPiece] {
        &self.inner
    }

    /// Tag-stripped, trimmed text of this block's own markup.
    pub fn text(&self) -> String {
        strip_tags(self.inner_markup().trim())
    }

    /// Fingerprint of the block's current text.
    pub fn fingerprint(&self) -> ContentFingerprint {
        ContentFingerprint::of(&self.text())
    }

    /// The persisted id if present, otherwise one derived from name and markup.
    pub fn stable_id(&self) -> StableBlockId {
        if let Some(id) = self.persisted_id() {
            return StableBlockId::new(id);
        }
        let name = self.kind.name().unwrap_or_default();
        StableBlockId::derive(name, self.inner_markup().trim())
    }

    fn persisted_id(&self) -> Option<&str> {
        self.attrs
            .get(STABLE_ID_ATTR)
            .and_then(AttrValue::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Store `id` on the block so later analyses address it even after its text changes.
    pub fn persist_id(&mut self, id: &StableBlockId) {
        self.attrs
            .insert(STABLE_ID_ATTR.to_string(), AttrValue::from(id.as_str()));
    }

    /// Declared heading level (verbatim), or the default.
    pub fn level(&self) -> i64 {
        self.attrs
            .get("level")
            .and_then(AttrValue::as_i64)
            .unwrap_or(DEFAULT_HEADING_LEVEL)
    }

    /// Attachment id of an image block, `0` when absent.
    pub fn attachment_id(&self) -> i64 {
        self.attrs.get("id").and_then(AttrValue::as_i64).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Pre-order, depth-first iterator over a block sequence.
pub struct PreOrder<'a> {
    stack: Vec<&'a Block>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.stack.pop()?;
        self.stack.extend(block.children.iter().rev());
        Some(block)
    }
}

/// Walk `blocks` in document order: each block before its children,
/// children in their original order.
pub fn walk(blocks: &[Block]) -> PreOrder<'_> {
    PreOrder {
        stack: blocks.iter().rev().collect(),
    }
}

/// Number of delimited blocks in the tree (freeform segments excluded).
pub fn count_blocks(blocks: &[Block]) -> usize {
    walk(blocks)
        .filter(|b| b.kind != BlockKind::Freeform)
        .count()
}
