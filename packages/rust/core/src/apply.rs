//! Drift-safe application of rewrite requests to current block markup.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, instrument};

use redraft_blocks::{Block, count_blocks, parse, serialize};
use redraft_shared::{ApplyError, CandidateKind, ContentFingerprint, RewriteItem};

use crate::sanitize::sanitize_inline;

/// Result of a successful [`apply_rewrites`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub markup: String,
    pub applied: usize,
}

/// A validated request waiting for its block.
#[derive(Debug)]
struct PendingRewrite {
    expected_fingerprint: String,
    body: String,
}

/// Pending rewrites by block id. Each matching block consumes the first
/// entry for its id whose fingerprint matches, in request order.
#[derive(Debug, Default)]
struct RewriteQueue {
    by_id: HashMap<String, VecDeque<PendingRewrite>>,
}

impl RewriteQueue {
    fn from_items(items: &[RewriteItem]) -> Self {
        let mut queue = Self::default();
        for item in items {
            if !item.is_well_formed() {
                debug!(id = %item.id, "dropping malformed rewrite item");
                continue;
            }
            let body = sanitize_inline(&item.new_text);
            if redraft_blocks::strip_tags(&body).is_empty() {
                debug!(id = %item.id, "dropping rewrite item with no text after sanitizing");
                continue;
            }
            queue
                .by_id
                .entry(item.id.clone())
                .or_default()
                .push_back(PendingRewrite {
                    expected_fingerprint: item.expected_fingerprint.clone(),
                    body,
                });
        }
        queue
    }

    fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

enum Visit {
    Untouched,
    Rewritten,
    Drifted,
}

/// Apply `items` to `current` markup.
///
/// The markup is parsed fresh. A block is rewritten only when its current
/// text still hashes to the request's expected fingerprint; drifted blocks
/// are skipped without failing the batch.
#[instrument(skip_all, fields(items = items.len()))]
pub fn apply_rewrites(current: &str, items: &[RewriteItem]) -> Result<ApplyOutcome, ApplyError> {
    let mut tree = parse(current);
    if count_blocks(&tree) == 0 {
        return Err(ApplyError::NoContent);
    }

    let mut queue = RewriteQueue::from_items(items);
    if queue.is_empty() {
        return Err(ApplyError::NoValidItems);
    }

    let applied = rewrite_blocks(&mut tree, &mut queue);
    if applied == 0 {
        return Err(ApplyError::NothingApplied);
    }

    info!(applied, "rewrites applied");
    Ok(ApplyOutcome {
        markup: serialize(&tree),
        applied,
    })
}

fn rewrite_blocks(blocks: &mut [Block], queue: &mut RewriteQueue) -> usize {
    let mut applied = 0;
    for block in blocks.iter_mut() {
        match visit(block, queue) {
            Visit::Drifted => continue,
            Visit::Rewritten => applied += 1,
            Visit::Untouched => {}
        }
        applied += rewrite_blocks(block.children_mut(), queue);
    }
    applied
}

fn visit(block: &mut Block, queue: &mut RewriteQueue) -> Visit {
    let Some(kind) = block.kind.candidate_kind() else {
        return Visit::Untouched;
    };
    let text = block.text();
    if text.is_empty() {
        return Visit::Untouched;
    }

    let id = block.stable_id();
    let Some(pending) = queue.by_id.get_mut(id.as_str()) else {
        return Visit::Untouched;
    };
    if pending.is_empty() {
        return Visit::Untouched;
    }

    // The first entry whose fingerprint still matches wins; stale entries stay queued.
    let current = ContentFingerprint::of(&text);
    let Some(rewrite) = pending
        .iter()
        .position(|entry| current.matches(&entry.expected_fingerprint))
        .and_then(|index| pending.remove(index))
    else {
        debug!(%id, "block changed since suggestion, skipping");
        return Visit::Drifted;
    };

    let markup = match kind {
        CandidateKind::Paragraph => format!("<p>{}</p>", rewrite.body),
        CandidateKind::Heading => {
            let level = block.level().clamp(1, 6);
            format!("<h{level}>{}</h{level}>", rewrite.body)
        }
    };
    block.replace_inner_markup(markup);
    block.persist_id(&id);
    debug!(%id, "block rewritten");
    Visit::Rewritten
}
