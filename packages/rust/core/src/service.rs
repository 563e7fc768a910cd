//! Storage-backed entry points: analyze, suggest and apply for a stored document.

use serde::Serialize;
use tracing::{debug, info, instrument};

use redraft_blocks::strip_tags;
use redraft_shared::{
    AnalysisSnapshot, ApplyError, CtaConfig, Document, DocumentId, ExtractError, RedraftError,
    Result,
};
use redraft_storage::Storage;

use crate::analyze::{AttachmentTable, analyze, referenced_attachments};
use crate::apply::apply_rewrites;
use crate::guard::insert_cta;
use crate::sanitize::{plain_text, safe_url};
use crate::suggest::{AltItem, CtaPlacement, ProposalGenerator, Suggestion, SuggestionSet, suggest};

/// What an applied suggestion changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "applied", rename_all = "snake_case")]
pub enum ApplyReport {
    SeoMeta {
        revision: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta_description: Option<String>,
    },
    ImageAlt {
        updated_count: usize,
    },
    Cta {
        revision: String,
        text: String,
        url: String,
    },
    RewriteBlocks {
        revision: String,
        count: usize,
    },
}

fn persist_failed(err: RedraftError) -> RedraftError {
    let message = match err {
        RedraftError::Storage(message) => message,
        other => other.to_string(),
    };
    ApplyError::PersistFailed(message).into()
}

/// Attachment metadata for every image the document references.
async fn attachment_table(storage: &Storage, markup: &str) -> Result<AttachmentTable> {
    let ids = referenced_attachments(markup);
    let mut table = AttachmentTable::new();
    for attachment in storage.attachments_for(&ids).await? {
        table.insert(attachment.id, attachment.url, attachment.alt);
    }
    debug!(referenced = ids.len(), known = table.len(), "attachments loaded");
    Ok(table)
}

async fn load_for_analysis(storage: &Storage, id: DocumentId) -> Result<Document> {
    storage
        .get_document(id)
        .await?
        .ok_or_else(|| ExtractError::NotFound.into())
}

async fn load_for_apply(storage: &Storage, id: DocumentId) -> Result<Document> {
    storage
        .get_document(id)
        .await?
        .ok_or_else(|| ApplyError::NotFound.into())
}

/// Analyze the stored document `id`.
#[instrument(skip(storage))]
pub async fn analyze_document(storage: &Storage, id: DocumentId) -> Result<AnalysisSnapshot> {
    let document = load_for_analysis(storage, id).await?;
    let table = attachment_table(storage, &document.content).await?;
    Ok(analyze(&document, &table))
}

/// Analyze the stored document `id` and ask `generator` for suggestions.
#[instrument(skip(storage, generator))]
pub async fn suggest_improvements(
    storage: &Storage,
    id: DocumentId,
    generator: &mut dyn ProposalGenerator,
    max_prompt_chars: usize,
) -> Result<SuggestionSet> {
    let document = load_for_analysis(storage, id).await?;
    let table = attachment_table(storage, &document.content).await?;
    let snapshot = analyze(&document, &table);
    suggest(
        generator,
        &snapshot,
        &strip_tags(&document.content),
        max_prompt_chars,
    )
}

/// Apply one suggestion to the stored document `id`.
///
/// Content changes are written with a revision of the prior state. Nothing is
/// written when the suggestion fails to apply.
#[instrument(skip(storage, suggestion, cta), fields(kind = suggestion.kind()))]
pub async fn apply_suggestion(
    storage: &Storage,
    id: DocumentId,
    suggestion: &Suggestion,
    cta: &CtaConfig,
) -> Result<ApplyReport> {
    let document = load_for_apply(storage, id).await?;

    let report = match suggestion {
        Suggestion::SeoMeta {
            title,
            meta_description,
            ..
        } => apply_seo_meta(storage, &document, title, meta_description).await?,
        Suggestion::ImageAlt { items, .. } => apply_image_alt(storage, items).await?,
        Suggestion::Cta { placements, .. } => apply_cta(storage, &document, placements, cta).await?,
        Suggestion::RewriteBlocks { items } => {
            if items.is_empty() {
                return Err(ApplyError::EmptySuggestion("no rewrite items").into());
            }
            let outcome = apply_rewrites(&document.content, items)?;
            let revision = storage
                .update_content(document.id, &outcome.markup)
                .await
                .map_err(persist_failed)?;
            ApplyReport::RewriteBlocks {
                revision,
                count: outcome.applied,
            }
        }
        Suggestion::Unsupported => {
            return Err(RedraftError::validation("unsupported suggestion type"));
        }
    };

    info!(document = %id, ?report, "suggestion applied");
    Ok(report)
}

async fn apply_seo_meta(
    storage: &Storage,
    document: &Document,
    title: &str,
    meta_description: &str,
) -> Result<ApplyReport> {
    let title = Some(plain_text(title)).filter(|t| !t.is_empty());
    let meta_description = Some(plain_text(meta_description)).filter(|d| !d.is_empty());
    if title.is_none() && meta_description.is_none() {
        return Err(ApplyError::EmptySuggestion("no title or meta_description").into());
    }

    let revision = storage
        .update_seo_meta(document.id, title.as_deref(), meta_description.as_deref())
        .await
        .map_err(persist_failed)?;
    Ok(ApplyReport::SeoMeta {
        revision,
        title,
        meta_description,
    })
}

async fn apply_image_alt(storage: &Storage, items: &[AltItem]) -> Result<ApplyReport> {
    if items.is_empty() {
        return Err(ApplyError::EmptySuggestion("no image_alt items").into());
    }

    let mut updated_count = 0;
    for item in items {
        let alt = plain_text(&item.alt);
        if item.attachment_id <= 0 || alt.is_empty() {
            debug!(attachment = item.attachment_id, "skipping alt item");
            continue;
        }
        if storage
            .set_alt_text(item.attachment_id, &alt)
            .await
            .map_err(persist_failed)?
        {
            updated_count += 1;
        } else {
            debug!(attachment = item.attachment_id, "unknown attachment");
        }
    }
    Ok(ApplyReport::ImageAlt { updated_count })
}

async fn apply_cta(
    storage: &Storage,
    document: &Document,
    placements: &[CtaPlacement],
    defaults: &CtaConfig,
) -> Result<ApplyReport> {
    let Some(first) = placements.first() else {
        return Err(ApplyError::EmptySuggestion("no CTA placements").into());
    };

    let text = first
        .cta_text
        .as_deref()
        .map(plain_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| defaults.default_text.clone());
    let url = first
        .cta_url
        .as_deref()
        .and_then(safe_url)
        .unwrap_or_else(|| defaults.default_url.clone());

    let markup = insert_cta(&document.content, &text, &url)?;
    let revision = storage
        .update_content(document.id, &markup)
        .await
        .map_err(persist_failed)?;
    Ok(ApplyReport::Cta {
        revision,
        text,
        url,
    })
}
