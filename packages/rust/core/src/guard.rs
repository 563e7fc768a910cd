//! Marker-based protection against inserting the same content twice.

use tracing::debug;

use redraft_shared::ApplyError;

use crate::sanitize::{escape_attr, escape_text};

/// Attribute written verbatim on every inserted call-to-action paragraph.
pub const CTA_MARKER: &str = r#"data-redraft="cta""#;

/// Fail with [`ApplyError::AlreadyApplied`] when `marker` occurs in `markup`.
pub fn ensure_not_applied(markup: &str, marker: &str) -> Result<(), ApplyError> {
    if markup.contains(marker) {
        debug!(marker, "insertion marker already present");
        return Err(ApplyError::AlreadyApplied);
    }
    Ok(())
}

/// Append a call-to-action paragraph linking `text` to `url`.
///
/// `url` must already be validated; it is only escaped here.
pub fn insert_cta(markup: &str, text: &str, url: &str) -> Result<String, ApplyError> {
    ensure_not_applied(markup, CTA_MARKER)?;
    Ok(format!(
        "{markup}\n<!-- wp:paragraph -->\n<p {CTA_MARKER}><a href=\"{}\">{}</a></p>\n<!-- /wp:paragraph -->\n",
        escape_attr(url),
        escape_text(text)
    ))
}
