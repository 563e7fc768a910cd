//! Analysis and rewrite engine for block documents.
//!
//! - [`analyze`] extracts headings, images missing alt text and rewrite
//!   candidates, then scores the document
//! - [`apply_rewrites`] writes externally produced rewrites back, skipping
//!   blocks whose text changed since the suggestion was made
//! - [`insert_cta`] appends call-to-action content at most once
//! - [`suggest`] builds the generator prompt and validates its output
//! - [`service`] runs all of the above against a [`redraft_storage::Storage`]

pub mod analyze;
pub mod apply;
pub mod bridge;
pub mod guard;
pub mod sanitize;
pub mod score;
pub mod service;
pub mod suggest;

pub use analyze::{AttachmentLookup, AttachmentTable, Facts, analyze, extract, referenced_attachments};
pub use apply::{ApplyOutcome, apply_rewrites};
pub use bridge::{BridgeGenerator, ReplayGenerator};
pub use guard::{CTA_MARKER, ensure_not_applied, insert_cta};
pub use score::score;
pub use service::{ApplyReport, analyze_document, apply_suggestion, suggest_improvements};
pub use suggest::{
    AltItem, CtaPlacement, ProposalGenerator, ProviderResponse, Suggestion, SuggestionSet,
    build_prompt, suggest,
};
