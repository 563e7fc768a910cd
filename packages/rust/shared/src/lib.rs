//! Shared types, error model, and configuration for redraft.
//!
//! This crate is the foundation depended on by all other redraft crates.
//! It provides:
//! - [`RedraftError`], [`ExtractError`], [`ApplyError`]: the error model
//! - Domain types ([`AnalysisSnapshot`], [`RewriteCandidate`], [`StableBlockId`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CtaConfig, GeneratorConfig, StorageConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{ApplyError, ExtractError, RedraftError, Result};
pub use types::{
    AnalysisSnapshot, CandidateKind, ContentFingerprint, Document, DocumentHeader, DocumentId,
    Heading, ImageRef, Metrics, RewriteCandidate, RewriteItem, STABLE_ID_LEN, Scores, SeoMeta,
    StableBlockId,
};
