//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use redraft_blocks::strip_tags;
use redraft_core::{
    BridgeGenerator, ProposalGenerator, ReplayGenerator, Suggestion, analyze_document,
    apply_suggestion, build_prompt, suggest_improvements,
};
use redraft_shared::{
    AppConfig, DocumentId, ExtractError, expand_home, init_config, load_config, validate_api_key,
};
use redraft_storage::Storage;
use serde_json::Value;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// redraft: content analysis and drift-safe rewrites for block documents.
#[derive(Parser)]
#[command(
    name = "redraft",
    version,
    about = "Analyze block documents, gather rewrite suggestions and apply them safely.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `storage.database_path`).
    #[arg(long, global = true, env = "REDRAFT_DB")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Store a block markup file as a new document.
    Import {
        /// File containing block markup.
        file: PathBuf,

        /// Document title.
        #[arg(short, long)]
        title: String,

        /// Document kind, e.g. post or page.
        #[arg(short, long, default_value = "post")]
        kind: String,
    },

    /// Register or update a media attachment.
    Attach {
        /// Attachment id referenced by image blocks.
        id: i64,

        /// Attachment URL.
        url: String,

        /// Alternative text.
        #[arg(long, default_value = "")]
        alt: String,
    },

    /// List stored documents.
    List,

    /// Print the analysis snapshot of a document as JSON.
    Analyze {
        /// Document id.
        id: i64,
    },

    /// Print the generator prompt for a document.
    Prompt {
        /// Document id.
        id: i64,
    },

    /// Ask the generator for suggestions and print them as JSON.
    Suggest {
        /// Document id.
        id: i64,

        /// Replay a recorded provider response instead of calling the bridge.
        #[arg(long)]
        response: Option<PathBuf>,
    },

    /// Apply one suggestion to a document.
    Apply {
        /// Document id.
        id: i64,

        /// JSON file holding a suggestion, or the output of `suggest`.
        #[arg(short, long)]
        suggestion: PathBuf,

        /// Suggestion type to pick when the file holds several.
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// Print the current markup of a document.
    Export {
        /// Document id.
        id: i64,
    },

    /// List saved revisions of a document, or restore one.
    Revisions {
        /// Document id.
        id: i64,

        /// Revision id to restore.
        #[arg(long)]
        restore: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "redraft=info",
        1 => "redraft=debug",
        _ => "redraft=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so JSON printed on stdout stays machine-readable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Import { file, title, kind } => cmd_import(db, &file, &title, &kind).await,
        Command::Attach { id, url, alt } => cmd_attach(db, id, &url, &alt).await,
        Command::List => cmd_list(db).await,
        Command::Analyze { id } => cmd_analyze(db, id).await,
        Command::Prompt { id } => cmd_prompt(db, id).await,
        Command::Suggest { id, response } => cmd_suggest(db, id, response.as_deref()).await,
        Command::Apply {
            id,
            suggestion,
            kind,
        } => cmd_apply(db, id, &suggestion, kind.as_deref()).await,
        Command::Export { id } => cmd_export(db, id).await,
        Command::Revisions { id, restore } => cmd_revisions(db, id, restore.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Resolve the database path from `--db` or the loaded config.
fn database_path(db: Option<String>, config: &AppConfig) -> Result<PathBuf> {
    let raw = db.unwrap_or_else(|| config.storage.database_path.clone());
    Ok(expand_home(&raw)?)
}

async fn open_storage(db: Option<String>, config: &AppConfig) -> Result<Storage> {
    let path = database_path(db, config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| eyre!("cannot create {}: {e}", parent.display()))?;
        }
    }
    Ok(Storage::open(&path).await?)
}

async fn open_storage_readonly(db: Option<String>, config: &AppConfig) -> Result<Storage> {
    let path = database_path(db, config)?;
    Ok(Storage::open_readonly(&path).await?)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_import(db: Option<String>, file: &Path, title: &str, kind: &str) -> Result<()> {
    let config = load_config()?;
    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let storage = open_storage(db, &config).await?;

    let id = storage.insert_document(title, kind, &content).await?;
    info!(document = %id, file = %file.display(), "document imported");
    println!("{id}");
    Ok(())
}

async fn cmd_attach(db: Option<String>, id: i64, url: &str, alt: &str) -> Result<()> {
    if id <= 0 {
        return Err(eyre!("attachment id must be positive, got {id}"));
    }
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;
    storage.upsert_attachment(id, url, alt).await?;
    info!(attachment = id, "attachment saved");
    Ok(())
}

async fn cmd_list(db: Option<String>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(db, &config).await?;
    let documents = storage.list_documents().await?;
    if documents.is_empty() {
        println!("No documents stored.");
        return Ok(());
    }
    for doc in documents {
        println!(
            "{:>5}  {:<6}  {}  {}",
            doc.id.0,
            doc.kind,
            doc.updated_at.format("%Y-%m-%d %H:%M"),
            doc.title
        );
    }
    Ok(())
}

async fn cmd_analyze(db: Option<String>, id: i64) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(db, &config).await?;
    let snapshot = analyze_document(&storage, DocumentId(id)).await?;
    print_json(&snapshot)
}

async fn cmd_prompt(db: Option<String>, id: i64) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(db, &config).await?;
    let snapshot = analyze_document(&storage, DocumentId(id)).await?;
    let document = storage
        .get_document(DocumentId(id))
        .await?
        .ok_or(ExtractError::NotFound)?;
    println!(
        "{}",
        build_prompt(
            &snapshot,
            &strip_tags(&document.content),
            config.generator.max_prompt_chars
        )
    );
    Ok(())
}

async fn cmd_suggest(db: Option<String>, id: i64, response: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(db, &config).await?;
    let max_chars = config.generator.max_prompt_chars;

    let set = match response {
        Some(path) => {
            let mut replay = ReplayGenerator::from_file(path)?;
            suggest_improvements(&storage, DocumentId(id), &mut replay, max_chars).await?
        }
        None => {
            validate_api_key(&config)?;
            let spinner = spinner("Waiting for the generator");
            let mut bridge = BridgeGenerator::spawn(&config.generator)?;
            let result = suggest_improvements(
                &storage,
                DocumentId(id),
                &mut bridge as &mut dyn ProposalGenerator,
                max_chars,
            )
            .await;
            bridge.shutdown();
            spinner.finish_and_clear();
            result?
        }
    };

    info!(document = id, count = set.suggestions.len(), "suggestions received");
    print_json(&set)
}

async fn cmd_apply(db: Option<String>, id: i64, file: &Path, kind: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let raw = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| eyre!("'{}' is not JSON: {e}", file.display()))?;
    let suggestion = select_suggestion(value, kind)?;

    let storage = open_storage(db, &config).await?;
    let report = apply_suggestion(&storage, DocumentId(id), &suggestion, &config.cta).await?;
    print_json(&report)
}

/// Pick one suggestion from a file holding either a single suggestion or a
/// `{"suggestions": [...]}` set.
fn select_suggestion(value: Value, kind: Option<&str>) -> Result<Suggestion> {
    let Some(list) = value.get("suggestions").and_then(Value::as_array) else {
        let suggestion = Suggestion::from_value(value)?;
        if let Some(wanted) = kind {
            if suggestion.kind() != wanted {
                return Err(eyre!(
                    "file holds a {} suggestion, not {wanted}",
                    suggestion.kind()
                ));
            }
        }
        return Ok(suggestion);
    };

    let type_of = |entry: &Value| {
        entry
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let entry = match kind {
        Some(wanted) => list
            .iter()
            .find(|entry| type_of(entry) == wanted)
            .ok_or_else(|| eyre!("no {wanted} suggestion in file"))?,
        None => match list.as_slice() {
            [only] => only,
            [] => return Err(eyre!("file holds no suggestions")),
            many => {
                let kinds: Vec<String> = many.iter().map(type_of).collect();
                return Err(eyre!(
                    "file holds several suggestions ({}); pick one with --type",
                    kinds.join(", ")
                ));
            }
        },
    };
    Ok(Suggestion::from_value(entry.clone())?)
}

async fn cmd_export(db: Option<String>, id: i64) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage_readonly(db, &config).await?;
    let document = storage
        .get_document(DocumentId(id))
        .await?
        .ok_or(ExtractError::NotFound)?;
    print!("{}", document.content);
    Ok(())
}

async fn cmd_revisions(db: Option<String>, id: i64, restore: Option<&str>) -> Result<()> {
    let config = load_config()?;

    if let Some(revision_id) = restore {
        let storage = open_storage(db, &config).await?;
        let saved = storage.restore_revision(revision_id).await?;
        println!("Restored {revision_id}; previous state saved as {saved}");
        return Ok(());
    }

    let storage = open_storage_readonly(db, &config).await?;
    let revisions = storage.list_revisions(DocumentId(id)).await?;
    if revisions.is_empty() {
        println!("No revisions for document {id}.");
        return Ok(());
    }
    for rev in revisions {
        println!(
            "{}  {}  {}",
            rev.id,
            rev.created_at.format("%Y-%m-%d %H:%M:%S"),
            rev.title
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_apply_with_type_and_global_db() {
        let cli = Cli::try_parse_from([
            "redraft",
            "apply",
            "7",
            "--suggestion",
            "out.json",
            "--type",
            "cta",
            "--db",
            "/tmp/x.db",
        ])
        .unwrap();
        assert_eq!(cli.db.as_deref(), Some("/tmp/x.db"));
        match cli.command {
            Command::Apply {
                id,
                suggestion,
                kind,
            } => {
                assert_eq!(id, 7);
                assert_eq!(suggestion, PathBuf::from("out.json"));
                assert_eq!(kind.as_deref(), Some("cta"));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn verbosity_counts_flags() {
        let cli = Cli::try_parse_from(["redraft", "-vv", "list"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn import_requires_title() {
        assert!(Cli::try_parse_from(["redraft", "import", "post.html"]).is_err());
    }

    #[test]
    fn select_single_suggestion() {
        let value = json!({"type": "cta", "placements": [{"cta_text": "Book now", "cta_url": "/book"}]});
        let suggestion = select_suggestion(value, None).unwrap();
        assert_eq!(suggestion.kind(), "cta");
    }

    #[test]
    fn select_from_set_by_type() {
        let value = json!({"suggestions": [
            {"type": "seo_meta", "title": "T", "meta_description": "D"},
            {"type": "rewrite_blocks", "items": []}
        ]});
        let picked = select_suggestion(value.clone(), Some("seo_meta")).unwrap();
        assert_eq!(picked.kind(), "seo_meta");

        let err = select_suggestion(value.clone(), None).unwrap_err();
        assert!(err.to_string().contains("seo_meta, rewrite_blocks"));

        assert!(select_suggestion(value, Some("image_alt")).is_err());
    }

    #[test]
    fn select_rejects_mismatched_single_type() {
        let value = json!({"type": "seo_meta", "title": "T"});
        assert!(select_suggestion(value, Some("cta")).is_err());
    }

    #[test]
    fn select_rejects_unsupported_type() {
        let value = json!({"type": "tone_shift"});
        assert!(select_suggestion(value, None).is_err());
    }

    #[test]
    fn db_flag_overrides_config() {
        let config = AppConfig::default();
        let path = database_path(Some("/tmp/redraft.db".into()), &config).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/redraft.db"));
    }
}
