//! Proposal-generator boundary: prompt construction, provider response
//! decoding, validation and typed suggestions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use redraft_shared::{AnalysisSnapshot, RedraftError, Result, RewriteItem, Scores};

/// Entries of each list included in a prompt.
const PROMPT_HEADINGS: usize = 30;
const PROMPT_MISSING_ALT: usize = 30;
const PROMPT_CANDIDATES: usize = 12;

const TRUNCATION_MARKER: &str = "\n…(truncated)";

const STRICT_SUFFIX: &str = "\n\nIMPORTANT: Your previous output was invalid. Output ONLY valid JSON matching the schema. No markdown.";

const RESPONSE_SCHEMA: &str = r#"{
  "version": "1.0",
  "scores": { "seo": 0-100, "a11y": 0-100, "ux": 0-100 },
  "suggestions": [
    { "type": "seo_meta", "title": "string", "meta_description": "string", "rationale": "string" },
    { "type": "image_alt", "items": [ { "attachment_id": 123, "alt": "string" } ], "rationale": "string" },
    { "type": "cta", "placements": [ { "cta_text": "string", "cta_url": "string", "location": "string" } ], "rationale": "string" },
    { "type": "rewrite_blocks", "items": [ { "client_id": "string", "before_hash": "sha256(string)", "after": "string", "rationale": "string" } ] }
  ]
}"#;

// ---------------------------------------------------------------------------
// Generator trait and provider responses
// ---------------------------------------------------------------------------

/// Anything that turns a prompt into a provider response.
pub trait ProposalGenerator {
    fn generate(&mut self, prompt: &str) -> Result<ProviderResponse>;
}

/// Response body of a language-model provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderResponse {
    /// A convenience field carrying the whole output text.
    Direct { output_text: String },
    /// Output items, each a list of typed content parts.
    Structured { output: Vec<OutputItem> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(other)]
    Other,
}

impl ProviderResponse {
    /// Concatenated output text.
    pub fn text(&self) -> String {
        match self {
            Self::Direct { output_text } => output_text.clone(),
            Self::Structured { output } => output
                .iter()
                .flat_map(|item| &item.content)
                .filter_map(|part| match part {
                    ContentPart::OutputText { text } => Some(text.as_str()),
                    ContentPart::Other => None,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed suggestions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltItem {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub attachment_id: i64,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtaPlacement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One suggestion entry, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Suggestion {
    SeoMeta {
        #[serde(default, deserialize_with = "loose_string")]
        title: String,
        #[serde(default, deserialize_with = "loose_string")]
        meta_description: String,
        #[serde(
            default,
            deserialize_with = "loose_opt_string",
            skip_serializing_if = "Option::is_none"
        )]
        rationale: Option<String>,
    },
    ImageAlt {
        #[serde(default, deserialize_with = "loose_items")]
        items: Vec<AltItem>,
        #[serde(
            default,
            deserialize_with = "loose_opt_string",
            skip_serializing_if = "Option::is_none"
        )]
        rationale: Option<String>,
    },
    Cta {
        #[serde(default, deserialize_with = "loose_items")]
        placements: Vec<CtaPlacement>,
        #[serde(
            default,
            deserialize_with = "loose_opt_string",
            skip_serializing_if = "Option::is_none"
        )]
        rationale: Option<String>,
    },
    RewriteBlocks {
        #[serde(default, deserialize_with = "loose_items")]
        items: Vec<RewriteItem>,
    },
    /// A type this system does not apply.
    #[serde(other)]
    Unsupported,
}

impl Suggestion {
    /// The wire name of this suggestion's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SeoMeta { .. } => "seo_meta",
            Self::ImageAlt { .. } => "image_alt",
            Self::Cta { .. } => "cta",
            Self::RewriteBlocks { .. } => "rewrite_blocks",
            Self::Unsupported => "unsupported",
        }
    }

    /// Decode one suggestion entry, rejecting types that cannot be applied.
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if kind.is_empty() {
            return Err(RedraftError::validation("missing suggestion type"));
        }
        let suggestion: Self = serde_json::from_value(value)
            .map_err(|e| RedraftError::validation(format!("invalid {kind} suggestion: {e}")))?;
        if suggestion == Self::Unsupported {
            return Err(RedraftError::validation(format!(
                "unsupported suggestion type: {kind}"
            )));
        }
        Ok(suggestion)
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------
//
// Generator output is loosely typed. A malformed list item or a field of the
// wrong JSON type must not reject the whole response: non-object items are
// dropped, and mistyped fields read as empty so the item is discarded later
// when it is applied.

/// Integer from a JSON number or a numeric string, `0` otherwise.
fn loose_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn str_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A list item that can be read from any JSON object.
trait LooseItem {
    fn from_object(object: &Map<String, Value>) -> Self;
}

impl LooseItem for RewriteItem {
    fn from_object(object: &Map<String, Value>) -> Self {
        RewriteItem {
            id: str_field(object, "client_id"),
            expected_fingerprint: str_field(object, "before_hash"),
            new_text: str_field(object, "after"),
        }
    }
}

impl LooseItem for AltItem {
    fn from_object(object: &Map<String, Value>) -> Self {
        AltItem {
            attachment_id: object.get("attachment_id").map_or(0, loose_i64),
            alt: str_field(object, "alt"),
        }
    }
}

impl LooseItem for CtaPlacement {
    fn from_object(object: &Map<String, Value>) -> Self {
        CtaPlacement {
            cta_text: opt_str_field(object, "cta_text"),
            cta_url: opt_str_field(object, "cta_url"),
            location: opt_str_field(object, "location"),
        }
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    Ok(loose_i64(&Value::deserialize(deserializer)?))
}

fn loose_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

fn loose_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

fn loose_items<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: LooseItem,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    let items: Vec<T> = entries
        .iter()
        .filter_map(Value::as_object)
        .map(T::from_object)
        .collect();
    if items.len() < entries.len() {
        debug!(dropped = entries.len() - items.len(), "non-object suggestion items dropped");
    }
    Ok(items)
}

/// Validated generator output for one document.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSet {
    pub document_id: redraft_shared::DocumentId,
    pub scores: Scores,
    pub suggestions: Vec<Suggestion>,
    /// The decoded response as returned by the generator.
    pub raw: Value,
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

fn json_list<T: Serialize>(items: &[T], cap: usize) -> String {
    serde_json::to_string(&items[..items.len().min(cap)]).unwrap_or_else(|_| "[]".into())
}

/// Render the instruction prompt for `snapshot` and the document's plain text.
pub fn build_prompt(snapshot: &AnalysisSnapshot, plain_text: &str, max_chars: usize) -> String {
    let body = truncate_chars(plain_text, max_chars);
    let seo = serde_json::to_string(&snapshot.seo).unwrap_or_else(|_| "{}".into());
    let scores = serde_json::to_string(&snapshot.scores).unwrap_or_else(|_| "{}".into());

    format!(
        r#"You are a website content optimization assistant.
Return ONLY valid JSON. No markdown. No commentary.

Goal: improve SEO, accessibility, UX and calls to action without changing factual meaning.
Return compact JSON. Keep each rationale under two sentences.

Constraints:
- Keep the tone professional and clear.
- Do not invent claims, prices or legal promises.
- SEO title: aim for 50-60 characters.
- Meta description: aim for 140-160 characters.
- CTA URL: prefer existing site paths such as /contact or /book.
- image_alt: describe the image in context; avoid keyword stuffing.
- rewrite_blocks: ONLY rewrite the listed candidates, at most 3, echoing client_id and before_hash unchanged. Preserve meaning.

OUTPUT MUST MATCH THIS JSON SHAPE:
{RESPONSE_SCHEMA}

Context:
Document ID: {id}
Document type: {kind}
Current title: {title}
Current SEO meta: {seo}
Headings: {headings}
Images missing alt text: {missing_alt}
Rewrite candidates (ONLY these blocks may be rewritten): {candidates}
Deterministic scores: {scores}

Document content (plain text):
"""
{body}
""""#,
        id = snapshot.document.id,
        kind = snapshot.document.kind,
        title = snapshot.document.title,
        headings = json_list(&snapshot.headings, PROMPT_HEADINGS),
        missing_alt = json_list(&snapshot.missing_alt, PROMPT_MISSING_ALT),
        candidates = json_list(&snapshot.rewrite_candidates, PROMPT_CANDIDATES),
    )
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Remove one surrounding Markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line.
    match inner.find('\n') {
        Some(newline) => inner[newline + 1..].trim(),
        None => inner.trim(),
    }
}

/// Decode and validate generator output text.
fn decode(text: &str) -> std::result::Result<(Value, Vec<Suggestion>), String> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| format!("response is not JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;
    let entries = object
        .get("suggestions")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing suggestions array".to_string())?;

    let mut suggestions = Vec::with_capacity(entries.len());
    for entry in entries {
        let has_type = entry
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.is_empty());
        if !entry.is_object() || !has_type {
            return Err("invalid suggestion entry".into());
        }
        let suggestion: Suggestion = serde_json::from_value(entry.clone())
            .map_err(|e| format!("invalid suggestion entry: {e}"))?;
        suggestions.push(suggestion);
    }
    Ok((value, suggestions))
}

/// Ask `generator` for suggestions on `snapshot`.
///
/// Output that fails to decode or validate is retried once with a stricter
/// JSON-only instruction; a second failure is a validation error.
#[instrument(skip_all, fields(document = %snapshot.document.id))]
pub fn suggest(
    generator: &mut dyn ProposalGenerator,
    snapshot: &AnalysisSnapshot,
    plain_text: &str,
    max_chars: usize,
) -> Result<SuggestionSet> {
    let prompt = build_prompt(snapshot, plain_text, max_chars);
    debug!(chars = prompt.chars().count(), "prompt built");

    let first = generator.generate(&prompt)?;
    let (raw, suggestions) = match decode(&first.text()) {
        Ok(decoded) => decoded,
        Err(reason) => {
            warn!(%reason, "generator output rejected, retrying with JSON-only instruction");
            let retry = generator.generate(&format!("{prompt}{STRICT_SUFFIX}"))?;
            decode(&retry.text()).map_err(|reason| {
                RedraftError::validation(format!("generator output failed validation: {reason}"))
            })?
        }
    };

    let scores = raw
        .get("scores")
        .and_then(|s| serde_json::from_value::<Scores>(s.clone()).ok())
        .unwrap_or(snapshot.scores);

    Ok(SuggestionSet {
        document_id: snapshot.document.id,
        scores,
        suggestions,
        raw,
    })
}
