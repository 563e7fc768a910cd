//! Markup sanitizing for text written back into documents.

use scraper::{ElementRef, Html};
use url::Url;

use redraft_blocks::strip_tags;

/// Inline elements kept by [`sanitize_inline`], with the attributes each may carry.
const ALLOWED: &[(&str, &[&str])] = &[
    ("a", &["href", "title", "rel", "target"]),
    ("abbr", &["title"]),
    ("b", &[]),
    ("br", &[]),
    ("code", &[]),
    ("em", &[]),
    ("i", &[]),
    ("mark", &[]),
    ("s", &[]),
    ("span", &[]),
    ("strong", &[]),
    ("sub", &[]),
    ("sup", &[]),
    ("u", &[]),
];

/// Link schemes accepted in rewritten markup.
const HREF_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Reduce `markup` to allowlisted inline markup.
///
/// Disallowed elements are unwrapped (their content kept), `script` and
/// `style` are dropped with their content, disallowed attributes are removed
/// and links with an unsafe scheme lose their `href`.
pub fn sanitize_inline(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let mut out = String::with_capacity(markup.len());
    render_children(fragment.root_element(), &mut out);
    out.trim().to_string()
}

fn render_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&escape_text(text));
        } else if let Some(child) = ElementRef::wrap(child) {
            render_element(child, out);
        }
    }
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if matches!(name, "script" | "style") {
        return;
    }
    let Some((_, allowed_attrs)) = ALLOWED.iter().find(|(tag, _)| *tag == name) else {
        render_children(element, out);
        return;
    };

    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        if !allowed_attrs.contains(&attr) {
            continue;
        }
        if attr == "href" && !is_safe_href(value) {
            continue;
        }
        out.push_str(&format!(" {attr}=\"{}\"", escape_attr(value)));
    }
    if name == "br" {
        out.push_str(" />");
        return;
    }
    out.push('>');
    render_children(element, out);
    out.push_str(&format!("</{name}>"));
}

/// Whether `href` is relative or uses an allowed scheme.
fn is_safe_href(href: &str) -> bool {
    let compact: String = href
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let Some(colon) = compact.find(':') else {
        return true;
    };
    if compact[..colon].contains(['/', '?', '#']) {
        return true;
    }
    let scheme = compact[..colon].to_ascii_lowercase();
    HREF_SCHEMES.contains(&scheme.as_str())
}

/// Single-line plain text for meta fields and alt text.
pub fn plain_text(input: &str) -> String {
    strip_tags(input)
}

/// Validate a link target for inserted content. Accepts a site-relative path
/// or an absolute `http`, `https` or `mailto` URL.
pub fn safe_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }
    if trimmed.starts_with('/') && !trimmed.starts_with("//") {
        return Some(trimmed.to_string());
    }
    let url = Url::parse(trimmed).ok()?;
    matches!(url.scheme(), "http" | "https" | "mailto").then(|| url.to_string())
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
