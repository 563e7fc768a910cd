//! Plain-text helpers over block markup.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’-][\p{L}\p{N}]+)*").expect("valid regex"));

/// Elements whose boundaries separate words.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Strip all tags from an HTML fragment, dropping `<script>` and `<style>`
/// contents. Entities are decoded. Block-level boundaries become spaces,
/// runs of whitespace collapse to one space and the result is trimmed.
pub fn strip_tags(markup: &str) -> String {
    if !markup.contains('<') && !markup.contains('&') {
        return collapse_whitespace(markup);
    }

    let fragment = Html::parse_fragment(markup);
    let mut text = String::new();
    collect_text(fragment.root_element(), &mut text);
    collapse_whitespace(&text)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(chunk) = child.value().as_text() {
            out.push_str(chunk);
            continue;
        }
        let Some(child_element) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_element.value().name();
        if matches!(name, "script" | "style") {
            continue;
        }
        let separates = BLOCK_ELEMENTS.contains(&name);
        if separates {
            out.push(' ');
        }
        collect_text(child_element, out);
        if separates {
            out.push(' ');
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count words in the tag-stripped text of `markup`.
///
/// A word is a run of letters or digits, optionally joined by apostrophes or
/// hyphens (`don't`, `well-known`).
pub fn count_words(markup: &str) -> usize {
    WORD_RE.find_iter(&strip_tags(markup)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_trims() {
        assert_eq!(strip_tags("  <p>Hello <strong>world</strong></p>\n"), "Hello world");
        assert_eq!(strip_tags("plain"), "plain");
        assert_eq!(strip_tags(""), "");
    }

    #[test]
    fn drops_script_and_style() {
        let markup = "<p>Visible</p><script>alert('x')</script><style>p{color:red}</style>";
        assert_eq!(strip_tags(markup), "Visible");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(strip_tags("<p>Fish &amp; chips</p>"), "Fish & chips");
    }

    #[test]
    fn counts_words() {
        assert_eq!(count_words("<h1>Intro</h1><p>Short body.</p>"), 3);
        assert_eq!(count_words("<p>Don't over-think it</p>"), 3);
        assert_eq!(count_words("<p>Déjà vu 2024</p>"), 3);
        assert_eq!(count_words("<p> -- </p>"), 0);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn block_boundaries_separate_words() {
        assert_eq!(strip_tags("<h1>Intro</h1><p>Short body.</p>"), "Intro Short body.");
        assert_eq!(strip_tags("<ul><li>a</li><li>b</li></ul>"), "a b");
        assert_eq!(strip_tags("one<br>two"), "one two");
        assert_eq!(count_words("<ul><li>tea</li><li>cake</li></ul>"), 2);
    }

    #[test]
    fn inline_elements_do_not_separate() {
        assert_eq!(strip_tags("Hello <strong>world</strong>"), "Hello world");
        assert_eq!(strip_tags("<p>over<em>due</em></p>"), "overdue");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(strip_tags("<p>a\n   b</p>"), "a b");
        assert_eq!(strip_tags("  plain \t text "), "plain text");
    }

    #[test]
    fn script_words_are_not_counted() {
        assert_eq!(count_words("<p>one two</p><script>var a = b;</script>"), 2);
    }
}
