//! Block delimiter parser.
//!
//! Scans the document for `<!-- wp:name {attrs} -->`, `<!-- /wp:name -->` and
//! void `<!-- wp:name {attrs} /-->` delimiters, building the tree with an
//! explicit stack of open blocks. Markup between delimiters is attached to the
//! innermost open block, or becomes a freeform segment at the top level.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, instrument, warn};

use crate::{Attributes, Block, BlockKind};

static DELIMITER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<!--\s+(?P<closer>/)?wp:(?P<namespace>[a-z][a-z0-9_-]*/)?(?P<name>[a-z][a-z0-9_-]*)\s+(?P<attrs>\{.*?\}\s+)?(?P<void>/)?-->",
    )
    .expect("valid regex")
});

/// Parse block markup into a tree.
///
/// Returns an empty sequence when the markup contains no block delimiter at
/// all; callers treat that as unstructured content.
#[instrument(skip_all, fields(len = markup.len()))]
pub fn parse(markup: &str) -> Vec<Block> {
    let mut output: Vec<Block> = Vec::new();
    let mut stack: Vec<Block> = Vec::new();
    let mut cursor = 0;
    let mut found_delimiter = false;

    for caps in DELIMITER_RE.captures_iter(markup) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        found_delimiter = true;

        push_markup(&mut stack, &mut output, &markup[cursor..whole.start()]);
        cursor = whole.end();

        if caps.name("closer").is_some() {
            match stack.pop() {
                Some(block) => attach(&mut stack, &mut output, block),
                None => {
                    debug!(delimiter = whole.as_str(), "closer without open block, kept as markup");
                    push_markup(&mut stack, &mut output, whole.as_str());
                }
            }
            continue;
        }

        let block = Block::new(block_kind(&caps), block_attrs(&caps));
        if caps.name("void").is_some() {
            attach(&mut stack, &mut output, block);
        } else {
            stack.push(block);
        }
    }

    if !found_delimiter {
        return Vec::new();
    }

    push_markup(&mut stack, &mut output, &markup[cursor..]);

    while let Some(block) = stack.pop() {
        debug!(kind = ?block.kind, "closing unterminated block at end of input");
        attach(&mut stack, &mut output, block);
    }

    output
}

fn block_kind(caps: &Captures<'_>) -> BlockKind {
    let namespace = caps.name("namespace").map_or("core/", |m| m.as_str());
    let name = caps.name("name").map_or("", |m| m.as_str());
    BlockKind::from_name(&format!("{namespace}{name}"))
}

fn block_attrs(caps: &Captures<'_>) -> Attributes {
    let Some(raw) = caps.name("attrs") else {
        return Attributes::new();
    };
    serde_json::from_str(raw.as_str().trim()).unwrap_or_else(|e| {
        warn!(error = %e, "invalid block attribute JSON, using empty attributes");
        Attributes::new()
    })
}

/// Add markup to the innermost open block, or to a top-level freeform segment.
fn push_markup(stack: &mut [Block], output: &mut Vec<Block>, markup: &str) {
    if markup.is_empty() {
        return;
    }
    if let Some(open) = stack.last_mut() {
        open.push_markup(markup);
        return;
    }
    match output.last_mut() {
        Some(last) if last.kind == BlockKind::Freeform => last.push_markup(markup),
        _ => output.push(Block::freeform(markup)),
    }
}

/// Attach a finished block to its parent, or to the top level.
fn attach(stack: &mut [Block], output: &mut Vec<Block>, block: Block) {
    match stack.last_mut() {
        Some(parent) => parent.push_child(block),
        None => output.push(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    #[test]
    fn plain_html_has_no_blocks() {
        assert!(parse("<h1>Title</h1><p>Body</p>").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn parses_simple_blocks() {
        let doc = "<!-- wp:heading {\"level\":1} -->\n<h1>Intro</h1>\n<!-- /wp:heading -->\n\n<!-- wp:paragraph -->\n<p>Short body.</p>\n<!-- /wp:paragraph -->";
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].kind, BlockKind::Heading);
        assert_eq!(blocks[0].attrs["level"], AttrValue::Integer(1));
        assert_eq!(blocks[0].inner_markup(), "\n<h1>Intro</h1>\n");
        assert_eq!(blocks[1].kind, BlockKind::Freeform);
        assert_eq!(blocks[1].inner_markup(), "\n\n");
        assert_eq!(blocks[2].kind, BlockKind::Paragraph);
        assert_eq!(blocks[2].text(), "Short body.");
    }

    #[test]
    fn parses_void_and_namespaced_blocks() {
        let doc = r#"<!-- wp:image {"id":42} /--><!-- wp:acme/card {"tone":"warm"} --><div>x</div><!-- /wp:acme/card -->"#;
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Image);
        assert_eq!(blocks[0].attachment_id(), 42);
        assert!(blocks[0].inner_markup().is_empty());
        assert_eq!(blocks[1].kind, BlockKind::Other("acme/card".into()));
        assert_eq!(blocks[1].attrs["tone"], AttrValue::String("warm".into()));
    }

    #[test]
    fn nests_children_in_order() {
        let doc = concat!(
            "<!-- wp:group -->",
            "<div class=\"g\">",
            "<!-- wp:paragraph --><p>one</p><!-- /wp:paragraph -->",
            "<!-- wp:group --><div><!-- wp:paragraph --><p>two</p><!-- /wp:paragraph --></div><!-- /wp:group -->",
            "</div>",
            "<!-- /wp:group -->"
        );
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 1);
        let group = &blocks[0];
        assert_eq!(group.inner_markup(), "<div class=\"g\"></div>");
        assert_eq!(group.children().len(), 2);
        assert_eq!(group.children()[0].text(), "one");
        assert_eq!(group.children()[1].children()[0].text(), "two");
    }

    #[test]
    fn attribute_json_with_nested_braces() {
        let doc = r#"<!-- wp:heading {"level":3,"style":{"typography":{"fontSize":"2rem"}}} --><h3>Deep</h3><!-- /wp:heading -->"#;
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].level(), 3);
        assert!(matches!(blocks[0].attrs["style"], AttrValue::Map(_)));
        assert_eq!(blocks[0].text(), "Deep");
    }

    #[test]
    fn invalid_attribute_json_yields_empty_attrs() {
        let doc = r#"<!-- wp:paragraph {"broken": } --><p>x</p><!-- /wp:paragraph -->"#;
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].attrs.is_empty());
        assert_eq!(blocks[0].text(), "x");
    }

    #[test]
    fn unclosed_block_is_closed_at_end() {
        let doc = "<!-- wp:paragraph --><p>dangling</p>";
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(blocks[0].text(), "dangling");
    }

    #[test]
    fn stray_closer_is_kept_as_freeform() {
        let doc = "<p>intro</p><!-- /wp:paragraph --><!-- wp:paragraph --><p>x</p><!-- /wp:paragraph -->";
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Freeform);
        assert_eq!(blocks[0].inner_markup(), "<p>intro</p><!-- /wp:paragraph -->");
    }

    #[test]
    fn ordinary_comments_are_not_delimiters() {
        let doc = "<!-- a note --><!-- wp:paragraph --><p>x</p><!-- /wp:paragraph -->";
        let blocks = parse(doc);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].inner_markup(), "<!-- a note -->");
    }
}
