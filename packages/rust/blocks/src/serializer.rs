//! Block tree serializer, the inverse of [`parse`](crate::parse).

use tracing::warn;

use crate::{Attributes, Block, InnerPiece};

/// Serialize a block sequence back to delimited markup.
pub fn serialize(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        write_block(block, &mut out);
    }
    out
}

fn write_block(block: &Block, out: &mut String) {
    let Some(name) = block.kind.name() else {
        write_content(block, out);
        return;
    };
    let name = name.strip_prefix("core/").unwrap_or(name);
    let attrs = serialize_attrs(&block.attrs);

    let mut content = String::new();
    write_content(block, &mut content);

    if content.is_empty() {
        out.push_str(&format!("<!-- wp:{name} {attrs}/-->"));
    } else {
        out.push_str(&format!("<!-- wp:{name} {attrs}-->"));
        out.push_str(&content);
        out.push_str(&format!("<!-- /wp:{name} -->"));
    }
}

/// Interleave the block's own markup with its serialized children.
fn write_content(block: &Block, out: &mut String) {
    let mut children = block.children().iter();
    for piece in block.pieces() {
        match piece {
            InnerPiece::Markup(markup) => out.push_str(markup),
            InnerPiece::Child => {
                if let Some(child) = children.next() {
                    write_block(child, out);
                }
            }
        }
    }
}

/// Attribute JSON followed by a space, or nothing for an empty map.
fn serialize_attrs(attrs: &Attributes) -> String {
    if attrs.is_empty() {
        return String::new();
    }
    let json = serde_json::to_string(attrs).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize block attributes");
        "{}".to_string()
    });
    format!("{} ", escape_attr_json(&json))
}

/// Rewrite `--`, `<`, `>`, `&` and escaped quotes as unicode escapes so
/// attribute content can never close the surrounding comment.
fn escape_attr_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') => out.push_str("\\u0022"),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                out.push_str("\\u002d\\u002d");
            }
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttrValue, BlockKind, parse, walk};

    fn fixture(name: &str) -> String {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/blocks")
            .join(name);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    /// Kinds, depth and attributes of every block, in traversal order.
    fn shape(blocks: &[Block]) -> Vec<(BlockKind, Attributes, usize)> {
        walk(blocks)
            .map(|b| (b.kind.clone(), b.attrs.clone(), b.children().len()))
            .collect()
    }

    #[test]
    fn simple_document_is_byte_identical() {
        let doc = "<!-- wp:heading {\"level\":1} -->\n<h1>Intro</h1>\n<!-- /wp:heading -->\n\n<!-- wp:paragraph -->\n<p>Short body.</p>\n<!-- /wp:paragraph -->\n\n<!-- wp:image {\"id\":3} /-->";
        assert_eq!(serialize(&parse(doc)), doc);
    }

    #[test]
    fn empty_block_serializes_as_void() {
        let blocks = vec![Block::new(BlockKind::Image, Attributes::new())];
        assert_eq!(serialize(&blocks), "<!-- wp:image /-->");
    }

    #[test]
    fn attributes_are_escaped() {
        let mut attrs = Attributes::new();
        attrs.insert("note".into(), AttrValue::from("a --> b & <c>"));
        let mut block = Block::new(BlockKind::Paragraph, attrs);
        block.push_markup("<p>x</p>");
        let out = serialize(&[block.clone()]);
        assert!(!out.contains("a -->"));
        assert!(out.contains("\\u002d\\u002d"));

        let reparsed = parse(&out);
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].attrs, block.attrs);
        assert_eq!(reparsed[0].inner_markup(), "<p>x</p>");
    }

    #[test]
    fn escaping_keeps_backslashes_intact() {
        assert_eq!(escape_attr_json(r#"{"a":"x\"y"}"#), r#"{"a":"x\u0022y"}"#);
        assert_eq!(escape_attr_json(r#"{"a":"x\\"}"#), r#"{"a":"x\\"}"#);
        assert_eq!(escape_attr_json(r#"{"a":"--->"}"#), r#"{"a":"\u002d\u002d-\u003e"}"#);
    }

    #[test]
    fn roundtrip_preserves_structure_of_fixture() {
        let doc = fixture("nested.html");
        let tree = parse(&doc);
        assert!(!tree.is_empty());
        let reparsed = parse(&serialize(&tree));
        assert_eq!(shape(&tree), shape(&reparsed));
        assert_eq!(tree, reparsed);
    }

    #[test]
    fn roundtrip_after_mutation() {
        let doc = fixture("nested.html");
        let mut tree = parse(&doc);
        for block in tree.iter_mut() {
            if block.kind == BlockKind::Paragraph {
                block.replace_inner_markup("<p>changed</p>");
                block.attrs.insert("__redraftId".into(), AttrValue::from("abc"));
            }
        }
        let reparsed = parse(&serialize(&tree));
        assert_eq!(shape(&tree), shape(&reparsed));
    }
}
