//! Markdown → rich-text document AST.
//!
//! Parses Markdown with `pulldown-cmark` and converts the event stream into the
//! typed node tree that rich-text blocks store as their `value`:
//! 1. Fold events into a generic syntax tree
//! 2. Transform it bottom-up, mapping each tag to a [`NodeKind`]
//! 3. Splice the content of constructs with no matching kind into their parent
//!
//! Horizontal rules are recognized but produce no node; divider rendering is a
//! separate block type, not part of parsed text.

mod node;
mod tree;

use pulldown_cmark::{Options, Parser};
use tracing::{instrument, trace};

use plone_mcp_shared::{PloneMcpError, Result};

pub use node::{HeadingLevel, Node, NodeKind};

/// Markdown extensions understood by [`parse`].
fn options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_SUPERSCRIPT | Options::ENABLE_SUBSCRIPT
}

/// Parse Markdown text into top-level document nodes.
///
/// Never fails: constructs without a matching node kind degrade to their
/// content. Empty input yields an empty sequence.
#[instrument(skip_all, fields(len = markdown.len()))]
pub fn parse(markdown: &str) -> Vec<Node> {
    if markdown.is_empty() {
        return Vec::new();
    }
    let nodes = tree::events_to_nodes(Parser::new_ext(markdown, options()));
    trace!(top_level = nodes.len(), "markdown parsed");
    nodes
}

/// Parse raw bytes, rejecting input that is not valid UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<Vec<Node>> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        PloneMcpError::parse(format!(
            "input is not valid UTF-8 (first bad byte at offset {})",
            e.valid_up_to()
        ))
    })?;
    Ok(parse(text))
}

/// A one-node value wrapping `text` in a heading, bypassing Markdown parsing.
pub fn heading_value(level: HeadingLevel, text: &str) -> Vec<Node> {
    vec![Node::heading(level, text)]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
