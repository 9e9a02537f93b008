//! Two-stage conversion: pulldown-cmark events → generic syntax tree → document AST.

use pulldown_cmark::{Event, Tag};

use crate::node::{HeadingLevel, Node, NodeKind};

// ---------------------------------------------------------------------------
// Stage 1: generic syntax tree
// ---------------------------------------------------------------------------

/// Element tags of the intermediate tree. Anything the AST has no kind for is `Opaque`.
#[derive(Debug, Clone, PartialEq)]
enum SyntaxTag {
    Paragraph,
    Heading(u8),
    BlockQuote,
    List { ordered: bool },
    Item,
    Strong,
    Emphasis,
    Strikethrough,
    Superscript,
    Subscript,
    Link { url: String, title: String },
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
enum Syntax {
    Element { tag: SyntaxTag, children: Vec<Syntax> },
    Text(String),
    ThematicBreak,
}

fn syntax_tag(tag: Tag<'_>) -> SyntaxTag {
    match tag {
        Tag::Paragraph => SyntaxTag::Paragraph,
        Tag::Heading { level, .. } => SyntaxTag::Heading(level as u8),
        Tag::BlockQuote(_) => SyntaxTag::BlockQuote,
        Tag::List(start) => SyntaxTag::List {
            ordered: start.is_some(),
        },
        Tag::Item => SyntaxTag::Item,
        Tag::Strong => SyntaxTag::Strong,
        Tag::Emphasis => SyntaxTag::Emphasis,
        Tag::Strikethrough => SyntaxTag::Strikethrough,
        Tag::Superscript => SyntaxTag::Superscript,
        Tag::Subscript => SyntaxTag::Subscript,
        Tag::Link {
            dest_url, title, ..
        } => SyntaxTag::Link {
            url: dest_url.into_string(),
            title: title.into_string(),
        },
        _ => SyntaxTag::Opaque,
    }
}

/// Fold the flat event stream into a tree with an explicit frame stack.
fn build_syntax<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Syntax> {
    let mut stack: Vec<(SyntaxTag, Vec<Syntax>)> = Vec::new();
    let mut roots: Vec<Syntax> = Vec::new();

    for event in events {
        let leaf = match event {
            Event::Start(tag) => {
                stack.push((syntax_tag(tag), Vec::new()));
                continue;
            }
            Event::End(_) => match stack.pop() {
                Some((tag, children)) => Syntax::Element { tag, children },
                None => continue,
            },
            Event::Text(text) | Event::Code(text) | Event::Html(text) | Event::InlineHtml(text) => {
                Syntax::Text(text.into_string())
            }
            Event::SoftBreak | Event::HardBreak => Syntax::Text("\n".to_string()),
            Event::Rule => Syntax::ThematicBreak,
            _ => continue,
        };

        match stack.last_mut() {
            Some((_, children)) => children.push(leaf),
            None => roots.push(leaf),
        }
    }

    // Unbalanced streams should not happen; close whatever is left.
    while let Some((tag, children)) = stack.pop() {
        let node = Syntax::Element { tag, children };
        match stack.last_mut() {
            Some((_, parent)) => parent.push(node),
            None => roots.push(node),
        }
    }

    roots
}

// ---------------------------------------------------------------------------
// Stage 2: bottom-up transform
// ---------------------------------------------------------------------------

fn node_kind(tag: SyntaxTag) -> Option<NodeKind> {
    let kind = match tag {
        SyntaxTag::Paragraph => NodeKind::Paragraph,
        SyntaxTag::Heading(level) => NodeKind::Heading(HeadingLevel::new(Some(i64::from(level)))),
        SyntaxTag::BlockQuote => NodeKind::BlockQuote,
        SyntaxTag::List { ordered: true } => NodeKind::OrderedList,
        SyntaxTag::List { ordered: false } => NodeKind::UnorderedList,
        SyntaxTag::Item => NodeKind::ListItem,
        SyntaxTag::Strong => NodeKind::Bold,
        SyntaxTag::Emphasis => NodeKind::Italic,
        SyntaxTag::Strikethrough => NodeKind::Strikethrough,
        SyntaxTag::Superscript => NodeKind::Superscript,
        SyntaxTag::Subscript => NodeKind::Subscript,
        SyntaxTag::Link { url, title } => NodeKind::Link {
            url,
            title: (!title.is_empty()).then_some(title),
        },
        SyntaxTag::Opaque => return None,
    };
    Some(kind)
}

/// Append `node`, merging adjacent text leaves.
fn push_node(out: &mut Vec<Node>, node: Node) {
    if let (Some(Node::Text(prev)), Node::Text(next)) = (out.last_mut(), &node) {
        prev.push_str(next);
        return;
    }
    out.push(node);
}

fn transform(syntax: Syntax, out: &mut Vec<Node>) {
    match syntax {
        Syntax::Text(text) => push_node(out, Node::Text(text)),
        // Horizontal rules are intentionally not rendered from parsed text.
        Syntax::ThematicBreak => {}
        Syntax::Element { tag, children } => {
            let mut transformed = Vec::with_capacity(children.len());
            for child in children {
                transform(child, &mut transformed);
            }
            match node_kind(tag) {
                Some(kind) => out.push(Node::element(kind, transformed)),
                // Unsupported constructs: splice their content into the parent.
                None => {
                    for node in transformed {
                        push_node(out, node);
                    }
                }
            }
        }
    }
}

/// Top-level inline runs (left over from spliced constructs) are wrapped in paragraphs.
fn wrap_inline_runs(nodes: Vec<Node>) -> Vec<Node> {
    let mut blocks = Vec::with_capacity(nodes.len());
    let mut run: Vec<Node> = Vec::new();

    for node in nodes {
        if node.is_inline() {
            run.push(node);
            continue;
        }
        if !run.is_empty() {
            blocks.push(Node::element(NodeKind::Paragraph, std::mem::take(&mut run)));
        }
        blocks.push(node);
    }
    if !run.is_empty() {
        blocks.push(Node::element(NodeKind::Paragraph, run));
    }

    blocks
}

pub(crate) fn events_to_nodes<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Node> {
    let mut nodes = Vec::new();
    for syntax in build_syntax(events) {
        transform(syntax, &mut nodes);
    }
    wrap_inline_runs(nodes)
}
