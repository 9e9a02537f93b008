//! Document AST: typed rich-text nodes, serialized as Slate JSON.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Heading depth, always within `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    /// Level used when a heading carries no usable depth.
    pub const DEFAULT: HeadingLevel = HeadingLevel(2);

    /// Clamp `level` into `1..=6`; `None` yields [`HeadingLevel::DEFAULT`].
    pub fn new(level: Option<i64>) -> Self {
        match level {
            Some(n) => Self(n.clamp(1, 6) as u8),
            None => Self::DEFAULT,
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for HeadingLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Kind tag of an element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Paragraph,
    Heading(HeadingLevel),
    BlockQuote,
    OrderedList,
    UnorderedList,
    ListItem,
    Bold,
    Italic,
    Strikethrough,
    Superscript,
    Subscript,
    Link { url: String, title: Option<String> },
}

impl NodeKind {
    /// The Slate element `type` this kind renders as.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Paragraph => "p",
            Self::Heading(level) => match level.get() {
                1 => "h1",
                2 => "h2",
                3 => "h3",
                4 => "h4",
                5 => "h5",
                _ => "h6",
            },
            Self::BlockQuote => "blockquote",
            Self::OrderedList => "ol",
            Self::UnorderedList => "ul",
            Self::ListItem => "li",
            Self::Bold => "strong",
            Self::Italic => "em",
            Self::Strikethrough => "del",
            Self::Superscript => "sup",
            Self::Subscript => "sub",
            Self::Link { .. } => "link",
        }
    }

    /// Whether this kind lives inside a block (as opposed to being one).
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Self::Bold
                | Self::Italic
                | Self::Strikethrough
                | Self::Superscript
                | Self::Subscript
                | Self::Link { .. }
        )
    }
}

/// One node of parsed rich text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element { kind: NodeKind, children: Vec<Node> },
    Text(String),
}

impl Node {
    /// A text leaf.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// An element. Empty `children` become a single empty text leaf,
    /// so no element is ever childless.
    pub fn element(kind: NodeKind, mut children: Vec<Node>) -> Self {
        if children.is_empty() {
            children.push(Node::text(""));
        }
        Self::Element { kind, children }
    }

    /// A heading wrapping `text` as its only child.
    pub fn heading(level: HeadingLevel, text: impl Into<String>) -> Self {
        Self::element(NodeKind::Heading(level), vec![Node::text(text)])
    }

    /// Whether the node belongs inside a block rather than at top level.
    pub fn is_inline(&self) -> bool {
        match self {
            Self::Text(_) => true,
            Self::Element { kind, .. } => kind.is_inline(),
        }
    }

    /// Concatenated text of all leaves below this node.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(text),
            Self::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }
}

struct LinkData<'a> {
    url: &'a str,
    title: Option<&'a str>,
}

impl Serialize for LinkData<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("url", self.url)?;
        if let Some(title) = self.title {
            map.serialize_entry("title", title)?;
        }
        map.end()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("text", text)?;
                map.end()
            }
            Self::Element { kind, children } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", kind.tag())?;
                if let NodeKind::Link { url, title } = kind {
                    let data = LinkData {
                        url,
                        title: title.as_deref(),
                    };
                    map.serialize_entry("data", &data)?;
                }
                map.serialize_entry("children", children)?;
                map.end()
            }
        }
    }
}
