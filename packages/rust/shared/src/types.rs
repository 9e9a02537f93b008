//! Core block-document types shared by the parser, the assembly engine and the REST layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminator key embedded in every block record.
pub const TYPE_KEY: &str = "@type";

/// Block type of the distinguished, always-first title block.
pub const TITLE_BLOCK_TYPE: &str = "title";

/// Block id → block record. Insertion order is preserved.
pub type BlockMap = Map<String, Value>;

/// Read the `@type` discriminator of a block record.
pub fn block_type_of(block: &Value) -> Option<&str> {
    block.get(TYPE_KEY).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// BlockSet
// ---------------------------------------------------------------------------

/// A document's blocks plus their render order.
///
/// On the wire this is `{"blocks": {..}, "blocks_layout": {"items": [..]}}`,
/// the shape Plone's REST API reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireBlockSet", into = "WireBlockSet")]
pub struct BlockSet {
    /// Block records keyed by id.
    pub blocks: BlockMap,
    /// Block ids in render order.
    pub layout: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
struct WireBlockSet {
    #[serde(default)]
    blocks: BlockMap,
    #[serde(default)]
    blocks_layout: WireLayout,
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct WireLayout {
    #[serde(default)]
    items: Vec<String>,
}

impl From<WireBlockSet> for BlockSet {
    fn from(wire: WireBlockSet) -> Self {
        Self {
            blocks: wire.blocks,
            layout: wire.blocks_layout.items,
        }
    }
}

impl From<BlockSet> for WireBlockSet {
    fn from(set: BlockSet) -> Self {
        Self {
            blocks: set.blocks,
            blocks_layout: WireLayout { items: set.layout },
        }
    }
}

impl BlockSet {
    /// Build from already-separated parts.
    pub fn new(blocks: BlockMap, layout: Vec<String>) -> Self {
        Self { blocks, layout }
    }

    /// Extract the block collection from a fetched content item.
    ///
    /// Missing or malformed `blocks` / `blocks_layout` yield empty parts;
    /// non-string layout entries are skipped.
    pub fn from_document(doc: &Value) -> Self {
        let blocks = doc
            .get("blocks")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let layout = doc
            .get("blocks_layout")
            .and_then(|l| l.get("items"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self { blocks, layout }
    }

    /// Render as the `{blocks, blocks_layout}` fragment of a POST/PATCH body.
    pub fn to_patch(&self) -> Value {
        serde_json::json!({
            "blocks": self.blocks,
            "blocks_layout": { "items": self.layout },
        })
    }

    /// Ids currently present in the block mapping, in mapping order.
    pub fn ids(&self) -> Vec<String> {
        self.blocks.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// BlockSpec
// ---------------------------------------------------------------------------

/// A caller-supplied `(type, data, position?)` triple awaiting normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Registered block type name.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Raw, type-specific fields.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Optional insertion index; out-of-range values append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl BlockSpec {
    /// Spec appended at the end.
    pub fn new(block_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            block_type: block_type.into(),
            data,
            position: None,
        }
    }

    /// Same spec, inserted at `position`.
    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// Which write operation is resolving its block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

/// How requests to the Plone site authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Basic { username: String, password: String },
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Self::Token(_) => write!(f, "Token(***)"),
        }
    }
}
