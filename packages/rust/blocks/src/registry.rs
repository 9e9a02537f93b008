//! Block schema registry: the closed set of known block types, loaded once at startup.
//!
//! The built-in registry is embedded from `schema/blocks.json`; deployments may
//! point `blocks.schema_path` at their own file with the same shape.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use plone_mcp_shared::{PloneMcpError, Result, TITLE_BLOCK_TYPE};

/// The registry shipped with the binary.
const BUILTIN_REGISTRY: &str = include_str!("../schema/blocks.json");

/// How blocks of a type are normalized before they are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// The distinguished title block; data is always canonicalized.
    Title,
    /// Markdown `text` parsed into a rich-text `value`.
    RichText,
    /// Requires a reachable image `url`.
    Image,
    /// `href` normalized into a reference list.
    Reference,
    /// Passed through with only the discriminator added.
    #[default]
    Opaque,
}

/// Declarative description of one block type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub kind: BlockKind,
    pub description: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// A block type name that has been looked up in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockType {
    name: String,
    kind: BlockKind,
}

impl BlockType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }
}

#[derive(Deserialize)]
struct RegistryDocument {
    blocks: BTreeMap<String, BlockSchema>,
    #[serde(default)]
    example: Value,
}

/// Immutable map from block type name to its schema.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, BlockSchema>,
    example: Value,
}

impl SchemaRegistry {
    /// Load the embedded registry.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_REGISTRY)
    }

    /// Load a registry from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PloneMcpError::io(path, e))?;
        let registry = Self::from_json(&content).map_err(|e| {
            PloneMcpError::config(format!("invalid block registry {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), types = registry.entries.len(), "loaded block registry");
        Ok(registry)
    }

    /// Parse and validate a registry document.
    pub fn from_json(content: &str) -> Result<Self> {
        let doc: RegistryDocument = serde_json::from_str(content)
            .map_err(|e| PloneMcpError::config(format!("block registry is not valid: {e}")))?;

        match doc.blocks.get(TITLE_BLOCK_TYPE) {
            Some(schema) if schema.kind == BlockKind::Title => {}
            Some(_) => {
                return Err(PloneMcpError::config(format!(
                    "registry entry '{TITLE_BLOCK_TYPE}' must have kind \"title\""
                )));
            }
            None => {
                return Err(PloneMcpError::config(format!(
                    "registry has no '{TITLE_BLOCK_TYPE}' block type"
                )));
            }
        }
        if let Some((name, _)) = doc
            .blocks
            .iter()
            .find(|(name, schema)| schema.kind == BlockKind::Title && *name != TITLE_BLOCK_TYPE)
        {
            return Err(PloneMcpError::config(format!(
                "only '{TITLE_BLOCK_TYPE}' may have kind \"title\", found '{name}'"
            )));
        }

        debug!(types = doc.blocks.len(), "block registry parsed");
        Ok(Self {
            entries: doc.blocks,
            example: doc.example,
        })
    }

    /// Look up a caller-supplied type name, failing for anything unregistered.
    pub fn resolve(&self, name: &str) -> Result<BlockType> {
        match self.entries.get(name) {
            Some(schema) => Ok(BlockType {
                name: name.to_string(),
                kind: schema.kind,
            }),
            None => Err(PloneMcpError::not_found(
                "block type",
                name,
                self.type_names(),
            )),
        }
    }

    /// Classify a type found in stored content; unregistered types are opaque.
    pub fn classify(&self, name: &str) -> BlockType {
        let kind = self
            .entries
            .get(name)
            .map(|schema| schema.kind)
            .unwrap_or_default();
        BlockType {
            name: name.to_string(),
            kind,
        }
    }

    /// All registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// One entry (with its name), or the whole registry plus a worked example.
    pub fn describe(&self, name: Option<&str>) -> Result<Value> {
        match name {
            Some(name) => {
                let schema = self.entries.get(name).ok_or_else(|| {
                    PloneMcpError::not_found("block type", name, self.type_names())
                })?;
                let mut entry = serde_json::to_value(schema)?;
                if let Value::Object(map) = &mut entry {
                    map.insert("type".into(), Value::String(name.to_string()));
                }
                Ok(entry)
            }
            None => Ok(json!({
                "block_types": serde_json::to_value(&self.entries)?,
                "example": self.example,
            })),
        }
    }
}
