//! Tool catalog: names, descriptions, JSON input schemas and typed arguments.
//!
//! Block type enums in the schemas come from the loaded registry, so clients
//! only ever see types this server can normalize.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use plone_mcp_blocks::SchemaRegistry;
use plone_mcp_shared::{BlockMap, BlockSpec, PloneMcpError, Result};

/// Every tool this server answers, in catalog order.
pub const TOOL_NAMES: &[&str] = &[
    "get_content",
    "search_content",
    "create_content",
    "update_content",
    "delete_content",
    "prepare_blocks",
    "add_block",
    "update_block",
    "remove_block",
    "get_block_schema",
];

/// One entry of a `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Build the tool catalog for `registry`.
pub fn catalog(registry: &SchemaRegistry) -> Vec<ToolDefinition> {
    let block_types = registry.type_names();
    let block_spec = json!({
        "type": "object",
        "properties": {
            "type": { "type": "string", "enum": block_types },
            "data": {
                "type": "object",
                "description": "Type-specific fields; see get_block_schema"
            },
            "position": {
                "type": "integer",
                "minimum": 0,
                "description": "Insert index in the layout; appends when omitted or out of range"
            }
        },
        "required": ["type"]
    });
    let path = json!({
        "type": "string",
        "description": "Content path relative to the site root, e.g. /news/my-item"
    });
    let blocks = json!({
        "type": "object",
        "description": "Raw block mapping (id -> block). Ignored when blocks were prepared in the last 60 seconds"
    });
    let layout = json!({
        "type": "array",
        "items": { "type": "string" },
        "description": "Block ids in render order"
    });

    vec![
        ToolDefinition::new(
            "get_content",
            "Fetch a content item by path, including its blocks and layout.",
            json!({
                "type": "object",
                "properties": { "path": path },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "search_content",
            "Search the site catalog below a path.",
            json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "query": { "type": "string", "description": "Full-text search terms" },
                    "portal_type": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1 },
                    "params": {
                        "type": "object",
                        "description": "Extra @search query parameters passed through unchanged"
                    }
                }
            }),
        ),
        ToolDefinition::new(
            "create_content",
            "Create a content item. Uses blocks from prepare_blocks if called within the last 60 seconds, otherwise `blocks`/`blocks_layout`, otherwise a bare title block.",
            json!({
                "type": "object",
                "properties": {
                    "parent_path": path,
                    "type": { "type": "string", "default": "Document" },
                    "title": { "type": "string" },
                    "id": { "type": "string" },
                    "description": { "type": "string" },
                    "blocks": blocks,
                    "blocks_layout": layout,
                    "fields": { "type": "object", "description": "Additional content fields" }
                },
                "required": ["title"]
            }),
        ),
        ToolDefinition::new(
            "update_content",
            "Update a content item. Blocks are only replaced when prepared blocks, `blocks` or `blocks_layout` are present.",
            json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "blocks": blocks,
                    "blocks_layout": layout,
                    "fields": { "type": "object", "description": "Additional content fields" }
                },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "delete_content",
            "Delete a content item.",
            json!({
                "type": "object",
                "properties": { "path": path },
                "required": ["path"]
            }),
        ),
        ToolDefinition::new(
            "prepare_blocks",
            "Normalize a list of blocks (Markdown text, images, buttons, ...) and stage them for the next create_content or update_content call within 60 seconds.",
            json!({
                "type": "object",
                "properties": {
                    "blocks": { "type": "array", "items": block_spec }
                },
                "required": ["blocks"]
            }),
        ),
        ToolDefinition::new(
            "add_block",
            "Insert one block into an existing content item.",
            json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "type": block_spec["properties"]["type"],
                    "data": block_spec["properties"]["data"],
                    "position": block_spec["properties"]["position"]
                },
                "required": ["path", "type"]
            }),
        ),
        ToolDefinition::new(
            "update_block",
            "Merge fields into one block of an existing content item.",
            json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "block_id": { "type": "string" },
                    "data": { "type": "object" }
                },
                "required": ["path", "block_id", "data"]
            }),
        ),
        ToolDefinition::new(
            "remove_block",
            "Remove one block from an existing content item.",
            json!({
                "type": "object",
                "properties": {
                    "path": path,
                    "block_id": { "type": "string" }
                },
                "required": ["path", "block_id"]
            }),
        ),
        ToolDefinition::new(
            "get_block_schema",
            "Describe one block type, or list all block types with a worked example.",
            json!({
                "type": "object",
                "properties": {
                    "block_type": { "type": "string", "enum": block_types }
                }
            }),
        ),
    ]
}

/// Decode tool arguments, naming the tool in the error.
pub fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|e| PloneMcpError::validation(format!("invalid arguments for {tool}: {e}")))
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchArgs {
    #[serde(default)]
    pub path: String,
    pub query: Option<String>,
    pub portal_type: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl SearchArgs {
    /// Flatten into `@search` query pairs. Array params repeat their key.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(text) = &self.query {
            query.push(("SearchableText".to_string(), text.clone()));
        }
        if let Some(portal_type) = &self.portal_type {
            query.push(("portal_type".to_string(), portal_type.clone()));
        }
        if let Some(limit) = self.limit {
            query.push(("b_size".to_string(), limit.to_string()));
        }
        for (key, value) in &self.params {
            match value {
                Value::Array(items) => {
                    query.extend(items.iter().map(|item| (key.clone(), scalar(item))));
                }
                Value::Null => {}
                other => query.push((key.clone(), scalar(other))),
            }
        }
        query
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateContentArgs {
    #[serde(default)]
    pub parent_path: String,
    #[serde(rename = "type", default = "default_content_type")]
    pub content_type: String,
    pub title: String,
    pub id: Option<String>,
    pub description: Option<String>,
    pub blocks: Option<BlockMap>,
    pub blocks_layout: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

fn default_content_type() -> String {
    "Document".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentArgs {
    pub path: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub blocks: Option<BlockMap>,
    pub blocks_layout: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct PrepareBlocksArgs {
    pub blocks: Vec<BlockSpec>,
}

#[derive(Debug, Deserialize)]
pub struct AddBlockArgs {
    pub path: String,
    #[serde(flatten)]
    pub spec: BlockSpec,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBlockArgs {
    pub path: String,
    pub block_id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveBlockArgs {
    pub path: String,
    pub block_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockSchemaArgs {
    pub block_type: Option<String>,
}
