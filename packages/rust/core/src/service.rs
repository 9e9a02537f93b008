//! Tool handlers: each tool call maps to REST calls on the site plus block
//! assembly through the engine.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use plone_mcp_blocks::{AssemblyEngine, STAGING_TTL_SECS};
use plone_mcp_client::PloneClient;
use plone_mcp_shared::{BlockSet, PloneMcpError, Result, WriteKind};

use crate::tools::{
    self, AddBlockArgs, BlockSchemaArgs, CreateContentArgs, PathArgs, PrepareBlocksArgs,
    RemoveBlockArgs, SearchArgs, ToolDefinition, UpdateBlockArgs, UpdateContentArgs, parse_args,
};

/// Keys copied from a content item into tool results.
const SUMMARY_KEYS: &[&str] = &["@id", "@type", "id", "UID", "title", "review_state"];

/// Dispatches tool calls against one Plone site.
pub struct ContentService {
    client: PloneClient,
    engine: Arc<AssemblyEngine>,
    tools: Vec<ToolDefinition>,
}

impl ContentService {
    pub fn new(client: PloneClient, engine: Arc<AssemblyEngine>) -> Self {
        let tools = tools::catalog(engine.registry());
        Self {
            client,
            engine,
            tools,
        }
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn engine(&self) -> &AssemblyEngine {
        &self.engine
    }

    /// Run tool `name`. Unknown names are a [`PloneMcpError::NotFound`].
    #[instrument(skip(self, arguments))]
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let result = match name {
            "get_content" => self.get_content(parse_args(name, arguments)?).await,
            "search_content" => self.search_content(parse_args(name, arguments)?).await,
            "create_content" | "update_content" => {
                let result = self.write_content(name, arguments).await;
                self.discard_on_error(result).await
            }
            "delete_content" => self.delete_content(parse_args(name, arguments)?).await,
            "prepare_blocks" => {
                let result = match parse_args(name, arguments) {
                    Ok(args) => self.prepare_blocks(args).await,
                    Err(e) => Err(e),
                };
                self.discard_on_error(result).await
            }
            "add_block" => self.add_block(parse_args(name, arguments)?).await,
            "update_block" => self.update_block(parse_args(name, arguments)?).await,
            "remove_block" => self.remove_block(parse_args(name, arguments)?).await,
            "get_block_schema" => self.get_block_schema(parse_args(name, arguments)?),
            _ => Err(PloneMcpError::not_found(
                "tool",
                name,
                tools::TOOL_NAMES.iter().copied(),
            )),
        };
        if let Err(e) = &result {
            warn!(tool = name, error = %e, "tool call failed");
        }
        result
    }

    async fn write_content(&self, name: &str, arguments: Value) -> Result<Value> {
        if name == "create_content" {
            self.create_content(parse_args(name, arguments)?).await
        } else {
            self.update_content(parse_args(name, arguments)?).await
        }
    }

    /// Any failure of a staging-aware tool leaves nothing staged.
    async fn discard_on_error(&self, result: Result<Value>) -> Result<Value> {
        if result.is_err() {
            self.engine.discard_staged().await;
        }
        result
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    async fn get_content(&self, args: PathArgs) -> Result<Value> {
        self.client.get(&args.path).await
    }

    async fn search_content(&self, args: SearchArgs) -> Result<Value> {
        self.client.search(&args.path, &args.to_query()).await
    }

    async fn create_content(&self, args: CreateContentArgs) -> Result<Value> {
        let CreateContentArgs {
            parent_path,
            content_type,
            title,
            id,
            description,
            blocks,
            blocks_layout,
            fields,
        } = args;

        let mut body = fields;
        body.insert("@type".into(), Value::String(content_type));
        body.insert("title".into(), Value::String(title));
        if let Some(id) = id {
            body.insert("id".into(), Value::String(id));
        }
        if let Some(description) = description {
            body.insert("description".into(), Value::String(description));
        }

        let set = self
            .engine
            .resolve_for_write(blocks, blocks_layout, WriteKind::Create)
            .await
            .unwrap_or_default();
        insert_blocks(&mut body, &set);

        let created = self.client.post(&parent_path, &Value::Object(body)).await?;
        info!(parent = %parent_path, blocks = set.layout.len(), "content created");
        Ok(summarize(&created, &parent_path, Some(&set)))
    }

    async fn update_content(&self, args: UpdateContentArgs) -> Result<Value> {
        let UpdateContentArgs {
            path,
            title,
            description,
            blocks,
            blocks_layout,
            fields,
        } = args;

        let mut body = fields;
        if let Some(title) = title {
            body.insert("title".into(), Value::String(title));
        }
        if let Some(description) = description {
            body.insert("description".into(), Value::String(description));
        }

        // A reorder without new blocks keeps the blocks already stored.
        let set = self
            .engine
            .resolve_for_update(blocks, blocks_layout, || async {
                let current = self.client.get(&path).await?;
                Ok::<_, PloneMcpError>(BlockSet::from_document(&current).blocks)
            })
            .await?;
        if let Some(set) = &set {
            insert_blocks(&mut body, set);
        }
        if body.is_empty() {
            return Err(PloneMcpError::validation(
                "update_content needs at least one field, blocks, or prepared blocks to change",
            ));
        }

        let updated = self.client.patch(&path, &Value::Object(body)).await?;
        info!(%path, blocks_replaced = set.is_some(), "content updated");
        Ok(summarize(&updated, &path, set.as_ref()))
    }

    async fn delete_content(&self, args: PathArgs) -> Result<Value> {
        self.client.delete(&args.path).await?;
        info!(path = %args.path, "content deleted");
        Ok(json!({ "deleted": args.path }))
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    async fn prepare_blocks(&self, args: PrepareBlocksArgs) -> Result<Value> {
        let receipt = self.engine.stage(args.blocks).await?;
        let mut result = serde_json::to_value(&receipt)?;
        if let Value::Object(map) = &mut result {
            map.insert(
                "next".into(),
                Value::String(format!(
                    "Call create_content or update_content within {STAGING_TTL_SECS} seconds to use these blocks."
                )),
            );
        }
        Ok(result)
    }

    async fn add_block(&self, args: AddBlockArgs) -> Result<Value> {
        let (mut set, doc) = self.fetch_blocks(&args.path).await?;
        let block_id = self.engine.add_block(&mut set, args.spec).await?;
        self.store_blocks(&args.path, &set).await?;
        Ok(block_result(&doc, &args.path, &block_id, &set))
    }

    async fn update_block(&self, args: UpdateBlockArgs) -> Result<Value> {
        let (mut set, doc) = self.fetch_blocks(&args.path).await?;
        self.engine
            .update_block(&mut set, &args.block_id, args.data)
            .await?;
        self.store_blocks(&args.path, &set).await?;
        Ok(block_result(&doc, &args.path, &args.block_id, &set))
    }

    async fn remove_block(&self, args: RemoveBlockArgs) -> Result<Value> {
        let (mut set, doc) = self.fetch_blocks(&args.path).await?;
        self.engine.remove_block(&mut set, &args.block_id)?;
        self.store_blocks(&args.path, &set).await?;
        Ok(block_result(&doc, &args.path, &args.block_id, &set))
    }

    fn get_block_schema(&self, args: BlockSchemaArgs) -> Result<Value> {
        self.engine.get_schema(args.block_type.as_deref())
    }

    async fn fetch_blocks(&self, path: &str) -> Result<(BlockSet, Value)> {
        let doc = self.client.get(path).await?;
        Ok((BlockSet::from_document(&doc), doc))
    }

    async fn store_blocks(&self, path: &str, set: &BlockSet) -> Result<()> {
        self.client.patch(path, &set.to_patch()).await?;
        Ok(())
    }
}

fn insert_blocks(body: &mut Map<String, Value>, set: &BlockSet) {
    body.insert("blocks".into(), Value::Object(set.blocks.clone()));
    body.insert("blocks_layout".into(), json!({ "items": set.layout }));
}

/// Short description of a written item: identity fields plus the final layout.
fn summarize(doc: &Value, path: &str, set: Option<&BlockSet>) -> Value {
    let mut summary = Map::new();
    for key in SUMMARY_KEYS {
        if let Some(value) = doc.get(*key) {
            summary.insert((*key).to_string(), value.clone());
        }
    }
    if summary.is_empty() {
        summary.insert("path".into(), Value::String(path.to_string()));
    }
    if let Some(set) = set {
        summary.insert("blocks_layout".into(), json!(set.layout));
    }
    Value::Object(summary)
}

fn block_result(doc: &Value, path: &str, block_id: &str, set: &BlockSet) -> Value {
    let mut result = summarize(doc, path, Some(set));
    if let Value::Object(map) = &mut result {
        map.insert("block_id".into(), Value::String(block_id.to_string()));
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use plone_mcp_blocks::{LenientImageChecker, SchemaRegistry};
    use plone_mcp_shared::Credentials;

    use super::*;

    async fn service(server: &MockServer) -> ContentService {
        let base = Url::parse(&format!("{}/Plone", server.uri())).unwrap();
        let client = PloneClient::new(base, Credentials::Anonymous, Duration::from_secs(5)).unwrap();
        let engine = AssemblyEngine::new(
            Arc::new(SchemaRegistry::builtin().unwrap()),
            Arc::new(LenientImageChecker),
        );
        ContentService::new(client, Arc::new(engine))
    }

    fn page() -> Value {
        json!({
            "@id": "http://site/Plone/page",
            "@type": "Document",
            "id": "page",
            "title": "Page",
            "blocks": {
                "t": { "@type": "title" },
                "a": { "@type": "slate", "plaintext": "A", "value": [], "theme": "default" }
            },
            "blocks_layout": { "items": ["t", "a"] }
        })
    }

    fn sent_body(request: &Request) -> Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[tokio::test]
    async fn prepared_blocks_are_used_by_create() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Plone/news"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "@id": "x", "id": "hello" })))
            .expect(1)
            .mount(&server)
            .await;
        let svc = service(&server).await;

        let receipt = svc
            .call_tool(
                "prepare_blocks",
                json!({ "blocks": [
                    { "type": "slate", "data": { "text": "# Intro" } },
                    { "type": "__button", "data": { "href": "/about", "title": "More" } }
                ] }),
            )
            .await
            .unwrap();
        assert_eq!(receipt["types"], json!(["slate", "__button"]));
        assert!(receipt["next"].as_str().unwrap().contains("60 seconds"));

        let created = svc
            .call_tool("create_content", json!({ "parent_path": "/news", "title": "Hello" }))
            .await
            .unwrap();
        assert_eq!(created["id"], "hello");
        assert_eq!(created["blocks_layout"].as_array().unwrap().len(), 3);

        let requests = server.received_requests().await.unwrap();
        let body = sent_body(&requests[0]);
        assert_eq!(body["@type"], "Document");
        assert_eq!(body["title"], "Hello");
        let items = body["blocks_layout"]["items"].as_array().unwrap();
        let first = items[0].as_str().unwrap();
        assert_eq!(body["blocks"][first], json!({ "@type": "title" }));
        let button = items[2].as_str().unwrap();
        assert_eq!(body["blocks"][button]["href"], json!([{ "id": "/about" }]));
        assert!(!svc.engine().has_staged().await);
    }

    #[tokio::test]
    async fn create_without_blocks_sends_bare_title() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "p" })))
            .mount(&server)
            .await;
        let svc = service(&server).await;

        svc.call_tool("create_content", json!({ "title": "Bare", "type": "News Item" }))
            .await
            .unwrap();
        let body = sent_body(&server.received_requests().await.unwrap()[0]);
        assert_eq!(body["@type"], "News Item");
        assert_eq!(body["blocks_layout"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["blocks"].as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_create_clears_staged_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let svc = service(&server).await;

        svc.call_tool("prepare_blocks", json!({ "blocks": [{ "type": "separator" }] }))
            .await
            .unwrap();
        // Bad arguments fail before the engine is consulted, yet still clear the stage.
        assert!(svc.call_tool("create_content", json!({})).await.is_err());
        assert!(!svc.engine().has_staged().await);

        svc.call_tool("prepare_blocks", json!({ "blocks": [{ "type": "separator" }] }))
            .await
            .unwrap();
        let err = svc
            .call_tool("create_content", json!({ "title": "T" }))
            .await
            .unwrap_err();
        assert!(matches!(err, PloneMcpError::Http { status: 500, .. }));
        assert!(!svc.engine().has_staged().await);
    }

    #[tokio::test]
    async fn update_without_blocks_leaves_them_alone() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/Plone/page"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let svc = service(&server).await;

        let result = svc
            .call_tool("update_content", json!({ "path": "/page", "title": "New" }))
            .await
            .unwrap();
        assert_eq!(result, json!({ "path": "/page" }));

        let body = sent_body(&server.received_requests().await.unwrap()[0]);
        assert_eq!(body, json!({ "title": "New" }));
    }

    #[tokio::test]
    async fn update_with_nothing_is_rejected() {
        let server = MockServer::start().await;
        let svc = service(&server).await;
        let err = svc
            .call_tool("update_content", json!({ "path": "/page" }))
            .await
            .unwrap_err();
        assert!(matches!(err, PloneMcpError::Validation { .. }));
    }

    #[tokio::test]
    async fn layout_only_update_reuses_stored_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Plone/page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page()))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/Plone/page"))
            .and(body_partial_json(json!({ "blocks_layout": { "items": ["t", "a"] } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(page()))
            .expect(1)
            .mount(&server)
            .await;
        let svc = service(&server).await;

        let result = svc
            .call_tool("update_content", json!({ "path": "/page", "blocks_layout": ["a", "t"] }))
            .await
            .unwrap();
        assert_eq!(result["blocks_layout"], json!(["t", "a"]));
    }

    #[tokio::test]
    async fn add_block_patches_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Plone/page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page()))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/Plone/page"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let svc = service(&server).await;

        let result = svc
            .call_tool(
                "add_block",
                json!({ "path": "/page", "type": "slate", "data": { "text": "new" }, "position": 1 }),
            )
            .await
            .unwrap();
        let block_id = result["block_id"].as_str().unwrap();
        assert_eq!(result["blocks_layout"], json!(["t", block_id, "a"]));

        let requests = server.received_requests().await.unwrap();
        let patch = sent_body(&requests[1]);
        assert_eq!(patch["blocks"][block_id]["plaintext"], "new");
        assert_eq!(patch["blocks_layout"]["items"], json!(["t", block_id, "a"]));
    }

    #[tokio::test]
    async fn remove_unknown_block_does_not_patch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Plone/page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page()))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        let svc = service(&server).await;

        let err = svc
            .call_tool("remove_block", json!({ "path": "/page", "block_id": "zz" }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "block 'zz' not found; valid values: t, a");
    }

    #[tokio::test]
    async fn unknown_tool_lists_tools() {
        let server = MockServer::start().await;
        let svc = service(&server).await;
        let err = svc.call_tool("publish", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("get_block_schema"));
    }
}
