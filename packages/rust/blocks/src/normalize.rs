//! Per-type block normalization.
//!
//! Dispatches on [`BlockKind`]: rich text is parsed from Markdown, image URLs are
//! validated and probed, reference `href`s are coerced into a reference list, and
//! everything else passes through with its `@type` discriminator.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use plone_mcp_markdown::HeadingLevel;
use plone_mcp_shared::{PloneMcpError, Result, TITLE_BLOCK_TYPE, TYPE_KEY};

use crate::image::ImageChecker;
use crate::registry::{BlockKind, BlockType};

/// Theme stored on rich-text blocks that do not ask for one.
const DEFAULT_THEME: &str = "default";

/// Key used inside normalized reference entries.
pub const REFERENCE_ID_KEY: &str = "id";

/// Canonical data of the title block: the discriminator and nothing else.
pub fn title_block() -> Value {
    json!({ TYPE_KEY: TITLE_BLOCK_TYPE })
}

/// Turns caller-supplied `(type, data)` pairs into stored block records.
#[derive(Clone)]
pub struct Normalizer {
    images: Arc<dyn ImageChecker>,
}

impl Normalizer {
    pub fn new(images: Arc<dyn ImageChecker>) -> Self {
        Self { images }
    }

    /// Produce the finalized record for a new block. The result always carries `@type`.
    pub async fn normalize(
        &self,
        block_type: &BlockType,
        mut raw: Map<String, Value>,
    ) -> Result<Value> {
        let name = block_type.name();
        let fields = match block_type.kind() {
            BlockKind::Title => return Ok(title_block()),
            BlockKind::RichText => {
                let mut fields = rich_text_fields(name, &mut raw)?;
                let theme = theme_value(name, raw.remove("theme"))?;
                fields.insert("theme".into(), theme);
                fields
            }
            BlockKind::Image => {
                self.check_image_url(name, &raw).await?;
                raw
            }
            BlockKind::Reference => {
                normalize_href_field(name, &mut raw)?;
                raw
            }
            BlockKind::Opaque => raw,
        };
        Ok(with_type(name, fields))
    }

    /// Normalize the fields of a partial update so they can be merged into an existing block.
    ///
    /// Only fields the block's kind cares about are transformed; the rest pass through.
    pub async fn normalize_patch(
        &self,
        block_type: &BlockType,
        mut patch: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let name = block_type.name();
        match patch.remove(TYPE_KEY) {
            Some(Value::String(t)) if t == name => {}
            None => {}
            Some(other) => {
                return Err(PloneMcpError::validation(format!(
                    "cannot change the type of a {name} block to {other}; remove it and add a new block instead"
                )));
            }
        }

        match block_type.kind() {
            BlockKind::Title => Ok(Map::new()),
            BlockKind::RichText => {
                if patch.contains_key("text") {
                    let rich = rich_text_fields(name, &mut patch)?;
                    patch.extend(rich);
                } else if patch.contains_key("heading") {
                    return Err(PloneMcpError::validation(format!(
                        "field 'heading' of {name} block can only be changed together with 'text'"
                    )));
                }
                if let Some(theme) = patch.remove("theme") {
                    let theme = theme_value(name, Some(theme))?;
                    patch.insert("theme".into(), theme);
                }
                Ok(patch)
            }
            BlockKind::Image => {
                if patch.contains_key("url") {
                    self.check_image_url(name, &patch).await?;
                }
                Ok(patch)
            }
            BlockKind::Reference => {
                normalize_href_field(name, &mut patch)?;
                Ok(patch)
            }
            BlockKind::Opaque => Ok(patch),
        }
    }

    async fn check_image_url(&self, name: &str, raw: &Map<String, Value>) -> Result<()> {
        let url = match raw.get("url") {
            Some(Value::String(url)) if !url.trim().is_empty() => url,
            Some(Value::String(_)) => {
                return Err(PloneMcpError::validation(format!(
                    "{name} block requires a non-empty 'url'"
                )));
            }
            Some(other) => {
                return Err(PloneMcpError::validation(format!(
                    "field 'url' of {name} block must be a string, got {}",
                    json_kind(other)
                )));
            }
            None => {
                return Err(PloneMcpError::validation(format!(
                    "{name} block requires a 'url' field"
                )));
            }
        };

        if self.images.is_image(url).await {
            debug!(block_type = name, "image url accepted");
            Ok(())
        } else {
            Err(PloneMcpError::validation(format!(
                "field 'url' of {name} block does not point to a reachable image: {url}"
            )))
        }
    }
}

/// Take `text` (and optional `heading`) out of `raw` and build `plaintext` + `value`.
fn rich_text_fields(name: &str, raw: &mut Map<String, Value>) -> Result<Map<String, Value>> {
    let text = match raw.remove("text") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => {
            return Err(PloneMcpError::validation(format!(
                "field 'text' of {name} block must be a string, got {}",
                json_kind(&other)
            )));
        }
    };

    let value = match raw.remove("heading") {
        None | Some(Value::Null) => plone_mcp_markdown::parse(&text),
        Some(level) => {
            plone_mcp_markdown::heading_value(HeadingLevel::new(level.as_i64()), &text)
        }
    };

    let mut fields = Map::new();
    fields.insert("plaintext".into(), Value::String(text));
    fields.insert("value".into(), serde_json::to_value(value)?);
    Ok(fields)
}

/// A string theme as given; absent or null falls back to the default.
fn theme_value(name: &str, theme: Option<Value>) -> Result<Value> {
    match theme {
        None | Some(Value::Null) => Ok(Value::String(DEFAULT_THEME.to_string())),
        Some(Value::String(theme)) => Ok(Value::String(theme)),
        Some(other) => Err(PloneMcpError::validation(format!(
            "field 'theme' of {name} block must be a string, got {}",
            json_kind(&other)
        ))),
    }
}

/// Coerce `href` into `[{"id": url}]`. Arrays are trusted as already normalized.
fn normalize_href_field(name: &str, raw: &mut Map<String, Value>) -> Result<()> {
    let Some(href) = raw.get_mut("href") else {
        return Ok(());
    };
    let wrapped = match href {
        Value::Null | Value::Array(_) => return Ok(()),
        Value::String(url) => json!([{ REFERENCE_ID_KEY: std::mem::take(url) }]),
        other => {
            return Err(PloneMcpError::validation(format!(
                "field 'href' of {name} block must be a URL string or a list like [{{\"{REFERENCE_ID_KEY}\": \"/path\"}}], got {}",
                json_kind(other)
            )));
        }
    };
    *href = wrapped;
    Ok(())
}

/// Prepend the discriminator to `fields`, replacing any caller-supplied one.
fn with_type(name: &str, fields: Map<String, Value>) -> Value {
    let mut record = Map::with_capacity(fields.len() + 1);
    record.insert(TYPE_KEY.into(), Value::String(name.to_string()));
    for (key, value) in fields {
        if key != TYPE_KEY {
            record.insert(key, value);
        }
    }
    Value::Object(record)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::registry::SchemaRegistry;

    /// Counts calls and answers with a fixed verdict.
    #[derive(Default)]
    struct CountingChecker {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl ImageChecker for CountingChecker {
        async fn is_image(&self, _url: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            !self.reject
        }
    }

    fn setup(reject: bool) -> (Normalizer, Arc<CountingChecker>, SchemaRegistry) {
        let checker = Arc::new(CountingChecker {
            reject,
            ..Default::default()
        });
        let normalizer = Normalizer::new(checker.clone());
        (normalizer, checker, SchemaRegistry::builtin().unwrap())
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    // --- Rich text ---

    #[tokio::test]
    async fn rich_text_parses_markdown() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(&reg.resolve("slate").unwrap(), obj(json!({ "text": "Hello World" })))
            .await
            .unwrap();
        assert_eq!(
            block,
            json!({
                "@type": "slate",
                "plaintext": "Hello World",
                "value": [{ "type": "p", "children": [{ "text": "Hello World" }] }],
                "theme": "default"
            })
        );
    }

    #[tokio::test]
    async fn rich_text_heading_wrap() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(
                &reg.resolve("slate").unwrap(),
                obj(json!({ "text": "Hello World", "heading": 1 })),
            )
            .await
            .unwrap();
        assert_eq!(
            block["value"],
            json!([{ "type": "h1", "children": [{ "text": "Hello World" }] }])
        );
        assert!(block.get("heading").is_none());
    }

    #[tokio::test]
    async fn rich_text_defaults_and_theme() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(&reg.resolve("text").unwrap(), obj(json!({ "theme": "grey" })))
            .await
            .unwrap();
        assert_eq!(block["@type"], "text");
        assert_eq!(block["plaintext"], "");
        assert_eq!(block["value"], json!([]));
        assert_eq!(block["theme"], "grey");
    }

    #[tokio::test]
    async fn rich_text_rejects_non_string_text() {
        let (n, _, reg) = setup(false);
        let err = n
            .normalize(&reg.resolve("slate").unwrap(), obj(json!({ "text": 42 })))
            .await
            .unwrap_err();
        assert!(matches!(err, PloneMcpError::Validation { .. }));
        assert!(err.to_string().contains("'text'"));
    }

    // --- Image ---

    #[tokio::test]
    async fn image_missing_or_empty_url_skips_checker() {
        let (n, checker, reg) = setup(false);
        let image = reg.resolve("image").unwrap();

        for raw in [json!({}), json!({ "url": "" }), json!({ "url": 7 })] {
            let err = n.normalize(&image, obj(raw)).await.unwrap_err();
            assert!(matches!(err, PloneMcpError::Validation { .. }));
            assert!(err.to_string().contains("'url'"));
        }
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn image_passes_fields_through() {
        let (n, checker, reg) = setup(false);
        let block = n
            .normalize(
                &reg.resolve("image").unwrap(),
                obj(json!({ "url": "https://example.com/a.png", "alt": "A", "size": "l" })),
            )
            .await
            .unwrap();
        assert_eq!(
            block,
            json!({ "@type": "image", "url": "https://example.com/a.png", "alt": "A", "size": "l" })
        );
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_image_is_validation_error() {
        let (n, _, reg) = setup(true);
        let err = n
            .normalize(
                &reg.resolve("image").unwrap(),
                obj(json!({ "url": "https://example.com/nope" })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PloneMcpError::Validation { .. }));
        assert!(err.to_string().contains("reachable image"));
    }

    // --- Reference ---

    #[tokio::test]
    async fn href_string_is_wrapped() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(&reg.resolve("__button").unwrap(), obj(json!({ "href": "/about" })))
            .await
            .unwrap();
        assert_eq!(block["href"], json!([{ "id": "/about" }]));
    }

    #[tokio::test]
    async fn href_array_passes_unchanged() {
        let (n, _, reg) = setup(false);
        let href = json!(["/already", { "id": "/correct" }]);
        let block = n
            .normalize(&reg.resolve("teaser").unwrap(), obj(json!({ "href": href.clone() })))
            .await
            .unwrap();
        assert_eq!(block["href"], href);
    }

    #[tokio::test]
    async fn href_number_is_rejected() {
        let (n, _, reg) = setup(false);
        let err = n
            .normalize(&reg.resolve("__button").unwrap(), obj(json!({ "href": 42 })))
            .await
            .unwrap_err();
        assert!(matches!(err, PloneMcpError::Validation { .. }));
        assert!(err.to_string().contains("'href'"));
    }

    #[tokio::test]
    async fn reference_without_href_is_fine() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(&reg.resolve("teaser").unwrap(), obj(json!({ "title": "T" })))
            .await
            .unwrap();
        assert_eq!(block, json!({ "@type": "teaser", "title": "T" }));
    }

    // --- Others ---

    #[tokio::test]
    async fn opaque_gets_discriminator_only() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(
                &reg.resolve("separator").unwrap(),
                obj(json!({ "@type": "bogus", "styles": { "align": "full" } })),
            )
            .await
            .unwrap();
        assert_eq!(block, json!({ "@type": "separator", "styles": { "align": "full" } }));
    }

    #[tokio::test]
    async fn title_data_is_canonical() {
        let (n, _, reg) = setup(false);
        let block = n
            .normalize(&reg.resolve("title").unwrap(), obj(json!({ "text": "dup" })))
            .await
            .unwrap();
        assert_eq!(block, title_block());
    }

    // --- Patches ---

    #[tokio::test]
    async fn patch_reparses_text() {
        let (n, _, reg) = setup(false);
        let patch = n
            .normalize_patch(&reg.resolve("slate").unwrap(), obj(json!({ "text": "*new*" })))
            .await
            .unwrap();
        assert_eq!(patch["plaintext"], "*new*");
        assert_eq!(patch["value"][0]["children"][0]["type"], "em");
        assert!(!patch.contains_key("text"));
        assert!(!patch.contains_key("theme"));
    }

    #[tokio::test]
    async fn patch_heading_without_text_is_rejected() {
        let (n, _, reg) = setup(false);
        let err = n
            .normalize_patch(&reg.resolve("slate").unwrap(), obj(json!({ "heading": 2 })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'heading'"));
    }

    #[tokio::test]
    async fn patch_theme_is_checked() {
        let (n, _, reg) = setup(false);
        let slate = reg.resolve("slate").unwrap();
        let err = n
            .normalize_patch(&slate, obj(json!({ "theme": 42 })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'theme'"));

        let reset = n
            .normalize_patch(&slate, obj(json!({ "theme": null })))
            .await
            .unwrap();
        assert_eq!(Value::Object(reset), json!({ "theme": "default" }));
    }

    #[tokio::test]
    async fn patch_cannot_change_type() {
        let (n, _, reg) = setup(false);
        let err = n
            .normalize_patch(&reg.resolve("slate").unwrap(), obj(json!({ "@type": "image" })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot change the type"));

        let same = n
            .normalize_patch(
                &reg.resolve("slate").unwrap(),
                obj(json!({ "@type": "slate", "theme": "grey" })),
            )
            .await
            .unwrap();
        assert_eq!(Value::Object(same), json!({ "theme": "grey" }));
    }

    #[tokio::test]
    async fn patch_image_url_is_checked() {
        let (n, checker, reg) = setup(false);
        let image = reg.resolve("image").unwrap();
        n.normalize_patch(&image, obj(json!({ "alt": "only alt" })))
            .await
            .unwrap();
        assert_eq!(checker.calls.load(Ordering::SeqCst), 0);

        n.normalize_patch(&image, obj(json!({ "url": "https://example.com/b.png" })))
            .await
            .unwrap();
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);

        assert!(n.normalize_patch(&image, obj(json!({ "url": "" }))).await.is_err());
    }
}
