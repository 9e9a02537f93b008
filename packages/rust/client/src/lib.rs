//! Thin async client for the Plone REST API.
//!
//! Every request asks for JSON, authenticates with the configured credentials,
//! and maps transport failures to [`PloneMcpError::Network`] and non-success
//! statuses to [`PloneMcpError::Http`]. No retries.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use plone_mcp_shared::{AppConfig, Credentials, PloneMcpError, Result, resolve_credentials};

/// User-Agent string for REST requests.
const USER_AGENT: &str = concat!("plone-mcp/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in an [`PloneMcpError::Http`] message.
const MAX_ERROR_BODY: usize = 500;

/// Asks Plone to answer PATCH with the updated item instead of 204.
const PREFER_REPRESENTATION: &str = "return=representation";

/// Client bound to one Plone site.
#[derive(Clone)]
pub struct PloneClient {
    client: Client,
    base: Url,
    credentials: Credentials,
}

impl std::fmt::Debug for PloneClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PloneClient")
            .field("base", &self.base.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl PloneClient {
    pub fn new(base: Url, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| PloneMcpError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    /// Build from the loaded configuration, reading secrets from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.site_url()?,
            resolve_credentials(&config.plone),
            Duration::from_secs(config.plone.timeout_secs),
        )
    }

    /// Resolve a content path (or an absolute URL inside the site) to a request URL.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let site = self.base.as_str().trim_end_matches('/');
        let relative = match path.strip_prefix(site) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ if path.starts_with("http://") || path.starts_with("https://") => {
                return Err(PloneMcpError::validation(format!(
                    "'{path}' is not inside the site {site}"
                )));
            }
            _ => path,
        };

        let relative = relative.trim_matches('/');
        let mut url = self.base.clone();
        if !relative.is_empty() {
            let joined = format!("{}/{relative}", self.base.path().trim_end_matches('/'));
            url.set_path(&joined);
        }
        url.set_query(None);
        Ok(url)
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// GET a content item (or any endpoint) as JSON.
    #[instrument(skip(self))]
    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url_for(path)?;
        self.send(self.request(Method::GET, url.clone()), &url).await
    }

    /// Query the `@search` endpoint below `path`.
    #[instrument(skip(self, query))]
    pub async fn search(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let base = self.url_for(path)?;
        let url = self.url_for(&format!("{}/@search", base.as_str()))?;
        let request = self.request(Method::GET, url.clone()).query(query);
        self.send(request, &url).await
    }

    /// POST `body` to `path` (create a child item).
    #[instrument(skip(self, body))]
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url_for(path)?;
        let request = self.request(Method::POST, url.clone()).json(body);
        self.send(request, &url).await
    }

    /// PATCH `body` onto the item at `path`, returning its updated representation.
    #[instrument(skip(self, body))]
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url_for(path)?;
        let request = self
            .request(Method::PATCH, url.clone())
            .header("Prefer", HeaderValue::from_static(PREFER_REPRESENTATION))
            .json(body);
        self.send(request, &url).await
    }

    /// DELETE the item at `path`.
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url_for(path)?;
        self.send(self.request(Method::DELETE, url.clone()), &url)
            .await
            .map(|_| ())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        match &self.credentials {
            Credentials::Anonymous => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Token(token) => request.bearer_auth(token),
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| PloneMcpError::Network(format!("{url}: {e}")))?;
        read_json(response, url).await
    }
}

/// Decode a response body, turning non-success statuses into errors.
/// Empty bodies (e.g. `204 No Content`) decode to `null`.
async fn read_json(response: Response, url: &Url) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| PloneMcpError::Network(format!("{url}: failed to read body: {e}")))?;
    debug!(%status, bytes = body.len(), "response received");

    if !status.is_success() {
        return Err(PloneMcpError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body: truncate(&body, MAX_ERROR_BODY).to_string(),
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, credentials: Credentials) -> PloneClient {
        let base = Url::parse(&format!("{}/Plone", server.uri())).unwrap();
        PloneClient::new(base, credentials, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn url_for_joins_below_site() {
        let client = PloneClient::new(
            Url::parse("http://localhost:8080/Plone").unwrap(),
            Credentials::Anonymous,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.url_for("/news/item").unwrap().as_str(),
            "http://localhost:8080/Plone/news/item"
        );
        assert_eq!(client.url_for("").unwrap().as_str(), "http://localhost:8080/Plone");
        assert_eq!(
            client
                .url_for("http://localhost:8080/Plone/about/")
                .unwrap()
                .as_str(),
            "http://localhost:8080/Plone/about"
        );
        assert!(client.url_for("https://elsewhere.org/x").is_err());
    }

    #[tokio::test]
    async fn get_sends_json_accept_and_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Plone/front-page"))
            .and(header("accept", "application/json"))
            .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "title": "Welcome" })))
            .mount(&server)
            .await;

        let client = client_for(
            &server,
            Credentials::Basic {
                username: "admin".into(),
                password: "secret".into(),
            },
        );
        let doc = client.get("front-page").await.unwrap();
        assert_eq!(doc["title"], "Welcome");
    }

    #[tokio::test]
    async fn search_passes_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Plone/news/@search"))
            .and(query_param("SearchableText", "plone"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items_total": 1 })))
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::Token("tok".into()));
        let result = client
            .search("/news", &[("SearchableText".into(), "plone".into())])
            .await
            .unwrap();
        assert_eq!(result["items_total"], 1);
    }

    #[tokio::test]
    async fn post_and_patch_send_body() {
        let server = MockServer::start().await;
        let body = json!({ "@type": "Document", "title": "New" });
        Mock::given(method("POST"))
            .and(path("/Plone/folder"))
            .and(body_json(body.clone()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "@id": "x" })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/Plone/folder/new"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::Anonymous);
        assert_eq!(client.post("folder", &body).await.unwrap()["@id"], "x");
        assert_eq!(
            client.patch("folder/new", &json!({ "title": "T" })).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn error_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/Plone/locked"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "type": "Unauthorized", "message": "nope" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Credentials::Anonymous);
        let err = client.delete("locked").await.unwrap_err();
        match err {
            PloneMcpError::Http { status, url, body } => {
                assert_eq!(status, 401);
                assert!(url.ends_with("/Plone/locked"));
                assert!(body.contains("Unauthorized"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let client = PloneClient::new(
            Url::parse("http://127.0.0.1:9/Plone").unwrap(),
            Credentials::Anonymous,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.get("x").await.unwrap_err();
        assert!(matches!(err, PloneMcpError::Network(_)));
    }
}
