//! Image URL reachability checks used before accepting image blocks.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use tracing::{debug, instrument};
use url::Url;

use plone_mcp_shared::{PloneMcpError, Result};

/// User-Agent string for image probes.
const USER_AGENT: &str = concat!("plone-mcp/", env!("CARGO_PKG_VERSION"));

/// Matches `data:image/<subtype>[;params],` at the start of a data URL.
static DATA_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/[A-Za-z0-9.+-]+(;[^,]*)?,").expect("data url regex")
});

/// Answers whether a URL points at a fetchable image resource.
#[async_trait]
pub trait ImageChecker: Send + Sync {
    async fn is_image(&self, url: &str) -> bool;
}

/// `data:` URLs are judged by their prefix alone, never fetched.
pub fn is_image_data_url(url: &str) -> bool {
    DATA_IMAGE_RE.is_match(url)
}

// ---------------------------------------------------------------------------
// HTTP checker
// ---------------------------------------------------------------------------

/// Probes the URL with HEAD (falling back to GET) and requires an `image/*` content type.
pub struct HttpImageChecker {
    client: Client,
    base: Option<Url>,
}

impl HttpImageChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| PloneMcpError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base: None })
    }

    /// Resolve relative URLs (site paths) against `base`.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    fn absolute(&self, url: &str) -> Option<Url> {
        match Url::parse(url) {
            Ok(parsed) => Some(parsed),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base.as_ref()?;
                let mut base = base.clone();
                // Keep the site path when joining a site-relative path.
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                base.join(url.trim_start_matches('/')).ok()
            }
            Err(_) => None,
        }
    }

    async fn probe(&self, url: Url) -> Option<(StatusCode, Option<String>)> {
        let response = match self.client.head(url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            // Some servers refuse HEAD; ask again with GET.
            Ok(_) | Err(_) => self.client.get(url).send().await.ok()?,
        };
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        Some((response.status(), content_type))
    }
}

#[async_trait]
impl ImageChecker for HttpImageChecker {
    #[instrument(skip_all, fields(url = %truncate(url)))]
    async fn is_image(&self, url: &str) -> bool {
        if url.starts_with("data:") {
            return is_image_data_url(url);
        }
        let Some(target) = self.absolute(url) else {
            debug!("image url could not be resolved");
            return false;
        };
        if !matches!(target.scheme(), "http" | "https") {
            return false;
        }
        match self.probe(target).await {
            Some((status, content_type)) => {
                let ok = status.is_success()
                    && content_type.is_some_and(|ct| ct.starts_with("image/"));
                debug!(%status, ok, "image probe finished");
                ok
            }
            None => {
                debug!("image probe failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient checker
// ---------------------------------------------------------------------------

/// Used when network checks are disabled: data URLs still need an image prefix,
/// anything else is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LenientImageChecker;

#[async_trait]
impl ImageChecker for LenientImageChecker {
    async fn is_image(&self, url: &str) -> bool {
        !url.starts_with("data:") || is_image_data_url(url)
    }
}

fn truncate(url: &str) -> &str {
    match url.char_indices().nth(80) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}
