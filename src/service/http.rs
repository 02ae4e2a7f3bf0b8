//! Page fetching port and its HTTP implementations.
//!
//! - `HttpFetcher`: direct request with browser-like headers
//! - `ProxyFetcher`: goes through a remote fetch proxy (`<proxy>?url=<target>`)
//! - `FallbackFetcher`: direct first, proxy only when the direct attempt was
//!   blocked or never reached the site
//!
//! Source plugins only ever see the `PageFetcher` trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[derive(Debug, Clone, Copy)]
pub enum ClientType {
    Standard,
    BrowserLike,
}

/// Factory for creating an HTTP client based on how hard the target resists automation.
pub fn create_client(client_type: ClientType) -> Result<Client> {
    let builder = Client::builder().timeout(FETCH_TIMEOUT);

    match client_type {
        ClientType::BrowserLike => {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                    .parse()
                    .context("Invalid accept header")?,
            );
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                "fr-FR,fr;q=0.9,en;q=0.6"
                    .parse()
                    .context("Invalid accept-language header")?,
            );
            builder
                .user_agent(BROWSER_USER_AGENT)
                .default_headers(headers)
                .build()
                .context("Failed to build browser-like HTTP client")
        }
        ClientType::Standard => builder
            .build()
            .context("Failed to build standard HTTP client"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection refused, timeout, DNS failure, unreadable body
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Network { .. } => None,
        }
    }

    /// Anti-automation responses.
    pub fn is_blocked(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 429))
    }

    /// The posting no longer exists.
    pub fn is_gone(&self) -> bool {
        matches!(self.status(), Some(404 | 410))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError>;

    /// Human-readable name for this fetcher.
    fn name(&self) -> &'static str;
}

async fn get_page(
    client: &Client,
    request_url: &str,
    reported_url: &str,
) -> std::result::Result<FetchedPage, FetchError> {
    let response = client
        .get(request_url)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            url: reported_url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: reported_url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(|e| FetchError::Network {
        url: reported_url.to_string(),
        message: format!("failed to read body: {}", e),
    })?;

    tracing::trace!("[FETCH] Received {} bytes from {}", body.len(), reported_url);

    Ok(FetchedPage {
        url: reported_url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Direct fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: create_client(ClientType::BrowserLike)?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        tracing::debug!("[FETCH] GET {}", url);
        get_page(&self.client, url, url).await
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Remote fetch proxy: the proxy retrieves the target on our behalf and
/// relays the upstream status and body.
pub struct ProxyFetcher {
    client: Client,
    proxy_url: Url,
}

impl ProxyFetcher {
    pub fn new(proxy_url: &str) -> Result<Self> {
        Ok(Self {
            client: create_client(ClientType::Standard)?,
            proxy_url: Url::parse(proxy_url)
                .with_context(|| format!("Invalid fetch proxy URL: {}", proxy_url))?,
        })
    }

    fn request_url(&self, target: &str) -> String {
        let mut url = self.proxy_url.clone();
        url.query_pairs_mut().append_pair("url", target);
        url.to_string()
    }
}

#[async_trait]
impl PageFetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        let request_url = self.request_url(url);
        tracing::debug!("[FETCH] GET {} via proxy", url);
        get_page(&self.client, &request_url, url).await
    }

    fn name(&self) -> &'static str {
        "proxy"
    }
}

/// Direct fetch with an optional fallback for blocked or unreachable pages.
pub struct FallbackFetcher {
    primary: Arc<dyn PageFetcher>,
    fallback: Option<Arc<dyn PageFetcher>>,
}

impl FallbackFetcher {
    pub fn new(primary: Arc<dyn PageFetcher>, fallback: Option<Arc<dyn PageFetcher>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PageFetcher for FallbackFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        match self.primary.fetch(url).await {
            Ok(page) => Ok(page),
            Err(err) if err.is_gone() => Err(err),
            Err(err) if err.is_blocked() || err.status().is_none() => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        "[FETCH] {} failed ({}), falling back to {} fetcher",
                        self.primary.name(),
                        err,
                        fallback.name()
                    );
                    fallback.fetch(url).await
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::stubs::StubFetcher;

    #[tokio::test]
    async fn test_http_fetcher_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/job/1")
            .with_status(200)
            .with_body("<html><body>Offer</body></html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let page = fetcher
            .fetch(&format!("{}/job/1", server.url()))
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert!(page.body.contains("Offer"));
    }

    #[tokio::test]
    async fn test_http_fetcher_sends_browser_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/job/2")
            .match_header("user-agent", BROWSER_USER_AGENT)
            .match_header("accept-language", mockito::Matcher::Regex("^fr-FR".into()))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        fetcher
            .fetch(&format!("{}/job/2", server.url()))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_fetcher_maps_status_errors() {
        let mut server = mockito::Server::new_async().await;
        let _forbidden = server
            .mock("GET", "/blocked")
            .with_status(403)
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/gone")
            .with_status(410)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new().unwrap();

        let blocked = fetcher
            .fetch(&format!("{}/blocked", server.url()))
            .await
            .unwrap_err();
        assert!(blocked.is_blocked());
        assert!(!blocked.is_gone());

        let gone = fetcher
            .fetch(&format!("{}/gone", server.url()))
            .await
            .unwrap_err();
        assert!(gone.is_gone());
    }

    #[tokio::test]
    async fn test_network_error_has_no_status() {
        let fetcher = HttpFetcher::new().unwrap();
        // Port 9 (discard) on localhost is not listening in test environments.
        let err = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert_eq!(err.status(), None);
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[tokio::test]
    async fn test_proxy_fetcher_passes_target_as_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fetch")
            .match_query(mockito::Matcher::UrlEncoded(
                "url".into(),
                "https://www.hellowork.com/fr-fr/emplois/1.html".into(),
            ))
            .with_status(200)
            .with_body("proxied")
            .create_async()
            .await;

        let fetcher = ProxyFetcher::new(&format!("{}/fetch", server.url())).unwrap();
        let page = fetcher
            .fetch("https://www.hellowork.com/fr-fr/emplois/1.html")
            .await
            .unwrap();

        assert_eq!(page.body, "proxied");
        assert_eq!(page.url, "https://www.hellowork.com/fr-fr/emplois/1.html");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fallback_used_when_blocked() {
        let url = "https://jobs.example/1";
        let primary = Arc::new(StubFetcher::new().with_status(url, 403));
        let fallback = Arc::new(StubFetcher::new().with_page(url, "<html>ok</html>"));
        let fetcher = FallbackFetcher::new(primary, Some(fallback.clone()));

        let page = fetcher.fetch(url).await.unwrap();
        assert_eq!(page.body, "<html>ok</html>");
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_page_gone() {
        let url = "https://jobs.example/2";
        let primary = Arc::new(StubFetcher::new().with_status(url, 404));
        let fallback = Arc::new(StubFetcher::new().with_page(url, "stale copy"));
        let fetcher = FallbackFetcher::new(primary, Some(fallback.clone()));

        let err = fetcher.fetch(url).await.unwrap_err();
        assert!(err.is_gone());
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_without_fallback_error_is_returned() {
        let url = "https://jobs.example/3";
        let primary = Arc::new(StubFetcher::new().with_status(url, 429));
        let fetcher = FallbackFetcher::new(primary, None);

        assert!(fetcher.fetch(url).await.unwrap_err().is_blocked());
    }
}
