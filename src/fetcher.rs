//! Time-bounded HTTP access.
//!
//! Every request the pipeline makes goes through the [`HttpFetch`] trait so
//! that the whole run can be exercised against an in-memory fetcher in tests.
//! [`Fetcher`] is the `reqwest`-backed implementation used in production.
//!
//! Failures are returned as [`FetchError`] and are always recoverable for the
//! caller: a failed source contributes nothing, a failed article keeps its
//! feed values. There is no retry.

use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument};

/// Why a fetch did not produce a body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("timed out after {timeout_ms}ms fetching {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid URL {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// The URL the failed request targeted.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Timeout { url, .. }
            | FetchError::Network { url, .. }
            | FetchError::InvalidUrl { url } => url,
        }
    }
}

/// A downloaded page and the URL it was finally served from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub final_url: String,
    pub body: String,
}

/// HTTP operations the pipeline depends on.
pub trait HttpFetch {
    /// Download `url` and return its body as text. Non-2xx responses fail.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>>;

    /// Download `url` in a single request, reporting the URL reached after redirects.
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<FetchedPage, FetchError>>;

    /// Follow redirects from `url` and return the terminal URL without reading the body.
    ///
    /// Only aggregator links need this; publisher pages go through [`HttpFetch::fetch_page`].
    fn resolve_final_url(&self, url: &str) -> impl Future<Output = Result<String, FetchError>>;
}

/// `reqwest`-backed [`HttpFetch`] with a custom user agent and a per-request deadline.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher whose every request is bounded by `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|source| FetchError::Network {
                url: String::new(),
                source,
            })?;
        Ok(Self { client, timeout })
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        if reqwest::Url::parse(url).is_err() {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }
        self.client
            .get(url)
            .header(reqwest::header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(|source| classify(url, self.timeout_ms(), source))
    }
}

fn classify(url: &str, timeout_ms: u64, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_ms,
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            source,
        }
    }
}

impl HttpFetch for Fetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_page(url).await.map(|page| page.body)
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let t0 = Instant::now();
        let work = async {
            let resp = self.send(url).await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            let final_url = resp.url().to_string();
            let body = resp
                .text()
                .await
                .map_err(|source| classify(url, self.timeout_ms(), source))?;
            Ok(FetchedPage { final_url, body })
        };

        let page = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout_ms(),
            })??;

        debug!(
            bytes = page.body.len(),
            final_url = %page.final_url,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(page)
    }

    #[instrument(level = "debug", skip(self))]
    async fn resolve_final_url(&self, url: &str) -> Result<String, FetchError> {
        let resp = tokio::time::timeout(self.timeout, self.send(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout_ms(),
            })??;
        let final_url = resp.url().to_string();
        if final_url != url {
            debug!(%final_url, "Resolved redirect");
        }
        Ok(final_url)
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory [`HttpFetch`] used by pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies and redirects; unknown URLs answer 404.
    ///
    /// Page downloads are logged in `requested`, redirect-only lookups in `resolved`.
    #[derive(Debug, Default)]
    pub struct StubFetcher {
        bodies: HashMap<String, String>,
        statuses: HashMap<String, u16>,
        redirects: HashMap<String, String>,
        pub requested: Mutex<Vec<String>>,
        pub resolved: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_body(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.to_string());
            self
        }

        pub fn with_status(mut self, url: &str, status: u16) -> Self {
            self.statuses.insert(url.to_string(), status);
            self
        }

        pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }

        pub fn resolutions(&self) -> Vec<String> {
            self.resolved.lock().unwrap().clone()
        }

        fn follow(&self, url: &str) -> String {
            self.redirects
                .get(url)
                .cloned()
                .unwrap_or_else(|| url.to_string())
        }

        fn serve(&self, requested: &str, served_from: &str) -> Result<String, FetchError> {
            if let Some(status) = self.statuses.get(served_from) {
                return Err(FetchError::Status {
                    url: requested.to_string(),
                    status: *status,
                });
            }
            self.bodies.get(served_from).cloned().ok_or(FetchError::Status {
                url: requested.to_string(),
                status: 404,
            })
        }
    }

    impl HttpFetch for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.fetch_page(url).await.map(|page| page.body)
        }

        async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            let final_url = self.follow(url);
            let body = self.serve(url, &final_url)?;
            Ok(FetchedPage { final_url, body })
        }

        async fn resolve_final_url(&self, url: &str) -> Result<String, FetchError> {
            self.resolved.lock().unwrap().push(url.to_string());
            Ok(self.follow(url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;

    #[test]
    fn test_fetch_error_carries_url() {
        let err = FetchError::Status {
            url: "https://example.com/x".to_string(),
            status: 503,
        };
        assert_eq!(err.url(), "https://example.com/x");
        assert_eq!(err.to_string(), "HTTP 503 from https://example.com/x");

        let err = FetchError::Timeout {
            url: "https://slow.example".to_string(),
            timeout_ms: 20_000,
        };
        assert!(err.to_string().contains("20000ms"));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_request() {
        let fetcher = Fetcher::new("test-agent/1.0", Duration::from_millis(500)).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_stub_serves_bodies_and_404s() {
        let stub = StubFetcher::new()
            .with_body("https://a.example/feed", "<rss/>")
            .with_redirect("https://news.google.com/rss/articles/x", "https://a.example/story");

        assert_eq!(stub.fetch("https://a.example/feed").await.unwrap(), "<rss/>");
        assert!(matches!(
            stub.fetch("https://a.example/missing").await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(
            stub.resolve_final_url("https://news.google.com/rss/articles/x")
                .await
                .unwrap(),
            "https://a.example/story"
        );
        assert_eq!(stub.requests().len(), 2);
        assert_eq!(stub.resolutions().len(), 1);
    }

    #[tokio::test]
    async fn test_stub_fetch_page_follows_redirects() {
        let stub = StubFetcher::new()
            .with_redirect("https://a.example/curto", "https://a.example/noticia/longa")
            .with_body("https://a.example/noticia/longa", "<html></html>");

        let page = stub.fetch_page("https://a.example/curto").await.unwrap();
        assert_eq!(page.final_url, "https://a.example/noticia/longa");
        assert_eq!(page.body, "<html></html>");
        assert_eq!(stub.requests(), vec!["https://a.example/curto".to_string()]);
        assert!(stub.resolutions().is_empty());
    }
}
