//! Monitora feed API access with optional backoff retry.
//!
//! # Architecture
//!
//! - [`FetchPage`]: core trait, fetch one feed page from a URL
//! - [`HttpFeed`]: token-authenticated `reqwest` implementation
//! - [`RetryFetch`]: decorator that retries transient failures of any `FetchPage`
//! - [`fetch_new_articles`]: the pagination loop
//!
//! # Status handling
//!
//! | status | first page | continuation page |
//! |--------|------------|-------------------|
//! | 200 | decoded | decoded |
//! | 401 | [`Error::Authentication`] | [`Error::Authentication`] |
//! | 404 | [`Error::UnknownFeed`] | [`Error::Transport`] |
//! | other | [`Error::Transport`] | [`Error::Transport`] |
//!
//! A failure on any page aborts the whole fetch; nothing fetched so far is returned.

use crate::error::{Error, Result};
use crate::models::{Article, FeedPage};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Which page of the chain a request is for; decides how 404 is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    First,
    Continuation,
}

/// Fetch a single feed page.
pub trait FetchPage {
    /// Fetch and decode the page at `url`.
    async fn fetch_page(&self, url: &Url, kind: PageKind) -> Result<FeedPage>;
}

/// HTTP client for the feed endpoint.
///
/// Every request carries `Authorization: Token {api_token}`.
pub struct HttpFeed {
    client: reqwest::Client,
    api_token: String,
}

impl HttpFeed {
    /// Build a client with the given request timeout.
    pub fn new(api_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_token: api_token.into(),
        })
    }
}

impl fmt::Debug for HttpFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFeed")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl FetchPage for HttpFeed {
    #[instrument(level = "info", skip_all, fields(url = %url, ?kind))]
    async fn fetch_page(&self, url: &Url, kind: PageKind) -> Result<FeedPage> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.api_token))
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .send()
            .await?;

        let status = response.status();
        debug!(%status, elapsed_ms = t0.elapsed().as_millis() as u64, "Feed responded");

        match (status, kind) {
            (StatusCode::OK, _) => {}
            (StatusCode::UNAUTHORIZED, _) => return Err(Error::Authentication),
            (StatusCode::NOT_FOUND, PageKind::First) => {
                let feed_id = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default();
                return Err(Error::UnknownFeed(feed_id.to_string()));
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                error!(
                    status = status.as_u16(),
                    body = %truncate_for_log(&body, 500),
                    "Feed request failed"
                );
                return Err(Error::Transport {
                    url: url.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }
        }

        let body = response.text().await?;
        serde_json::from_str::<FeedPage>(&body).map_err(|source| {
            warn!(body = %truncate_for_log(&body, 300), "Feed returned an unexpected body");
            Error::Decode {
                url: url.to_string(),
                source,
            }
        })
    }
}

/// Wrapper that adds exponential backoff retry to any [`FetchPage`] implementation.
///
/// Only errors for which [`Error::is_transient`] holds are retried; 401 and 404
/// fail immediately. With `max_retries == 0` this is a plain pass-through.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: FetchPage,
{
    /// Wrap `inner` with retry.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to wrap
    /// * `max_retries` - Extra attempts after the first; `0` disables retrying
    /// * `base_delay` - Delay before the first retry, doubled per attempt up to 30s
    ///
    /// # Example
    ///
    /// ```ignore
    /// let feed = RetryFetch::new(HttpFeed::new("token", Duration::from_secs(60))?, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchPage for RetryFetch<T>
where
    T: FetchPage,
{
    async fn fetch_page(&self, url: &Url, kind: PageKind) -> Result<FeedPage> {
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(url, kind).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "Feed request failed; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// URL of the first page: `{base}/feed/{feed_id}?lower_id={lower_id}`.
///
/// # Errors
///
/// Returns [`Error::Config`] if `base_url` is not a valid absolute URL.
pub fn first_page_url(base_url: &str, feed_id: &str, lower_id: u64) -> Result<Url> {
    let mut url = Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| Error::config(format!("invalid base URL {base_url:?}: {e}"), "base_url"))?;
    url.path_segments_mut()
        .map_err(|_| Error::config(format!("base URL {base_url:?} cannot have a path"), "base_url"))?
        .pop_if_empty()
        .extend(["feed", feed_id]);
    url.query_pairs_mut()
        .append_pair("lower_id", &lower_id.to_string());
    Ok(url)
}

/// Fetch every article with an id above `since_id`, following `next_url` links.
///
/// The first request goes to `{base_url}/feed/{feed_id}?lower_id={since_id + 1}`.
/// Continuation URLs are requested verbatim until a page has no `next_url`
/// (absent, `null` or empty).
///
/// # Arguments
///
/// * `fetcher` - Page source, usually [`HttpFeed`] or a [`RetryFetch`] around it
/// * `base_url` - API root, e.g. `https://api.monitora.cz`
/// * `feed_id` - Feed identifier as configured
/// * `since_id` - Highest article id already exported; `0` on the first run
///
/// # Returns
///
/// All articles of all pages, in server order, pages concatenated.
///
/// # Errors
///
/// Any page failure aborts the fetch and nothing is returned; see the module
/// docs for how statuses map to [`Error`] variants. An unparseable
/// `next_url` is [`Error::InvalidUrl`].
///
/// # Example
///
/// ```ignore
/// let feed = RetryFetch::new(HttpFeed::new(token, Duration::from_secs(60))?, 3, Duration::from_secs(1));
/// let articles = fetch_new_articles(&feed, "https://api.monitora.cz", "42", 100).await?;
/// ```
#[instrument(level = "info", skip(fetcher, base_url))]
pub async fn fetch_new_articles<F>(
    fetcher: &F,
    base_url: &str,
    feed_id: &str,
    since_id: u64,
) -> Result<Vec<Article>>
where
    F: FetchPage,
{
    let lower_id = since_id.saturating_add(1);
    info!(lower_id, "Downloading articles");

    let mut url = first_page_url(base_url, feed_id, lower_id)?;
    let mut kind = PageKind::First;
    let mut articles = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = fetcher.fetch_page(&url, kind).await?;
        pages += 1;
        info!(page = pages, count = page.articles.len(), "Downloaded page");

        let next = page.next_url().map(str::to_owned);
        articles.extend(page.articles);

        let Some(next) = next else { break };
        url = Url::parse(&next).map_err(|source| Error::InvalidUrl { url: next, source })?;
        kind = PageKind::Continuation;
    }

    info!(pages, total = articles.len(), "Feed exhausted");
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpFeed {
        HttpFeed::new("secret", Duration::from_secs(5)).unwrap()
    }

    fn ids(articles: &[Article]) -> Vec<u64> {
        articles.iter().map(|a| a["id"].as_u64().unwrap()).collect()
    }

    #[test]
    fn test_first_page_url() {
        let url = first_page_url("https://api.monitora.cz", "42", 101).unwrap();
        assert_eq!(url.as_str(), "https://api.monitora.cz/feed/42?lower_id=101");

        let url = first_page_url("https://api.monitora.cz/", "42", 1).unwrap();
        assert_eq!(url.as_str(), "https://api.monitora.cz/feed/42?lower_id=1");

        let url = first_page_url("http://localhost:9000/api", "7", 1).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/api/feed/7?lower_id=1");
    }

    #[test]
    fn test_first_page_url_rejects_bad_base() {
        assert!(matches!(
            first_page_url("not a url", "1", 1),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_follows_next_url_until_exhausted() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/feed/42"))
            .and(query_param("lower_id", "101"))
            .and(header("Authorization", "Token secret"))
            .and(header("Content-Type", "application/json; charset=utf-8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "articles": [{"id": 101}, {"id": 103}],
                "next_url": format!("{}/feed/42/next?cursor=abc", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/feed/42/next"))
            .and(query_param("cursor", "abc"))
            .and(query_param_is_missing("lower_id"))
            .and(header("Authorization", "Token secret"))
            .and(header("Content-Type", "application/json; charset=utf-8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "articles": [{"id": 102}],
                "next_url": null,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let articles = fetch_new_articles(&client(), &server.uri(), "42", 100)
            .await
            .unwrap();

        assert_eq!(ids(&articles), vec![101, 103, 102]);
    }

    #[tokio::test]
    async fn test_empty_next_url_terminates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/9"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"articles": [{"id": 1}], "next_url": ""})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let articles = fetch_new_articles(&client(), &server.uri(), "9", 0).await.unwrap();
        assert_eq!(ids(&articles), vec![1]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = fetch_new_articles(&client(), &server.uri(), "42", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_unknown_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch_new_articles(&client(), &server.uri(), "nope", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFeed(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_continuation_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "articles": [{"id": 101}],
                "next_url": format!("{}/feed/42/next", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed/42/next"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_new_articles(&client(), &server.uri(), "42", 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_first_page_server_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/42"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryFetch::new(client(), 0, Duration::from_millis(1));
        let err = fetch_new_articles(&fetcher, &server.uri(), "42", 0)
            .await
            .unwrap_err();
        match &err {
            Error::Transport { status, body, .. } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_continuation_failure_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "articles": [{"id": 101}],
                "next_url": format!("{}/feed/42/next", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed/42/next"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let err = fetch_new_articles(&client(), &server.uri(), "42", 100)
            .await
            .unwrap_err();
        match &err {
            Error::Transport { status, body, .. } => {
                assert_eq!(*status, 404);
                assert_eq!(body, "gone");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_invalid_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = fetch_new_articles(&client(), &server.uri(), "42", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"articles": [{"id": 5}], "next_url": null})),
            )
            .mount(&server)
            .await;

        let fetcher = RetryFetch::new(client(), 2, Duration::from_millis(1));
        let articles = fetch_new_articles(&fetcher, &server.uri(), "42", 0).await.unwrap();
        assert_eq!(ids(&articles), vec![5]);
    }

    #[tokio::test]
    async fn test_retry_never_retries_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryFetch::new(client(), 3, Duration::from_millis(1));
        let err = fetch_new_articles(&fetcher, &server.uri(), "42", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }

    /// Scripted pages for exercising the loop without HTTP.
    struct ScriptedFeed {
        pages: RefCell<VecDeque<Result<FeedPage>>>,
        seen: RefCell<Vec<(String, PageKind)>>,
    }

    impl FetchPage for ScriptedFeed {
        async fn fetch_page(&self, url: &Url, kind: PageKind) -> Result<FeedPage> {
            self.seen.borrow_mut().push((url.to_string(), kind));
            self.pages.borrow_mut().pop_front().expect("unexpected request")
        }
    }

    fn page(ids: &[u64], next: Option<&str>) -> Result<FeedPage> {
        Ok(serde_json::from_value(json!({
            "articles": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
            "next_url": next,
        }))
        .unwrap())
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let transient = || {
            Err(Error::Transport {
                url: "u".into(),
                status: 502,
                body: String::new(),
            })
        };
        let feed = ScriptedFeed {
            pages: RefCell::new(VecDeque::from([transient(), transient(), transient()])),
            seen: RefCell::new(Vec::new()),
        };

        let fetcher = RetryFetch::new(feed, 1, Duration::from_millis(1));
        let err = fetch_new_articles(&fetcher, "https://api.monitora.cz", "1", 0)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport { status: 502, .. }));
        assert_eq!(fetcher.inner.seen.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_page_kinds_and_verbatim_continuation() {
        let feed = ScriptedFeed {
            pages: RefCell::new(VecDeque::from([
                page(&[11, 12], Some("https://cdn.monitora.cz/p2?token=x&lower_id=999")),
                page(&[13], None),
            ])),
            seen: RefCell::new(Vec::new()),
        };

        let articles = fetch_new_articles(&feed, "https://api.monitora.cz", "3", 10)
            .await
            .unwrap();

        assert_eq!(ids(&articles), vec![11, 12, 13]);
        let seen = feed.seen.borrow();
        assert_eq!(
            seen.as_slice(),
            [
                (
                    "https://api.monitora.cz/feed/3?lower_id=11".to_string(),
                    PageKind::First
                ),
                (
                    "https://cdn.monitora.cz/p2?token=x&lower_id=999".to_string(),
                    PageKind::Continuation
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_next_url() {
        let feed = ScriptedFeed {
            pages: RefCell::new(VecDeque::from([page(&[1], Some("not a url"))])),
            seen: RefCell::new(Vec::new()),
        };

        let err = fetch_new_articles(&feed, "https://api.monitora.cz", "3", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
