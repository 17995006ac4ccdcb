//! HTTP client for the remote change feed.
//!
//! `GET {endpoint}/api/v1/flashcards/changes?limit=N[&cursor=C]` with a bearer
//! token. The response body is a [`FetchPage`] in JSON.

use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::{Error, Result};

use super::{FetchPage, RemoteSource};

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

const CHANGES_PATH: &str = "/api/v1/flashcards/changes";

/// Authenticated client for the remote service.
pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    page_size: usize,
}

impl HttpRemote {
    pub fn new(endpoint: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            access_token,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Full URL for the page after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured endpoint is not a valid URL.
    pub fn changes_url(&self, cursor: Option<&str>) -> Result<Url> {
        let base = format!("{}{CHANGES_PATH}", self.endpoint.trim_end_matches('/'));
        let mut url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }
}

/// Map a non-success HTTP status to a transport error.
fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::transport(format!("remote rejected credentials ({detail})"), false)
        }
        StatusCode::TOO_MANY_REQUESTS => Error::transport(format!("rate limited ({detail})"), true),
        s if s.is_server_error() => Error::transport(format!("remote unavailable ({detail})"), true),
        _ => Error::transport(format!("unexpected response ({detail})"), false),
    }
}

fn request_error(e: &reqwest::Error) -> Error {
    let retryable = e.is_timeout() || e.is_connect() || e.is_request();
    Error::transport(format!("request failed: {e}"), retryable)
}

impl RemoteSource for HttpRemote {
    async fn fetch_changed(&self, cursor: Option<&str>) -> Result<FetchPage> {
        let url = self.changes_url(cursor)?;
        debug!(%url, "fetching changed flashcards");

        let mut request = self.client.get(url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body.trim()));
        }

        response
            .json::<FetchPage>()
            .await
            .map_err(|e| Error::transport(format!("invalid response body: {e}"), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_url_with_cursor() {
        let remote = HttpRemote::new("https://cards.example.com/", None).with_page_size(25);
        let url = remote.changes_url(Some("abc def")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cards.example.com/api/v1/flashcards/changes?limit=25&cursor=abc+def"
        );
    }

    #[test]
    fn test_changes_url_first_page() {
        let remote = HttpRemote::new("https://cards.example.com", None);
        let url = remote.changes_url(None).unwrap();
        assert_eq!(url.query(), Some("limit=100"));
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let remote = HttpRemote::new("not a url", None);
        assert!(matches!(remote.changes_url(None), Err(Error::Config(_))));
    }

    #[test]
    fn test_status_classification() {
        let auth = status_error(StatusCode::UNAUTHORIZED, "");
        assert!(!auth.is_transient());

        let outage = status_error(StatusCode::BAD_GATEWAY, "upstream");
        assert!(outage.is_transient());
        assert!(outage.to_string().contains("upstream"));

        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!status_error(StatusCode::NOT_FOUND, "").is_transient());
    }

    #[tokio::test]
    async fn test_fetch_reports_status_and_body() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path(CHANGES_PATH);
                then.status(503).body("maintenance window\n");
            })
            .await;

        let remote = HttpRemote::new(server.base_url(), Some("tok".into()));
        let err = remote.fetch_changed(None).await.unwrap_err();

        assert!(err.is_transient());
        assert!(err.to_string().contains("maintenance window"));
    }

    #[tokio::test]
    async fn test_fetch_decodes_page_with_bearer_token() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET)
                    .path(CHANGES_PATH)
                    .query_param("cursor", "p1")
                    .header("authorization", "Bearer tok");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        r#"{"records":[{"id":"a1","front":"Q","back":"A"},{"id":"a2","front":42}],
                            "next_cursor":"p2","has_more":true}"#,
                    );
            })
            .await;

        let remote = HttpRemote::new(server.base_url(), Some("tok".into()));
        let page = remote.fetch_changed(Some("p1")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.records.len(), 2);
        assert!(page.records[1].defect.is_some());
        assert!(page.has_more);
    }
}
