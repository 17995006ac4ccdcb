//! OAuth login for the remote service.
//!
//! Authorization-code flow with a loopback redirect:
//! 1. Bind a [`LoopbackServer`] and build the authorize URL with a random `state`
//! 2. The user approves in a browser; the provider redirects to the loopback
//! 3. Check `state`, then exchange the code at the token endpoint
//!
//! The resulting access token is what [`crate::remote::HttpRemote`] sends as
//! its bearer credential.

pub mod loopback;

pub use loopback::{AuthCode, LoopbackServer, DEFAULT_LISTEN_TIMEOUT};

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::CardsyncConfig;
use crate::error::{Error, Result};

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Upper bound on the token exchange request.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth endpoints and client id.
pub struct OAuthClient {
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    client_id: String,
    request_timeout: Duration,
}

impl OAuthClient {
    pub fn new(
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            request_timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build from the OAuth section of the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing setting.
    pub fn from_config(config: &CardsyncConfig) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("\"{name}\" is not set in config.json")))
        };

        Ok(Self::new(
            required(&config.authorize_url, "authorize_url")?,
            required(&config.token_url, "token_url")?,
            required(&config.client_id, "client_id")?,
        ))
    }

    /// URL the user opens to approve access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the authorize endpoint is not a valid URL.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.authorize_url).map_err(|e| {
            Error::Config(format!("invalid authorize_url '{}': {e}", self.authorize_url))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }

    /// Trade an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the token endpoint refuses the code.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .timeout(self.request_timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::transport(format!("token request failed: {e}"), true))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token exchange rejected ({status}): {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("invalid token response: {e}")))
    }
}

/// Reject a callback whose `state` does not match what we sent.
///
/// # Errors
///
/// Returns [`Error::Auth`] on mismatch.
pub fn verify_state(expected: &str, returned: &str) -> Result<()> {
    if expected == returned {
        Ok(())
    } else {
        Err(Error::Auth(
            "state mismatch in authentication callback".to_string(),
        ))
    }
}

/// Run the full login flow.
///
/// `on_authorize` receives the URL the user must open; the CLI prints it.
///
/// # Errors
///
/// Returns an error if the callback fails, times out, carries the wrong
/// state, or the code exchange is refused.
pub async fn login<F>(oauth: &OAuthClient, timeout: Duration, on_authorize: F) -> Result<TokenResponse>
where
    F: FnOnce(&Url),
{
    let mut server = LoopbackServer::bind().await?;
    let state = uuid::Uuid::new_v4().to_string();
    let url = oauth.authorization_url(server.redirect_uri(), &state)?;
    debug!(redirect_uri = server.redirect_uri(), "waiting for authorization callback");

    on_authorize(&url);
    let callback = server.listen(timeout).await?;
    verify_state(&state, &callback.state)?;

    let token = oauth.exchange_code(&callback.code, server.redirect_uri()).await?;
    info!("authorization complete");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new(
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
            "cardsync-desktop",
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = client()
            .authorization_url("http://127.0.0.1:5000/callback", "s1")
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("client_id".into(), "cardsync-desktop".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://127.0.0.1:5000/callback".into())));
        assert!(pairs.contains(&("state".into(), "s1".into())));
    }

    #[test]
    fn test_verify_state() {
        assert!(verify_state("abc", "abc").is_ok());
        assert!(matches!(verify_state("abc", "evil"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_from_config_requires_all_settings() {
        let mut config = CardsyncConfig {
            authorize_url: Some("https://auth.example.com/authorize".into()),
            token_url: Some("https://auth.example.com/token".into()),
            ..CardsyncConfig::default()
        };
        let err = OAuthClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("client_id"));

        config.client_id = Some("id".into());
        assert!(OAuthClient::from_config(&config).is_ok());
    }

    #[test]
    fn test_token_response_parses() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"t","token_type":"bearer"}"#).unwrap();
        assert_eq!(token.access_token, "t");
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/token")
                    .body_contains("grant_type=authorization_code")
                    .body_contains("code=abc");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"access_token":"tok","expires_in":3600}"#);
            })
            .await;

        let oauth = OAuthClient::new(server.url("/authorize"), server.url("/token"), "cardsync-desktop");
        let token = oauth.exchange_code("abc", "http://127.0.0.1:1/callback").await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_stalled_token_endpoint_times_out() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/token");
                then.status(200)
                    .delay(Duration::from_secs(5))
                    .body(r#"{"access_token":"late"}"#);
            })
            .await;

        let oauth = OAuthClient::new(server.url("/authorize"), server.url("/token"), "id")
            .with_timeout(Duration::from_millis(100));
        let err = oauth.exchange_code("abc", "http://127.0.0.1:1/callback").await.unwrap_err();

        assert!(err.is_transient());
        assert!(err.to_string().contains("token request failed"));
    }
}
