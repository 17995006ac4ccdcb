//! Loopback redirect server for the OAuth authorization-code flow.
//!
//! Binds an ephemeral port on 127.0.0.1 and serves
//! `/callback?code=..&state=..` with axum. The first callback ends listening;
//! the server then shuts down and cannot be reused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default time to wait for the browser.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(120);

const CALLBACK_PATH: &str = "/callback";

/// Time the callback response gets to reach the browser after listening ends.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const INVALID_PARAMS: &str = "Invalid code and state parameters";

/// Authorization code and state returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCode {
    pub code: String,
    pub state: String,
}

/// Hands the first callback's outcome back to `listen`.
type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<Result<AuthCode>>>>>;

enum ServerState {
    Started(TcpListener),
    Listening,
    Closed,
}

impl ServerState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Listening => "listening",
            Self::Closed => "closed",
        }
    }
}

/// One-shot callback server.
pub struct LoopbackServer {
    redirect_uri: String,
    state: ServerState,
}

impl LoopbackServer {
    /// Bind a free port on the loopback interface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if no port can be bound.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| Error::Auth(format!("Failed to start callback server: {e}")))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            redirect_uri: format!("http://127.0.0.1:{port}{CALLBACK_PATH}"),
            state: ServerState::Started(listener),
        })
    }

    /// URI to register as `redirect_uri` in the authorization request.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ServerState::Closed)
    }

    /// Serve until the first callback arrives, then shut down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the provider reports an error, the
    /// callback lacks `code` or `state`, the timeout elapses, or the server
    /// is not in its initial state.
    pub async fn listen(&mut self, timeout: Duration) -> Result<AuthCode> {
        let listener = match std::mem::replace(&mut self.state, ServerState::Listening) {
            ServerState::Started(listener) => listener,
            other => {
                let name = other.name();
                self.state = other;
                return Err(Error::Auth(format!("Invalid state: {name}")));
            }
        };

        let (result_tx, result_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = callback_router(Arc::new(Mutex::new(Some(result_tx))));

        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    stop_rx.await.ok();
                })
                .await
        });

        let outcome = tokio::time::timeout(timeout, result_rx).await;

        stop_tx.send(()).ok();
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Err(e))) => warn!(error = %e, "callback server stopped with an error"),
            Ok(_) => {}
            Err(_) => {
                debug!("callback server still draining connections; aborting");
                server.abort();
            }
        }
        self.close();

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Auth(
                "Callback server stopped before receiving a callback".to_string(),
            )),
            Err(_) => Err(Error::Auth(
                "Timed out waiting for authentication callback".to_string(),
            )),
        }
    }

    /// Mark the server closed. Safe to call more than once.
    pub fn close(&mut self) {
        self.state = ServerState::Closed;
    }
}

fn callback_router(slot: CallbackSlot) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(callback))
        .with_state(slot)
}

async fn callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let outcome = parse_callback(&params);
    let page = callback_page(&outcome);

    match slot.lock().ok().and_then(|mut pending| pending.take()) {
        Some(sender) => {
            sender.send(outcome).ok();
        }
        None => debug!("ignoring callback after the first"),
    }
    Html(page)
}

/// Extract the auth result from the callback's query parameters.
fn parse_callback(params: &HashMap<String, String>) -> Result<AuthCode> {
    if let Some(error) = params.get("error") {
        return Err(Error::Auth(error.clone()));
    }
    match (params.get("code"), params.get("state")) {
        (Some(code), Some(state)) => Ok(AuthCode {
            code: code.clone(),
            state: state.clone(),
        }),
        _ => Err(Error::Auth(INVALID_PARAMS.to_string())),
    }
}

fn callback_page(outcome: &Result<AuthCode>) -> String {
    match outcome {
        Ok(_) => render_page(
            "Authentication Successful!",
            "Your authentication was successful.",
        ),
        Err(Error::Auth(message)) if message == INVALID_PARAMS => render_page(
            "Invalid Request",
            "The request was invalid. Code and state parameters must be strings.",
        ),
        Err(Error::Auth(message)) => {
            render_page("Invalid Request", &format!("Something went wrong. {message}"))
        }
        Err(other) => render_page("Invalid Request", &format!("Something went wrong. {other}")),
    }
}

fn render_page(title: &str, message: &str) -> String {
    let title = escape_html(title);
    let message = escape_html(message);
    format!(
        "<html><head><meta charset='utf-8'><title>{title}</title>\
         <style>body {{ font-family: sans-serif; margin: 20px; }}</style></head>\
         <body><h1>{title}</h1><p>{message}</p>\
         <p>You can close this window and return to your flashcards.</p></body></html>"
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hit(uri: String) -> (u16, String) {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = client.get(uri).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    fn authority(server: &LoopbackServer) -> String {
        server
            .redirect_uri()
            .trim_start_matches("http://")
            .trim_end_matches(CALLBACK_PATH)
            .to_string()
    }

    #[tokio::test]
    async fn test_successful_callback() {
        let mut server = LoopbackServer::bind().await.unwrap();
        assert!(server.redirect_uri().starts_with("http://127.0.0.1:"));
        assert!(server.redirect_uri().ends_with("/callback"));
        let uri = format!("{}?code=abc&state=xyz", server.redirect_uri());

        let (result, (status, body)) =
            tokio::join!(server.listen(Duration::from_secs(5)), hit(uri));

        assert_eq!(
            result.unwrap(),
            AuthCode {
                code: "abc".into(),
                state: "xyz".into()
            }
        );
        assert_eq!(status, 200);
        assert!(body.contains("Authentication Successful!"));
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let mut server = LoopbackServer::bind().await.unwrap();
        // Browsers open speculative connections that never carry a request
        let _idle = tokio::net::TcpStream::connect(authority(&server)).await.unwrap();
        let uri = format!("{}?code=abc&state=xyz", server.redirect_uri());

        let (result, (status, _)) = tokio::join!(server.listen(Duration::from_secs(5)), hit(uri));

        assert_eq!(result.unwrap().code, "abc");
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_missing_state_is_invalid() {
        let mut server = LoopbackServer::bind().await.unwrap();
        let uri = format!("{}?code=abc", server.redirect_uri());

        let (result, (_, body)) = tokio::join!(server.listen(Duration::from_secs(5)), hit(uri));

        assert_eq!(
            result.unwrap_err().to_string(),
            "Authentication failed: Invalid code and state parameters"
        );
        assert!(body.contains("Invalid Request"));
    }

    #[tokio::test]
    async fn test_provider_error_is_escaped() {
        let mut server = LoopbackServer::bind().await.unwrap();
        let uri = format!("{}?error=%3Cscript%3E", server.redirect_uri());

        let (result, (_, body)) = tokio::join!(server.listen(Duration::from_secs(5)), hit(uri));

        assert!(matches!(result, Err(Error::Auth(ref m)) if m == "<script>"));
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[tokio::test]
    async fn test_other_paths_do_not_end_listening() {
        let mut server = LoopbackServer::bind().await.unwrap();
        let base = format!("http://{}", authority(&server));
        let callback = format!("{}?code=c&state=s", server.redirect_uri());

        let client = async {
            let (status, _) = hit(format!("{base}/favicon.ico")).await;
            assert_eq!(status, 404);
            hit(callback).await
        };
        let (result, _) = tokio::join!(server.listen(Duration::from_secs(5)), client);
        assert_eq!(result.unwrap().code, "c");
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut server = LoopbackServer::bind().await.unwrap();
        let err = server.listen(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.to_string().contains("Timed out waiting for authentication callback"));
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn test_listen_twice_is_invalid_state() {
        let mut server = LoopbackServer::bind().await.unwrap();
        let _ = server.listen(Duration::from_millis(1)).await;
        let err = server.listen(Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("Invalid state: closed"));
    }

    #[test]
    fn test_parse_callback() {
        let params: HashMap<String, String> =
            [("code".to_string(), "c".to_string()), ("state".to_string(), "s".to_string())].into();
        assert_eq!(parse_callback(&params).unwrap().state, "s");
        assert!(parse_callback(&HashMap::new()).is_err());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&#x27;");
    }
}
