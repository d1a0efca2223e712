//! Interactive authorization-code flow with a local callback listener.
//!
//! The listener binds an ephemeral port on the loopback interface, so its
//! address replaces whatever redirect URI the app credentials carry. The
//! browser is opened through the injected [`Launcher`]. A failed launch only
//! prints the URL again, because the user can still open it by hand.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::credentials::AppCredentials;
use crate::error::AuthError;
use crate::launcher::{BROWSER_COMMAND, Launcher};
use crate::token::{self, CachedToken};

/// Read-only access to the user's mailbox.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Anti-forgery state sent with every authorization request.
pub const STATE_TOKEN: &str = "state-token";

const AUTHORIZED_PAGE: &str = "<html><body><h1>Authorization Successful!</h1>\
    <p>Your inbox should now be authorized.  You may close this window.</p></body></html>";

const DENIED_PAGE: &str = "<html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";

const NO_CODE_PAGE: &str =
    "<html><body><h1>Authorization Failed</h1><p>No code received</p></body></html>";

/// Generate PKCE verifier and challenge
pub fn generate_pkce() -> (String, String) {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use rand::Rng;
    use rand::distributions::Alphanumeric;
    use sha2::{Digest, Sha256};

    let verifier: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();

    // Challenge: base64url(SHA256(verifier))
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    (verifier, challenge)
}

/// Build the authorization URL the user has to visit.
///
/// Parameters are emitted in sorted order so the URL is stable for a given
/// redirect URI and challenge.
pub fn auth_code_url(credentials: &AppCredentials, redirect_uri: &str, challenge: &str) -> String {
    let separator = if credentials.auth_uri.contains('?') {
        '&'
    } else {
        '?'
    };

    format!(
        "{}{}access_type=offline&\
        client_id={}&\
        code_challenge={}&\
        code_challenge_method=S256&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}",
        credentials.auth_uri,
        separator,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(challenge),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(GMAIL_READONLY_SCOPE),
        urlencoding::encode(STATE_TOKEN),
    )
}

type Delivery = Result<String, String>;
type DeliverySlot = Arc<Mutex<Option<oneshot::Sender<Delivery>>>>;

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

async fn handle_callback(
    State(slot): State<DeliverySlot>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (delivery, page) = match (params.code, params.error) {
        (Some(code), _) => (Ok(code), AUTHORIZED_PAGE),
        (None, Some(error)) => (Err(error), DENIED_PAGE),
        (None, None) => return (StatusCode::BAD_REQUEST, Html(NO_CODE_PAGE)).into_response(),
    };

    // Only the first callback is delivered; the receiver is gone after that.
    if let Some(sender) = slot.lock().await.take() {
        let _ = sender.send(delivery);
    }

    Html(page).into_response()
}

/// Local HTTP server that receives the authorization redirect.
///
/// The server task is aborted when the listener is dropped, so it never
/// outlives the grant attempt regardless of how the flow ends.
pub struct CallbackListener {
    redirect_uri: String,
    receiver: oneshot::Receiver<Delivery>,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind an ephemeral port on 127.0.0.1 and start serving.
    pub async fn bind() -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://{}", listener.local_addr()?);

        let (sender, receiver) = oneshot::channel();
        let slot: DeliverySlot = Arc::new(Mutex::new(Some(sender)));
        let app = Router::new().fallback(handle_callback).with_state(slot);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "callback listener stopped");
            }
        });

        tracing::debug!(%redirect_uri, "callback listener started");

        Ok(Self {
            redirect_uri,
            receiver,
            server,
        })
    }

    /// The address the authorization server should redirect to.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Block until one callback arrives, then shut the listener down.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<String, AuthError> {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.receiver)
                .await
                .map_err(|_| AuthError::CallbackTimeout(limit))?,
            None => (&mut self.receiver).await,
        };

        match received {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(error)) => Err(AuthError::WebFlowFailed(format!(
                "authorization denied: {}",
                error
            ))),
            Err(_) => Err(AuthError::WebFlowFailed(
                "callback listener shut down before a code arrived".to_string(),
            )),
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn output_error(e: std::io::Error) -> AuthError {
    AuthError::WebFlowFailed(format!("writing to output: {}", e))
}

/// Run the interactive flow and exchange the resulting code for a token.
pub async fn run_web_flow(
    http: &reqwest::Client,
    credentials: &AppCredentials,
    launcher: &dyn Launcher,
    out: &mut (dyn Write + Send),
    callback_timeout: Option<Duration>,
) -> Result<CachedToken, AuthError> {
    let listener = CallbackListener::bind().await?;
    let redirect_uri = listener.redirect_uri().to_string();

    let (verifier, challenge) = generate_pkce();
    let auth_url = auth_code_url(credentials, &redirect_uri, &challenge);

    writeln!(out, "Attempting to open {} in your browser", auth_url).map_err(output_error)?;

    let command = [BROWSER_COMMAND.to_string(), auth_url.clone()];
    if let Err(e) = launcher.output(None, &command).await {
        tracing::warn!(error = %e, "could not open browser");
        writeln!(
            out,
            "Unable to open browser automatically: {}\nPlease open {} in your browser",
            e, auth_url
        )
        .map_err(output_error)?;
    }

    tracing::info!("waiting for authorization callback");
    let code = listener.wait(callback_timeout).await?;

    tracing::info!("exchanging authorization code for tokens");
    let token = token::request_token(
        http,
        &credentials.token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code_verifier", verifier.as_str()),
        ],
    )
    .await
    .map_err(AuthError::WebFlowFailed)?;

    tracing::info!("obtained OAuth token");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{ExpectedCommand, LaunchError, ScriptedLauncher};
    use crate::test_support::{MockGoogle, open_in_browser, test_credentials};

    #[test]
    fn pkce_challenge_matches_verifier() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use sha2::{Digest, Sha256};

        let (verifier, challenge) = generate_pkce();
        assert_eq!(verifier.len(), 64);
        assert_eq!(
            challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
        );
    }

    #[test]
    fn builds_sorted_auth_url() {
        let creds = test_credentials("https://accounts.example.com/auth");
        let url = auth_code_url(&creds, "http://127.0.0.1:4000", "abc");
        assert_eq!(
            url,
            "https://accounts.example.com/auth?access_type=offline&client_id=id&\
            code_challenge=abc&code_challenge_method=S256&\
            redirect_uri=http%3A%2F%2F127.0.0.1%3A4000&response_type=code&\
            scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fgmail.readonly&state=state-token"
        );
    }

    #[test]
    fn appends_to_existing_query() {
        let creds = test_credentials("https://accounts.example.com/auth?hd=example.com");
        let url = auth_code_url(&creds, "http://127.0.0.1:4000", "abc");
        assert!(url.starts_with("https://accounts.example.com/auth?hd=example.com&access_type=offline&"));
    }

    #[tokio::test]
    async fn listener_delivers_code() {
        let listener = CallbackListener::bind().await.unwrap();
        let uri = format!("{}/?code=foo&state=state-token", listener.redirect_uri());

        let response = tokio::spawn(async move { reqwest::get(uri).await.unwrap() });
        let code = listener.wait(None).await.unwrap();
        assert_eq!(code, "foo");

        let response = response.await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("You may close this window"));
    }

    #[tokio::test]
    async fn listener_ignores_requests_without_code() {
        let listener = CallbackListener::bind().await.unwrap();
        let base = listener.redirect_uri().to_string();

        let stray = reqwest::get(format!("{}/favicon.ico", base)).await.unwrap();
        assert_eq!(stray.status(), 400);

        tokio::spawn(async move { reqwest::get(format!("{}?code=bar", base)).await });
        assert_eq!(listener.wait(None).await.unwrap(), "bar");
    }

    #[tokio::test]
    async fn listener_reports_denied_authorization() {
        let listener = CallbackListener::bind().await.unwrap();
        let uri = format!("{}?error=access_denied", listener.redirect_uri());

        tokio::spawn(async move { reqwest::get(uri).await });
        let err = listener.wait(None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to retrieve token from web: authorization denied: access_denied"
        );
    }

    #[tokio::test]
    async fn listener_times_out() {
        let listener = CallbackListener::bind().await.unwrap();
        let err = listener
            .wait(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CallbackTimeout(_)));
    }

    #[tokio::test]
    async fn web_flow_exchanges_code() {
        let google = MockGoogle::start().await;
        let creds = test_credentials(&google.url);
        let launcher = ScriptedLauncher::new(vec![
            ExpectedCommand::new(None, "xdg-open .*|open .*")
                .unwrap()
                .on_run(open_in_browser),
        ]);
        let mut out = Vec::new();

        let token = run_web_flow(&reqwest::Client::new(), &creds, &launcher, &mut out, None)
            .await
            .unwrap();

        assert_eq!(token, CachedToken::new("fakeToken"));
        assert_eq!(launcher.verify(), Ok(()));

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Attempting to open "));
        assert!(out.ends_with(" in your browser\n"));
        assert_eq!(out.lines().count(), 1);

        let grants = google.token_requests();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0]["grant_type"], "authorization_code");
        assert_eq!(grants[0]["code"], "foo");
        assert_eq!(grants[0]["client_secret"], "secret");
        assert_eq!(grants[0]["code_verifier"].len(), 64);
        assert!(grants[0]["redirect_uri"].starts_with("http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn web_flow_survives_browser_failure() {
        let google = MockGoogle::start().await;
        let creds = test_credentials(&google.url);
        let launcher = ScriptedLauncher::new(vec![
            ExpectedCommand::new(None, "xdg-open .*|open .*")
                .unwrap()
                .with_error(LaunchError::Exit {
                    program: BROWSER_COMMAND.to_string(),
                    status: "exit status: 1".to_string(),
                    output: String::new(),
                })
                .on_run(open_in_browser),
        ]);
        let mut out = Vec::new();

        let token = run_web_flow(&reqwest::Client::new(), &creds, &launcher, &mut out, None)
            .await
            .unwrap();
        assert_eq!(token.access_token, "fakeToken");

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.split('\n').collect();
        let url = lines[0]
            .strip_prefix("Attempting to open ")
            .and_then(|rest| rest.strip_suffix(" in your browser"))
            .unwrap();
        assert_eq!(
            lines,
            vec![
                format!("Attempting to open {} in your browser", url).as_str(),
                format!("Unable to open browser automatically: {}: exit status: 1", BROWSER_COMMAND)
                    .as_str(),
                format!("Please open {} in your browser", url).as_str(),
                "",
            ]
        );
    }

    #[tokio::test]
    async fn web_flow_reports_exchange_failure() {
        let google = MockGoogle::start_failing_token().await;
        let creds = test_credentials(&google.url);
        let launcher = ScriptedLauncher::new(vec![
            ExpectedCommand::new(None, "xdg-open .*|open .*")
                .unwrap()
                .on_run(open_in_browser),
        ]);
        let mut out = Vec::new();

        let err = run_web_flow(&reqwest::Client::new(), &creds, &launcher, &mut out, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to retrieve token from web: cannot fetch token: 500 Internal Server Error\nResponse: "
        );
        assert_eq!(launcher.verify(), Ok(()));
    }
}
