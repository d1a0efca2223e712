//! Local stand-ins for Google's authorization and token endpoints.

use axum::{
    Form, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::credentials::AppCredentials;

type Grants = Arc<Mutex<Vec<HashMap<String, String>>>>;

#[derive(Clone)]
struct MockState {
    grants: Grants,
    token_status: StatusCode,
}

/// Serves the authorization endpoint (GET /) and the token endpoint (POST /).
pub(crate) struct MockGoogle {
    pub url: String,
    grants: Grants,
    server: tokio::task::JoinHandle<()>,
}

impl MockGoogle {
    pub async fn start() -> Self {
        Self::with_token_status(StatusCode::OK).await
    }

    pub async fn start_failing_token() -> Self {
        Self::with_token_status(StatusCode::INTERNAL_SERVER_ERROR).await
    }

    async fn with_token_status(token_status: StatusCode) -> Self {
        let grants = Grants::default();
        let state = MockState {
            grants: grants.clone(),
            token_status,
        };
        let app = Router::new()
            .route("/", get(authorize).post(token))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url,
            grants,
            server,
        }
    }

    /// Form bodies posted to the token endpoint so far.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.grants.lock().unwrap().clone()
    }
}

impl Drop for MockGoogle {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Plays the user approving access: redirects back with `code=foo`.
async fn authorize(Query(params): Query<HashMap<String, String>>) -> StatusCode {
    if params.get("access_type").map(String::as_str) == Some("offline") {
        let redirect = format!("{}?code=foo", params["redirect_uri"]);
        tokio::spawn(async move {
            reqwest::get(redirect).await.unwrap();
        });
    }
    StatusCode::OK
}

async fn token(State(state): State<MockState>, Form(form): Form<HashMap<String, String>>) -> Response {
    let grant_type = form.get("grant_type").cloned().unwrap_or_default();
    state.grants.lock().unwrap().push(form);

    if state.token_status != StatusCode::OK {
        return state.token_status.into_response();
    }

    if grant_type == "refresh_token" {
        return (
            [("content-type", "application/json")],
            r#"{"access_token":"refreshedToken","token_type":"Bearer","expires_in":3600}"#,
        )
            .into_response();
    }

    "access_token=fakeToken".into_response()
}

/// Launcher hook that follows the authorization URL like a browser would.
pub(crate) fn open_in_browser(command: &[String]) {
    let url = command[1].clone();
    tokio::spawn(async move {
        reqwest::get(url).await.unwrap();
    });
}

pub(crate) fn test_credentials(endpoint: &str) -> AppCredentials {
    AppCredentials {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        redirect_uris: vec![endpoint.to_string()],
        auth_uri: endpoint.to_string(),
        token_uri: endpoint.to_string(),
    }
}

/// Write a client-secret file pointing both endpoints at `endpoint`. The
/// registered redirect URI is empty; the local listener supplies the real one.
pub(crate) fn write_credentials(dir: &Path, endpoint: &str) -> PathBuf {
    let path = dir.join("credentials");
    let json = serde_json::json!({
        "installed": {
            "client_id": "id",
            "client_secret": "secret",
            "redirect_uris": [""],
            "auth_uri": endpoint,
            "token_uri": endpoint,
        }
    });
    std::fs::write(&path, json.to_string()).unwrap();
    path
}
