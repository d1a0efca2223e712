use serde::Deserialize;
use std::path::Path;

use crate::error::CredentialError;

/// Static OAuth client registration, as downloaded from the Google API console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppCredentials {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Registered redirect URIs (overridden by the local listener during a grant)
    pub redirect_uris: Vec<String>,
    /// Authorization endpoint
    pub auth_uri: String,
    /// Token endpoint
    pub token_uri: String,
}

/// Top-level shape of a client-secret file. Desktop clients live under
/// `installed`, web clients under `web`.
#[derive(Deserialize)]
struct CredentialFile {
    installed: Option<AppCredentials>,
    web: Option<AppCredentials>,
}

impl AppCredentials {
    /// Parse a client-secret JSON document.
    pub fn from_json(content: &str) -> Result<Self, String> {
        let file: CredentialFile = serde_json::from_str(content).map_err(|e| e.to_string())?;

        let credentials = file
            .installed
            .or(file.web)
            .ok_or_else(|| "no credentials found".to_string())?;

        if credentials.redirect_uris.is_empty() {
            return Err("missing redirect URL in the JSON".to_string());
        }

        Ok(credentials)
    }

    /// Read and parse the credential file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            CredentialError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Self::from_json(&content).map_err(CredentialError::Malformed)
    }
}
