use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Written in place of an absent expiry, matching the zero timestamp other
/// OAuth tooling writes into the same cache files.
pub const ZERO_EXPIRY: &str = "0001-01-01T00:00:00Z";

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_DELTA_SECS: i64 = 10;

/// Errors reading or writing the token cache file.
#[derive(Debug, thiserror::Error)]
pub enum TokenCacheError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Decode(#[from] serde_json::Error),
}

/// OAuth 2.0 token as stored in the token cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// Access token for API requests
    pub access_token: String,
    /// Token type (usually "Bearer")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    /// Refresh token for getting new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry time; `None` means the token does not expire
    #[serde(default, with = "expiry")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a token that never expires.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: String::new(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Check if the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= Utc::now() + Duration::seconds(EXPIRY_DELTA_SECS),
            None => false,
        }
    }

    /// Decode a token from its cache file representation.
    pub fn decode(content: &str) -> Result<Self, TokenCacheError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Encode the token as a single JSON line.
    pub fn encode(&self) -> Result<String, TokenCacheError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Load token from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TokenCacheError> {
        let content = std::fs::read_to_string(path)?;
        Self::decode(&content)
    }

    /// Save token to file, replacing any previous contents. The parent
    /// directory must already exist.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TokenCacheError> {
        use std::io::Write;

        let path = path.as_ref();
        let content = self.encode()?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        // Owner read/write only on Unix-like systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .map_err(|e| std::io::Error::new(e.kind(), format!("open {}: {}", path.display(), e)))?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        Ok(())
    }
}

mod expiry {
    use super::ZERO_EXPIRY;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(expiry) => {
                serializer.serialize_str(&expiry.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_str(ZERO_EXPIRY),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") | Some(ZERO_EXPIRY) => Ok(None),
            Some(value) => DateTime::parse_from_rfc3339(value)
                .map(|expiry| Some(expiry.with_timezone(&Utc)))
                .map_err(D::Error::custom),
        }
    }
}

/// Body of a successful token endpoint response.
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Token endpoints answer with JSON, but some still send
    /// `application/x-www-form-urlencoded` bodies.
    fn parse(body: &str) -> Result<Self, String> {
        if let Ok(response) = serde_json::from_str::<TokenResponse>(body) {
            return Ok(response);
        }

        let fields: HashMap<String, String> = url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        if fields.is_empty() {
            return Err(format!("cannot parse token response: {:?}", body));
        }

        Ok(TokenResponse {
            access_token: fields.get("access_token").cloned().unwrap_or_default(),
            token_type: fields.get("token_type").cloned().unwrap_or_default(),
            refresh_token: fields.get("refresh_token").cloned(),
            expires_in: fields.get("expires_in").and_then(|v| v.parse().ok()),
        })
    }

    fn into_token(self) -> Result<CachedToken, String> {
        if self.access_token.is_empty() {
            return Err("server response missing access_token".to_string());
        }

        let expiry = self
            .expires_in
            .filter(|secs| *secs > 0)
            // A lifetime chrono cannot represent is treated as no expiry
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Ok(CachedToken {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry,
        })
    }
}

/// POST a grant to the token endpoint and decode the issued token.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<CachedToken, String> {
    let response = http
        .post(token_uri)
        .form(params)
        .send()
        .await
        .map_err(|e| format!("cannot fetch token: {}", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("cannot fetch token: {}", e))?;

    if !status.is_success() {
        return Err(format!("cannot fetch token: {}\nResponse: {}", status, body));
    }

    TokenResponse::parse(&body)?.into_token()
}
