//! Gmail message listing and the paginated unread counter.

use gmail_oauth::AuthenticatedTransport;
use serde::Deserialize;

/// Production endpoint for the Gmail users collection.
pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/";

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("Unable to check inbox. {0}")]
    RequestFailed(String),
}

/// Filter applied to every listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub user_id: String,
    pub label_id: String,
    pub q: String,
}

impl ListingQuery {
    /// Unread messages in the authenticated user's inbox.
    pub fn unread_inbox() -> Self {
        Self {
            user_id: "me".to_string(),
            label_id: "INBOX".to_string(),
            q: "label:unread".to_string(),
        }
    }
}

/// Message reference as returned by `users.messages.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

/// One page of a message listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: Option<u64>,
}

impl ListingPage {
    /// Cursor for the following page; `None` on the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Gmail API client bound to one base URL.
pub struct GmailClient {
    transport: AuthenticatedTransport,
    base_url: String,
}

impl GmailClient {
    /// Create a client for `base_url`, normally [`DEFAULT_BASE_URL`].
    pub fn new(transport: AuthenticatedTransport, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            transport,
            base_url,
        }
    }

    /// Fetch a single page, starting after `page_token` when given.
    pub async fn list_page(
        &self,
        query: &ListingQuery,
        page_token: Option<&str>,
    ) -> Result<ListingPage, ListingError> {
        let url = format!(
            "{}{}/messages",
            self.base_url,
            urlencoding::encode(&query.user_id)
        );

        let mut params = vec![
            ("alt", "json"),
            ("labelIds", query.label_id.as_str()),
            ("q", query.q.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let request = self
            .transport
            .get(&url)
            .await
            .map_err(|e| ListingError::RequestFailed(e.to_string()))?;

        let response = request
            .query(&params)
            .send()
            .await
            .map_err(|e| ListingError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ListingError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(ListingError::RequestFailed(format!(
                "got HTTP response code {} with body: {}",
                status.as_u16(),
                body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ListingError::RequestFailed(format!("invalid listing response: {}", e)))
    }

    /// Walk every page of the listing and return the total number of messages.
    ///
    /// Pages are requested one after another, each with the cursor of the
    /// previous one. Any failed request aborts the count.
    pub async fn count_all(&self, query: &ListingQuery) -> Result<u64, ListingError> {
        let mut total: u64 = 0;
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self.list_page(query, cursor.as_deref()).await?;
            pages += 1;
            total += page.messages.len() as u64;

            tracing::debug!(page = pages, items = page.messages.len(), total, "fetched listing page");

            match page.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        Ok(total)
    }
}
