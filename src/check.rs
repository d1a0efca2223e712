use anyhow::Context;
use gmail_client::{GmailClient, ListingQuery};
use gmail_oauth::{CredentialClient, Launcher};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything the `check` command needs to know.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub credential_file: PathBuf,
    pub token_file: PathBuf,
    pub api_base_url: String,
    pub callback_timeout: Option<Duration>,
}

/// Authenticate, count unread inbox messages, and print the total.
pub async fn run(
    options: &CheckOptions,
    launcher: Arc<dyn Launcher>,
    out: &mut (dyn Write + Send),
) -> anyhow::Result<u64> {
    let client = CredentialClient::new(&options.credential_file, &options.token_file, launcher)
        .context("Could not initialize token client")?
        .with_callback_timeout(options.callback_timeout);

    let transport = client
        .acquire_transport(out)
        .await
        .context("Could not get OAuth token")?;

    let gmail = GmailClient::new(transport, options.api_base_url.clone());
    let total = gmail.count_all(&ListingQuery::unread_inbox()).await?;

    writeln!(out, "{}", total)?;
    Ok(total)
}
