use clap::Parser;
use gmail_oauth::{CredentialClient, DEFAULT_CALLBACK_TIMEOUT_SECS, SystemLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// OAuth 2.0 helper tool for Gmail API authentication
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The Gmail OAuth credential file
    #[arg(long, env = "GMAIL_OAUTH_CREDENTIAL_FILE")]
    credential_file: PathBuf,

    /// Path to save the OAuth token file
    #[arg(long)]
    token_file: PathBuf,

    /// Seconds to wait for the browser to come back (0 waits forever)
    #[arg(long, default_value_t = DEFAULT_CALLBACK_TIMEOUT_SECS)]
    callback_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let timeout = (args.callback_timeout_secs > 0)
        .then(|| Duration::from_secs(args.callback_timeout_secs));
    let client = CredentialClient::new(&args.credential_file, &args.token_file, Arc::new(SystemLauncher))?
        .with_callback_timeout(timeout);

    // Always run the browser flow, replacing whatever token is cached
    client.authorize(&mut std::io::stdout()).await?;

    eprintln!("\nOAuth token saved to: {}", args.token_file.display());
    eprintln!("You can now use this token with unread-checker");

    Ok(())
}
