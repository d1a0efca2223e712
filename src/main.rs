use anyhow::bail;
use clap::{Parser, Subcommand};
use gmail_oauth::{DEFAULT_CALLBACK_TIMEOUT_SECS, SystemLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod check;

/// Unread Checker - counts unread messages in a Gmail inbox
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    check: CheckArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count unread messages in the inbox (the default)
    #[command(visible_alias = "c")]
    Check(CheckArgs),
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// The Gmail OAuth credential file
    #[arg(long, env = "GMAIL_OAUTH_CREDENTIAL_FILE")]
    credential_file: Option<PathBuf>,

    /// The file to cache the OAuth token in
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Base URL of the Gmail users API
    #[arg(long, default_value = gmail_client::DEFAULT_BASE_URL)]
    api_base_url: String,

    /// Seconds to wait for the browser to come back (0 waits forever)
    #[arg(long, default_value_t = DEFAULT_CALLBACK_TIMEOUT_SECS)]
    callback_timeout_secs: u64,
}

impl CheckArgs {
    fn into_options(self) -> anyhow::Result<check::CheckOptions> {
        let Some(credential_file) = self.credential_file else {
            bail!("You must specify --credential-file");
        };
        let Some(token_file) = self.token_file else {
            bail!("You must specify --token-file");
        };

        Ok(check::CheckOptions {
            credential_file,
            token_file,
            api_base_url: self.api_base_url,
            callback_timeout: (self.callback_timeout_secs > 0)
                .then(|| Duration::from_secs(self.callback_timeout_secs)),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let args = match cli.command {
        Some(Command::Check(args)) => args,
        None => cli.check,
    };
    let options = args.into_options()?;

    tracing::debug!(
        credential_file = %options.credential_file.display(),
        token_file = %options.token_file.display(),
        api_base_url = %options.api_base_url,
        "checking inbox"
    );

    check::run(&options, Arc::new(SystemLauncher), &mut std::io::stdout()).await?;

    Ok(())
}
