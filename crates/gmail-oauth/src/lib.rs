//! Gmail OAuth 2.0 authorization for command-line tools.
//!
//! A [`CredentialClient`] loads the app's client-secret file and hands out
//! [`AuthenticatedTransport`]s. The token is read from a cache file when one
//! exists. Otherwise the user is sent through the browser-based
//! authorization-code flow and the resulting token is cached for next time.
//!
//! Opening the browser goes through the [`Launcher`] capability so the flow
//! can be driven deterministically in tests with a [`ScriptedLauncher`].

pub mod client;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod launcher;
pub mod token;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::CredentialClient;
pub use credentials::AppCredentials;
pub use error::{AuthError, CredentialError};
pub use flow::{CallbackListener, GMAIL_READONLY_SCOPE, STATE_TOKEN};
pub use launcher::{
    BROWSER_COMMAND, ExpectedCommand, LaunchError, Launcher, ScriptedLauncher, SystemLauncher,
};
pub use token::{CachedToken, TokenCacheError, ZERO_EXPIRY};
pub use transport::AuthenticatedTransport;

/// Default callback wait used by the command-line tools, in seconds.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
