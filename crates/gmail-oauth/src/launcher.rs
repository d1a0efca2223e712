//! Subprocess launching capability.
//!
//! The authorization flow never spawns processes directly. It goes through a
//! [`Launcher`], so tests can swap in a [`ScriptedLauncher`] that replays canned
//! results instead of opening a real browser.

mod scripted;

pub use scripted::{ExpectedCommand, ScriptedLauncher};

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;

/// Command used to hand a URL to the desktop's default browser.
#[cfg(target_os = "macos")]
pub const BROWSER_COMMAND: &str = "open";
#[cfg(not(target_os = "macos"))]
pub const BROWSER_COMMAND: &str = "xdg-open";

/// Errors from running an external command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("no command given")]
    EmptyCommand,

    #[error("{program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program}: {status}")]
    Exit {
        program: String,
        status: String,
        output: String,
    },
}

/// Runs external commands and returns their combined output.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run `command` (program followed by arguments) in `dir`, or in the
    /// current directory when `dir` is `None`.
    async fn output(&self, dir: Option<&Path>, command: &[String]) -> Result<Vec<u8>, LaunchError>;

    /// Like [`Launcher::output`], but with `env` as the complete environment.
    async fn output_with_env(
        &self,
        dir: Option<&Path>,
        env: &[(String, String)],
        command: &[String],
    ) -> Result<Vec<u8>, LaunchError>;
}

/// Launcher that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    async fn run(
        dir: Option<&Path>,
        env: Option<&[(String, String)]>,
        command: &[String],
    ) -> Result<Vec<u8>, LaunchError> {
        let (program, args) = command.split_first().ok_or(LaunchError::EmptyCommand)?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        if let Some(env) = env {
            cmd.env_clear();
            cmd.envs(env.iter().map(|(k, v)| (k, v)));
        }

        tracing::debug!(program = %program, ?args, "spawning command");

        let output = cmd.output().await.map_err(|e| LaunchError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if !output.status.success() {
            return Err(LaunchError::Exit {
                program: program.clone(),
                status: output.status.to_string(),
                output: String::from_utf8_lossy(&combined).into_owned(),
            });
        }

        Ok(combined)
    }
}

#[async_trait]
impl Launcher for SystemLauncher {
    async fn output(&self, dir: Option<&Path>, command: &[String]) -> Result<Vec<u8>, LaunchError> {
        Self::run(dir, None, command).await
    }

    async fn output_with_env(
        &self,
        dir: Option<&Path>,
        env: &[(String, String)],
        command: &[String],
    ) -> Result<Vec<u8>, LaunchError> {
        Self::run(dir, Some(env), command).await
    }
}
