use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{LaunchError, Launcher};

type Hook = Box<dyn Fn(&[String]) + Send + Sync>;

/// One invocation a [`ScriptedLauncher`] expects to see.
pub struct ExpectedCommand {
    dir: Option<PathBuf>,
    pattern: String,
    regex: Regex,
    env: Option<Vec<(String, String)>>,
    output: Vec<u8>,
    error: Option<LaunchError>,
    hook: Option<Hook>,
}

impl std::fmt::Debug for ExpectedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectedCommand")
            .field("dir", &self.dir)
            .field("pattern", &self.pattern)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl ExpectedCommand {
    /// Expect a command run in `dir` whose space-joined words fully match
    /// the regular expression `pattern`.
    pub fn new(dir: Option<&Path>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            dir: dir.map(Path::to_path_buf),
            pattern: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{})$", pattern))?,
            env: None,
            output: Vec::new(),
            error: None,
            hook: None,
        })
    }

    /// Output returned when the command runs.
    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }

    /// Make the command fail with `error`.
    pub fn with_error(mut self, error: LaunchError) -> Self {
        self.error = Some(error);
        self
    }

    /// Require the command to be run with exactly this environment.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Some(env);
        self
    }

    /// Call `hook` with the actual command words when the command runs.
    pub fn on_run(mut self, hook: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    fn check(
        &self,
        dir: Option<&Path>,
        env: Option<&[(String, String)]>,
        line: &str,
    ) -> Result<(), String> {
        if self.dir.as_deref() != dir {
            return Err(format!(
                "Path {:?} did not match expected path {:?}",
                dir, self.dir
            ));
        }
        if !self.regex.is_match(line) {
            return Err(format!(
                "Command '{}' did not match expected command '{}'",
                line, self.pattern
            ));
        }
        if self.env.as_deref() != env {
            return Err(format!(
                "Environment {:?} did not match expected environment {:?}",
                env, self.env
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    expected: VecDeque<ExpectedCommand>,
    errors: Vec<String>,
}

/// Test double that replays a fixed list of expected invocations.
///
/// Mismatches are recorded rather than panicking, because the launcher is
/// usually called deep inside the code under test. Call [`verify`] at the end
/// of the test.
///
/// [`verify`]: ScriptedLauncher::verify
#[derive(Default)]
pub struct ScriptedLauncher {
    script: Mutex<Script>,
    any_order: bool,
}

impl ScriptedLauncher {
    /// Expect exactly `expected`, in order.
    pub fn new(expected: Vec<ExpectedCommand>) -> Self {
        Self {
            script: Mutex::new(Script {
                expected: expected.into(),
                errors: Vec::new(),
            }),
            any_order: false,
        }
    }

    /// Expect exactly `expected`, in any order.
    pub fn any_order(expected: Vec<ExpectedCommand>) -> Self {
        Self {
            any_order: true,
            ..Self::new(expected)
        }
    }

    /// Mismatches recorded so far.
    pub fn errors(&self) -> Vec<String> {
        self.lock().errors.clone()
    }

    /// Number of expected commands that have not run yet.
    pub fn remaining(&self) -> usize {
        self.lock().expected.len()
    }

    /// Check that every expected command ran and nothing unexpected did.
    pub fn verify(&self) -> Result<(), Vec<String>> {
        let script = self.lock();
        let mut problems = script.errors.clone();
        problems.extend(
            script
                .expected
                .iter()
                .map(|ec| format!("Expected command was never run: {}", ec.pattern)),
        );
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking hook must not hide the recorded mismatches.
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_match(
        &self,
        dir: Option<&Path>,
        env: Option<&[(String, String)]>,
        line: &str,
    ) -> Option<ExpectedCommand> {
        let mut script = self.lock();

        if script.expected.is_empty() {
            script.errors.push(format!(
                "More commands were run than expected.  Extra command: {}",
                line
            ));
            return None;
        }

        if self.any_order {
            let mut last_error = None;
            for index in 0..script.expected.len() {
                let checked = script.expected[index].check(dir, env, line);
                match checked {
                    Ok(()) => return script.expected.remove(index),
                    Err(e) => last_error = Some(e),
                }
            }
            script.errors.extend(last_error);
            return None;
        }

        let checked = script.expected[0].check(dir, env, line);
        match checked {
            Ok(()) => script.expected.pop_front(),
            Err(e) => {
                script.errors.push(e);
                None
            }
        }
    }

    fn run(
        &self,
        dir: Option<&Path>,
        env: Option<&[(String, String)]>,
        command: &[String],
    ) -> Result<Vec<u8>, LaunchError> {
        let line = command.join(" ");
        let Some(expected) = self.take_match(dir, env, &line) else {
            return Ok(Vec::new());
        };

        if let Some(hook) = &expected.hook {
            hook(command);
        }

        match expected.error {
            Some(error) => Err(error),
            None => Ok(expected.output),
        }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn output(&self, dir: Option<&Path>, command: &[String]) -> Result<Vec<u8>, LaunchError> {
        self.run(dir, None, command)
    }

    async fn output_with_env(
        &self,
        dir: Option<&Path>,
        env: &[(String, String)],
        command: &[String],
    ) -> Result<Vec<u8>, LaunchError> {
        self.run(dir, Some(env), command)
    }
}
