//! Repeated command execution with short-circuit on failure.

use crate::command::CommandSpec;
use crate::error::{BuildError, Result};
use crate::executor::{CommandExecutor, Invocation};
use crate::workspace::Workspace;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of running a command spec to completion or first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Program name from the template.
    pub program: String,

    /// Whether every required run succeeded.
    pub success: bool,

    /// Captured output of the failing attempt, or of the last attempt on
    /// success. Never empty when `success` is false.
    pub output: String,

    /// Exit code of the last attempt, if it exited normally.
    pub exit_code: Option<i32>,

    /// Number of launches made.
    pub attempts: u32,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutcome {
    /// Whether this outcome passed.
    pub fn passed(&self) -> bool {
        self.success
    }
}

/// Runs a [`CommandSpec`] its required number of times inside a workspace.
#[derive(Clone)]
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
    timeout: Option<Duration>,
    install_url: String,
    verbose: bool,
}

impl CommandRunner {
    /// Create a runner over `executor`.
    pub fn new(executor: Arc<dyn CommandExecutor>, install_url: impl Into<String>) -> Self {
        Self {
            executor,
            timeout: None,
            install_url: install_url.into(),
            verbose: false,
        }
    }

    /// Bound every launch by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Log each launch's captured output at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run `spec` up to `spec.repeat()` times against `working_file`.
    ///
    /// The program is resolved once, before any launch; a missing program is
    /// reported as [`BuildError::ToolNotFound`]. The first failing launch ends
    /// the sequence and its output alone is returned.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        workspace: &Workspace,
        working_file: &str,
    ) -> Result<CommandOutcome> {
        let program = spec.program().to_string();
        let resolved = self
            .executor
            .resolve(&program, workspace.path())
            .ok_or_else(|| BuildError::ToolNotFound {
                tool: program.clone(),
                guidance: self.install_url.clone(),
                captured: None,
            })?;

        let filename = spec.file_argument(working_file);
        let count = spec.repeat();
        let times = if count == 1 { "time" } else { "times" };
        info!(
            "Running {} {} {}: {:?}",
            program,
            count,
            times,
            spec.template.render(&filename)
        );

        let invocation = Invocation {
            program: resolved,
            args: spec.template.render_args(&filename),
            working_dir: workspace.path().to_path_buf(),
            env: workspace.env().to_vec(),
            timeout: self.timeout,
        };

        let mut outcome = CommandOutcome {
            program: program.clone(),
            success: true,
            output: String::new(),
            exit_code: None,
            attempts: 0,
            duration_ms: 0,
        };

        for attempt in 1..=count {
            let result = self.executor.execute(&invocation).await;
            outcome.attempts = attempt;
            outcome.duration_ms += result.duration_ms;
            outcome.exit_code = result.exit_code;
            outcome.output = result.output;

            if self.verbose {
                info!(program = %program, attempt, "{}", outcome.output);
            }

            if !result.success {
                debug!(
                    program = %program,
                    attempt,
                    exit_code = ?outcome.exit_code,
                    "Command failed, skipping remaining runs"
                );
                outcome.success = false;
                if outcome.output.trim().is_empty() {
                    outcome.output = match outcome.exit_code {
                        Some(code) => format!("{} exited with code {} and no output", program, code),
                        None => format!("{} terminated without an exit code", program),
                    };
                }
                break;
            }
        }

        Ok(outcome)
    }
}
