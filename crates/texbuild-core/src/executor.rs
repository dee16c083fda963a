//! Process execution seam.
//!
//! [`CommandExecutor`] separates "how a program is found and spawned" from the
//! pass logic in [`crate::runner`]. [`ProcessExecutor`] is the real thing;
//! tests substitute [`crate::fakes::ScriptedExecutor`].

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// One fully-resolved process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Resolved program path.
    pub program: PathBuf,

    /// Arguments after the program, placeholder already substituted.
    pub args: Vec<String>,

    /// Directory the child runs in.
    pub working_dir: PathBuf,

    /// Extra environment for the child only.
    pub env: Vec<(OsString, OsString)>,

    /// Wall-clock limit for this single launch.
    pub timeout: Option<Duration>,
}

/// What a single launch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Whether the process exited with status 0.
    pub success: bool,

    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,

    /// stdout and stderr, interleaved as written.
    pub output: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ExecutionOutput {
    /// A failed launch that never produced an exit status.
    pub fn failed(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            exit_code: None,
            output: message.into(),
            duration_ms,
        }
    }
}

/// Resolves and launches external programs.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Locate `program` on the executable search path. `None` means the tool
    /// is not installed, which callers treat differently from a failed run.
    fn resolve(&self, program: &str, working_dir: &Path) -> Option<PathBuf>;

    /// Launch once and wait for completion.
    async fn execute(&self, invocation: &Invocation) -> ExecutionOutput;
}

/// Spawns real child processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    search_path: Option<OsString>,
}

impl ProcessExecutor {
    /// Resolve programs against the host `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve programs against `search_path` instead of the host `PATH`.
    ///
    /// The child still receives the host `PATH`; only lookup is affected.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    fn lookup_path(&self) -> Option<OsString> {
        self.search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    fn resolve(&self, program: &str, working_dir: &Path) -> Option<PathBuf> {
        which::which_in(program, self.lookup_path(), working_dir).ok()
    }

    async fn execute(&self, invocation: &Invocation) -> ExecutionOutput {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        // Both streams share one file so the capture keeps the tool's ordering.
        let capture = match tempfile::tempfile() {
            Ok(file) => file,
            Err(e) => {
                return ExecutionOutput::failed(
                    format!("could not create capture file: {}", e),
                    elapsed(start),
                )
            }
        };
        let (stdout, stderr) = match (capture.try_clone(), capture.try_clone()) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                return ExecutionOutput::failed(
                    format!("could not share capture file: {}", e),
                    elapsed(start),
                )
            }
        };

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutput::failed(
                    format!("{} could not be started: {}", display(&invocation.program), e),
                    elapsed(start),
                )
            }
        };

        let waited = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status),
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        debug!("failed to kill timed out process: {}", e);
                    }
                    None
                }
            },
            None => Some(child.wait().await),
        };

        let mut output = read_capture(capture);
        let duration_ms = elapsed(start);

        match waited {
            Some(Ok(status)) => ExecutionOutput {
                success: status.success(),
                exit_code: status.code(),
                output,
                duration_ms,
            },
            Some(Err(e)) => {
                output.push_str(&format!("\nwaiting for process failed: {}", e));
                ExecutionOutput::failed(output, duration_ms)
            }
            None => {
                let limit = invocation.timeout.unwrap_or_default();
                output.push_str(&format!(
                    "\n{} timed out after {} seconds",
                    display(&invocation.program),
                    limit.as_secs()
                ));
                ExecutionOutput::failed(output, duration_ms)
            }
        }
    }
}

fn read_capture(mut file: std::fs::File) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = file
        .seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
    {
        debug!("failed to read captured output: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn display(program: &Path) -> String {
    program
        .file_name()
        .unwrap_or_else(|| OsStr::new(""))
        .to_string_lossy()
        .into_owned()
}
