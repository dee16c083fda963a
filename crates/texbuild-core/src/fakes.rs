//! In-memory fakes for the executor seam (testing only)
//!
//! `ScriptedExecutor` satisfies [`CommandExecutor`] without spawning anything:
//! each installed program replays a queue of scripted steps and every launch
//! is recorded for later assertions.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::executor::{CommandExecutor, ExecutionOutput, Invocation};

/// Directory reported as the location of every installed fake program.
const FAKE_BIN: &str = "/fake/bin";

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One scripted launch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub exit_code: i32,
    pub output: String,
    /// Files written into the working directory when this step runs.
    pub produces: Vec<(String, Vec<u8>)>,
    /// File that must already exist in the working directory.
    pub requires: Option<String>,
}

impl Step {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
            produces: Vec::new(),
            requires: None,
        }
    }

    pub fn fail(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            produces: Vec::new(),
            requires: None,
        }
    }

    /// Write `name` with `contents` into the working directory on launch.
    /// May be chained to produce several files.
    pub fn producing(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.produces.push((name.into(), contents.into()));
        self
    }

    /// Fail with exit code 1 unless `name` exists in the working directory.
    pub fn requiring(mut self, name: impl Into<String>) -> Self {
        self.requires = Some(name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Program {
    steps: VecDeque<Step>,
    fallback: Option<Step>,
}

/// Executor that replays scripted steps per program.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    programs: Mutex<HashMap<String, Program>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `program` resolvable and queue `steps` for its launches.
    /// Once the queue is empty, launches succeed with no output.
    pub fn install(&self, program: &str, steps: Vec<Step>) {
        let mut programs = self.programs.lock().unwrap();
        let entry = programs.entry(program.to_string()).or_default();
        entry.steps.extend(steps);
    }

    /// Make `program` resolvable and answer every launch with `step`.
    pub fn install_always(&self, program: &str, step: Step) {
        let mut programs = self.programs.lock().unwrap();
        let entry = programs.entry(program.to_string()).or_default();
        entry.fallback = Some(step);
    }

    /// Every launch so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of launches of `program`.
    pub fn invocation_count(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| program_name(&call.program) == program)
            .count()
    }

    fn next_step(&self, program: &str) -> Step {
        let mut programs = self.programs.lock().unwrap();
        match programs.get_mut(program) {
            Some(entry) => entry
                .steps
                .pop_front()
                .or_else(|| entry.fallback.clone())
                .unwrap_or_else(|| Step::ok("")),
            None => Step::fail(127, format!("{}: command not found", program)),
        }
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    fn resolve(&self, program: &str, _working_dir: &Path) -> Option<PathBuf> {
        let programs = self.programs.lock().unwrap();
        programs
            .contains_key(program)
            .then(|| Path::new(FAKE_BIN).join(program))
    }

    async fn execute(&self, invocation: &Invocation) -> ExecutionOutput {
        self.calls.lock().unwrap().push(invocation.clone());

        let step = self.next_step(&program_name(&invocation.program));
        if let Some(name) = &step.requires {
            if !invocation.working_dir.join(name).exists() {
                return ExecutionOutput {
                    success: false,
                    exit_code: Some(1),
                    output: format!("! LaTeX Error: File `{}' not found.", name),
                    duration_ms: 0,
                };
            }
        }
        for (name, contents) in &step.produces {
            if let Err(e) = std::fs::write(invocation.working_dir.join(name), contents) {
                return ExecutionOutput::failed(format!("fake could not write {}: {}", name, e), 0);
            }
        }

        ExecutionOutput {
            success: step.exit_code == 0,
            exit_code: Some(step.exit_code),
            output: step.output,
            duration_ms: 0,
        }
    }
}

fn program_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(program: &str, dir: &Path) -> Invocation {
        Invocation {
            program: Path::new(FAKE_BIN).join(program),
            args: vec![],
            working_dir: dir.to_path_buf(),
            env: vec![],
            timeout: None,
        }
    }

    #[test]
    fn test_uninstalled_program_does_not_resolve() {
        let executor = ScriptedExecutor::new();
        assert!(executor.resolve("bibtex", Path::new(".")).is_none());
        executor.install("bibtex", vec![]);
        assert!(executor.resolve("bibtex", Path::new(".")).is_some());
    }

    #[tokio::test]
    async fn test_steps_replay_in_order_then_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new();
        executor.install("xelatex", vec![Step::fail(1, "first")]);
        executor.install_always("xelatex", Step::ok("later"));

        let first = executor.execute(&invocation("xelatex", dir.path())).await;
        let second = executor.execute(&invocation("xelatex", dir.path())).await;

        assert!(!first.success);
        assert_eq!(first.output, "first");
        assert!(second.success);
        assert_eq!(second.output, "later");
        assert_eq!(executor.invocation_count("xelatex"), 2);
    }

    #[tokio::test]
    async fn test_step_produces_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new();
        executor.install(
            "xelatex",
            vec![Step::ok("")
                .producing("notebook.pdf", b"%PDF".to_vec())
                .producing("notebook.aux", b"aux".to_vec())],
        );

        executor.execute(&invocation("xelatex", dir.path())).await;
        assert_eq!(std::fs::read(dir.path().join("notebook.pdf")).unwrap(), b"%PDF");
        assert!(dir.path().join("notebook.aux").exists());
    }
}
