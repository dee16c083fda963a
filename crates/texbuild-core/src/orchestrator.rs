//! Multi-pass compilation orchestration.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::capture::CapturedFailure;
use crate::cleanup::TempArtifactCleaner;
use crate::command::{CommandSpec, Severity};
use crate::config::CompilerConfig;
use crate::error::{BuildError, Result};
use crate::executor::{CommandExecutor, ProcessExecutor};
use crate::finalize::ArtifactFinalizer;
use crate::request::{CompilationRequest, CompilationResult, PassConfig};
use crate::runner::{CommandOutcome, CommandRunner};
use crate::workspace::Workspace;

/// The three passes, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// First compile.
    Primary,
    /// Bibliography resolution.
    CrossReference,
    /// Recompile with resolved references.
    Final,
}

impl PassKind {
    pub fn name(&self) -> &'static str {
        match self {
            PassKind::Primary => "primary",
            PassKind::CrossReference => "cross_reference",
            PassKind::Final => "final",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a soft pass did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftFailureKind {
    /// The tool is not installed.
    ToolMissing,
    /// The tool ran and failed.
    NonZeroExit { exit_code: Option<i32> },
}

/// A soft failure recorded during a successful or failed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub pass: PassKind,
    pub tool: String,
    #[serde(flatten)]
    pub kind: SoftFailureKind,
    pub message: String,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: PassKind,
    pub tool: String,
    pub attempts: u32,
    pub success: bool,
    pub duration_ms: u64,
}

impl PassReport {
    fn from_outcome(pass: PassKind, outcome: &CommandOutcome) -> Self {
        Self {
            pass,
            tool: outcome.program.clone(),
            attempts: outcome.attempts,
            success: outcome.success,
            duration_ms: outcome.duration_ms,
        }
    }
}

/// Per-request mutable state. Created by `compile` and dropped when it returns.
#[derive(Default)]
struct BuildState {
    captured: CapturedFailure,
    diagnostics: Vec<Diagnostic>,
    reports: Vec<PassReport>,
}

/// Drives compile → bibliography → compile inside a scoped workspace.
pub struct CompilationOrchestrator {
    config: CompilerConfig,
    runner: CommandRunner,
}

impl CompilationOrchestrator {
    /// Orchestrator spawning real processes.
    pub fn new(config: CompilerConfig) -> Result<Self> {
        Self::with_executor(config, Arc::new(ProcessExecutor::new()))
    }

    /// Orchestrator over a custom executor.
    pub fn with_executor(
        config: CompilerConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let runner = CommandRunner::new(executor, config.install_url.clone())
            .with_timeout(config.timeout())
            .with_verbose(config.verbose);
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Build `request` into an artifact.
    ///
    /// The workspace is removed before this returns, whatever the outcome.
    pub async fn compile(&self, request: CompilationRequest) -> Result<CompilationResult> {
        request.validate()?;
        let passes = request
            .passes
            .unwrap_or_else(|| PassConfig::uniform(self.config.latex_count));
        let primary = self.config.latex_spec(passes.primary)?;
        let bib = self.config.bib_spec();
        let final_spec = self.config.latex_spec(passes.final_pass)?;

        let hint = request.search_path_hint()?;
        let workspace = Workspace::acquire(&self.config.search_path_var, &hint)?;

        let start = Instant::now();
        let result = self
            .build_in(&workspace, request, [&primary, &bib, &final_spec])
            .await;
        workspace.release();

        match &result {
            Ok(built) => info!(
                duration_ms = start.elapsed().as_millis() as u64,
                soft_failures = built.diagnostics.len(),
                "Compilation completed successfully"
            ),
            Err(e) => error!(
                duration_ms = start.elapsed().as_millis() as u64,
                "Compilation failed: {}",
                first_line(&e.to_string())
            ),
        }
        result
    }

    async fn build_in(
        &self,
        workspace: &Workspace,
        request: CompilationRequest,
        [primary, bib, final_spec]: [&CommandSpec; 3],
    ) -> Result<CompilationResult> {
        let mut state = BuildState::default();
        let working_file = request.working_file();

        workspace
            .write_file(&working_file, request.source.as_bytes())
            .await?;
        for (name, contents) in &request.support_files {
            workspace.write_file(name, contents).await?;
        }

        info!("Building PDF");
        let passes = [
            (PassKind::Primary, primary),
            (PassKind::CrossReference, bib),
            (PassKind::Final, final_spec),
        ];
        for (pass, spec) in passes {
            self.run_pass(pass, spec, workspace, &working_file, &mut state)
                .await?;
        }

        let extension = &self.config.output_extension;
        let artifact_path = workspace.join(request.artifact_file(extension));
        let artifact = ArtifactFinalizer::finalize(&artifact_path, &state.captured).await?;

        let cleaned_files = TempArtifactCleaner::clean(
            &workspace.join(&request.base_name),
            &self.config.temp_file_exts,
        );

        Ok(CompilationResult {
            artifact,
            resources: ArtifactFinalizer::rewrite_resources(request.resources, extension),
            diagnostics: state.diagnostics,
            passes: state.reports,
            cleaned_files,
        })
    }

    /// Run one pass under the failure policy of its spec.
    async fn run_pass(
        &self,
        pass: PassKind,
        spec: &CommandSpec,
        workspace: &Workspace,
        working_file: &str,
        state: &mut BuildState,
    ) -> Result<()> {
        match spec.severity {
            Severity::Hard => {
                self.run_hard(pass, spec, workspace, working_file, state)
                    .await
            }
            Severity::Soft => {
                self.run_soft(pass, spec, workspace, working_file, state)
                    .await;
                Ok(())
            }
        }
    }

    /// A failing hard pass ends the build with everything captured so far.
    async fn run_hard(
        &self,
        pass: PassKind,
        spec: &CommandSpec,
        workspace: &Workspace,
        working_file: &str,
        state: &mut BuildState,
    ) -> Result<()> {
        info!(pass = %pass, "Executing pass");
        let outcome = match self.runner.run(spec, workspace, working_file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(pass = %pass, "{}", e);
                if !state.captured.is_empty() {
                    error!(
                        pass = %pass,
                        "Captured output so far:\n{}",
                        state.captured.transcript()
                    );
                }
                return Err(e.with_captured(state.captured.transcript()));
            }
        };
        state.reports.push(PassReport::from_outcome(pass, &outcome));

        if outcome.passed() {
            return Ok(());
        }

        error!(
            pass = %pass,
            "{} failed: {:?}\n{}",
            outcome.program,
            spec.template.render(&spec.file_argument(working_file)),
            outcome.output
        );
        state.captured.record(outcome.output);
        Err(BuildError::build_failed(state.captured.diagnostic_message()))
    }

    /// A failing soft pass is recorded and the build continues.
    async fn run_soft(
        &self,
        pass: PassKind,
        spec: &CommandSpec,
        workspace: &Workspace,
        working_file: &str,
        state: &mut BuildState,
    ) {
        info!(pass = %pass, "Executing pass");
        let tool = spec.program().to_string();

        let outcome = match self.runner.run(spec, workspace, working_file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(pass = %pass, "{} is not available, skipping", tool);
                state.reports.push(PassReport {
                    pass,
                    tool: tool.clone(),
                    attempts: 0,
                    success: false,
                    duration_ms: 0,
                });
                state.diagnostics.push(Diagnostic {
                    pass,
                    tool,
                    kind: SoftFailureKind::ToolMissing,
                    message: e.to_string(),
                });
                return;
            }
        };
        state.reports.push(PassReport::from_outcome(pass, &outcome));

        if outcome.passed() {
            return;
        }

        warn!(
            pass = %pass,
            "{} had problems, most likely because there were no citations",
            tool
        );
        debug!("{} output: {}", tool, outcome.output);
        state.diagnostics.push(Diagnostic {
            pass,
            tool,
            kind: SoftFailureKind::NonZeroExit {
                exit_code: outcome.exit_code,
            },
            message: outcome.output.clone(),
        });
        state.captured.record(outcome.output);
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandTemplate, FileArg};
    use crate::fakes::{ScriptedExecutor, Step};
    use std::ffi::OsStr;

    fn orchestrator(executor: &Arc<ScriptedExecutor>) -> CompilationOrchestrator {
        CompilationOrchestrator::with_executor(CompilerConfig::default(), executor.clone())
            .unwrap()
    }

    fn request() -> CompilationRequest {
        CompilationRequest::new("X").with_search_path(std::env::temp_dir())
    }

    #[test]
    fn test_pass_kind_names() {
        assert_eq!(PassKind::Primary.name(), "primary");
        assert_eq!(PassKind::CrossReference.to_string(), "cross_reference");
        assert_eq!(PassKind::Final.name(), "final");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = CompilerConfig {
            latex_count: 0,
            ..CompilerConfig::default()
        };
        assert!(CompilationOrchestrator::with_executor(config, executor).is_err());
    }

    #[tokio::test]
    async fn test_all_passes_succeed() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.install_always(
            "xelatex",
            Step::ok("Output written on notebook.pdf").producing("notebook.pdf", b"%PDF".to_vec()),
        );
        executor.install("bibtex", vec![]);

        let result = orchestrator(&executor).compile(request()).await.unwrap();

        assert_eq!(result.artifact, b"%PDF");
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.passes.len(), 3);
        assert_eq!(result.passed_count(), 3);
        assert_eq!(executor.invocation_count("xelatex"), 6);
        assert_eq!(executor.invocation_count("bibtex"), 1);
    }

    #[tokio::test]
    async fn test_missing_bibtex_is_soft() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.install_always(
            "xelatex",
            Step::ok("").producing("notebook.pdf", b"%PDF".to_vec()),
        );

        let result = orchestrator(&executor).compile(request()).await.unwrap();

        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, SoftFailureKind::ToolMissing);
        assert_eq!(result.diagnostics[0].pass, PassKind::CrossReference);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(executor.invocation_count("xelatex"), 6);
    }

    #[tokio::test]
    async fn test_missing_compiler_is_tool_not_found() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.install("bibtex", vec![]);

        let err = orchestrator(&executor).compile(request()).await.unwrap_err();

        assert!(err.is_tool_not_found());
        assert_eq!(executor.invocation_count("bibtex"), 0);
    }

    #[tokio::test]
    async fn test_final_pass_failure_includes_soft_output() {
        let executor = Arc::new(ScriptedExecutor::new());
        let mut steps = vec![Step::ok(""); 3];
        steps.push(Step::fail(1, "! Undefined control sequence."));
        executor.install("xelatex", steps);
        executor.install("bibtex", vec![Step::fail(2, "I found no \\citation commands")]);

        let err = orchestrator(&executor).compile(request()).await.unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("I found no \\citation commands\n! Undefined control sequence."));
        assert_eq!(executor.invocation_count("xelatex"), 4);
    }

    #[tokio::test]
    async fn test_support_files_materialized() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.install_always(
            "xelatex",
            Step::ok("")
                .requiring("figures/plot.png")
                .producing("notebook.pdf", b"%PDF".to_vec()),
        );
        executor.install("bibtex", vec![]);

        let req = request().with_support_file("figures/plot.png", b"png".to_vec());
        let result = orchestrator(&executor).compile(req).await.unwrap();
        assert_eq!(result.artifact, b"%PDF");

        let missing = orchestrator(&executor).compile(request()).await.unwrap_err();
        assert!(missing.to_string().contains("figures/plot.png"));
    }

    fn scratch_workspace() -> Workspace {
        Workspace::acquire_with_prior("TEXINPUTS", &std::env::temp_dir(), OsStr::new(""))
            .unwrap()
    }

    #[tokio::test]
    async fn test_spec_severity_decides_failure_policy() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.install_always("xelatex", Step::fail(1, "! Emergency stop."));
        let orchestrator = orchestrator(&executor);
        let workspace = scratch_workspace();
        let template = CommandTemplate::new(["xelatex", "{filename}"]).unwrap();

        // a soft compile pass records the failure and continues
        let soft =
            CommandSpec::new(template.clone(), 1, Severity::Soft, FileArg::FileName).unwrap();
        let mut state = BuildState::default();
        orchestrator
            .run_pass(PassKind::Primary, &soft, &workspace, "notebook.tex", &mut state)
            .await
            .unwrap();
        assert_eq!(state.diagnostics.len(), 1);
        assert_eq!(
            state.diagnostics[0].kind,
            SoftFailureKind::NonZeroExit { exit_code: Some(1) }
        );

        // the same command under a hard spec aborts
        let hard = CommandSpec::hard(template, 1).unwrap();
        let mut state = BuildState::default();
        let err = orchestrator
            .run_pass(PassKind::Primary, &hard, &workspace, "notebook.tex", &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::BuildFailed { .. }));
        assert!(err.to_string().contains("! Emergency stop."));
        assert!(state.diagnostics.is_empty());

        workspace.release();
    }

    #[tokio::test]
    async fn test_missing_final_compiler_keeps_captured_output() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.install("bibtex", vec![Step::fail(2, "I found no \\citation commands")]);
        let orchestrator = orchestrator(&executor);
        let workspace = scratch_workspace();
        let mut state = BuildState::default();

        let bib = orchestrator.config().bib_spec();
        orchestrator
            .run_pass(PassKind::CrossReference, &bib, &workspace, "notebook.tex", &mut state)
            .await
            .unwrap();

        let missing =
            CommandSpec::hard(CommandTemplate::new(["lualatex", "{filename}"]).unwrap(), 1)
                .unwrap();
        let err = orchestrator
            .run_pass(PassKind::Final, &missing, &workspace, "notebook.tex", &mut state)
            .await
            .unwrap_err();

        assert!(err.is_tool_not_found());
        assert_eq!(
            err.captured_output(),
            Some("I found no \\citation commands")
        );

        workspace.release();
    }
}
