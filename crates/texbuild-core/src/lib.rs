//! texbuild core - multi-pass LaTeX compilation engine
//!
//! Turns generated LaTeX source into a PDF by driving an external TeX
//! toolchain:
//! - Runs the compiler several times, then bibtex, then the compiler again
//! - Treats compiler failures as fatal and bibliography failures as diagnostics
//! - Builds inside a scoped temporary workspace that is always removed
//!
//! ```no_run
//! use texbuild_core::{CompilationOrchestrator, CompilationRequest, CompilerConfig};
//!
//! # async fn build() -> texbuild_core::Result<()> {
//! let orchestrator = CompilationOrchestrator::new(CompilerConfig::default())?;
//! let result = orchestrator
//!     .compile(CompilationRequest::new("\\documentclass{article}..."))
//!     .await?;
//! std::fs::write("notebook.pdf", &result.artifact)?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod cleanup;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod finalize;
pub mod orchestrator;
pub mod request;
pub mod runner;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use capture::CapturedFailure;
pub use cleanup::TempArtifactCleaner;
pub use command::{CommandSpec, CommandTemplate, FileArg, Severity, FILENAME_PLACEHOLDER};
pub use config::{CompilerConfig, CONFIG_FILE_NAME};
pub use error::{BuildError, Result};
pub use executor::{CommandExecutor, ExecutionOutput, Invocation, ProcessExecutor};
pub use finalize::ArtifactFinalizer;
pub use orchestrator::{CompilationOrchestrator, Diagnostic, PassKind, PassReport, SoftFailureKind};
pub use request::{CompilationRequest, CompilationResult, PassConfig, Resources};
pub use runner::{CommandOutcome, CommandRunner};
pub use telemetry::init_tracing;
pub use workspace::Workspace;

/// texbuild version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
