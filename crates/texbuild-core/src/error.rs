//! Error types for texbuild-core

use thiserror::Error;

/// Errors that can occur while compiling a document
#[derive(Error, Debug)]
pub enum BuildError {
    /// A required tool could not be located on the executable search path
    #[error(
        "{tool} not found on PATH, if you have not installed {tool} you may need to do so. \
         Find further instructions at {guidance}."
    )]
    ToolNotFound {
        tool: String,
        guidance: String,
        /// Output captured from earlier passes of the same build.
        captured: Option<String>,
    },

    /// A hard pass failed or the artifact was never produced
    #[error("PDF creating failed, captured latex output:\n{output}")]
    BuildFailed { output: String },

    /// Command template rejected at construction
    #[error("Invalid command template: {0}")]
    InvalidTemplate(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Workspace could not be prepared
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Config parsing error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildError {
    /// Build a `BuildFailed` error from a newline-joined transcript.
    pub fn build_failed(output: impl Into<String>) -> Self {
        BuildError::BuildFailed {
            output: output.into(),
        }
    }

    /// Attach the transcript of earlier passes to a `ToolNotFound` error.
    /// Other variants and empty transcripts are returned unchanged.
    pub fn with_captured(self, transcript: String) -> Self {
        match self {
            BuildError::ToolNotFound { tool, guidance, .. } if !transcript.is_empty() => {
                BuildError::ToolNotFound {
                    tool,
                    guidance,
                    captured: Some(transcript),
                }
            }
            other => other,
        }
    }

    /// Toolchain output carried by this error, if any.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            BuildError::BuildFailed { output } => Some(output),
            BuildError::ToolNotFound { captured, .. } => captured.as_deref(),
            _ => None,
        }
    }

    /// Whether this error reports a missing tool rather than a failed run.
    pub fn is_tool_not_found(&self) -> bool {
        matches!(self, BuildError::ToolNotFound { .. })
    }
}

/// Result type for texbuild operations
pub type Result<T> = std::result::Result<T, BuildError>;
