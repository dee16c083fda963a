//! Artifact verification and result metadata rewriting.

use std::path::Path;

use serde_json::Value;
use tracing::{error, info};

use crate::capture::CapturedFailure;
use crate::error::{BuildError, Result};
use crate::request::{Resources, OUTPUTS_KEY, OUTPUT_EXTENSION_KEY};

/// Loads the built artifact once every pass has reported success.
pub struct ArtifactFinalizer;

impl ArtifactFinalizer {
    /// Read `expected` fully into memory.
    ///
    /// Tools can exit 0 without writing anything, so a missing file is a
    /// build failure carrying the whole transcript.
    pub async fn finalize(expected: &Path, captured: &CapturedFailure) -> Result<Vec<u8>> {
        let present = tokio::fs::metadata(expected)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !present {
            error!(artifact = %expected.display(), "Expected artifact was not produced");
            return Err(BuildError::build_failed(captured.diagnostic_message()));
        }

        let bytes = tokio::fs::read(expected).await?;
        info!("PDF successfully created");
        Ok(bytes)
    }

    /// Point the caller's metadata at the single-file artifact.
    pub fn rewrite_resources(mut resources: Resources, output_extension: &str) -> Resources {
        resources.insert(
            OUTPUT_EXTENSION_KEY.to_string(),
            Value::String(output_extension.to_string()),
        );
        resources.remove(OUTPUTS_KEY);
        resources
    }
}
