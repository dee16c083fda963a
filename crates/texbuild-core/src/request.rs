//! Compilation request and result types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BuildError, Result};
use crate::orchestrator::{Diagnostic, PassReport};

/// Caller metadata carried through the build (a JSON object).
pub type Resources = serde_json::Map<String, Value>;

/// Resource key rewritten to the artifact extension.
pub const OUTPUT_EXTENSION_KEY: &str = "output_extension";

/// Resource key marking a multi-file export; removed from results.
pub const OUTPUTS_KEY: &str = "outputs";

/// Default working file base name.
pub const DEFAULT_BASE_NAME: &str = "notebook";

/// Extension of the materialized source file.
pub const SOURCE_EXTENSION: &str = ".tex";

/// Repeat counts for the two compile passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassConfig {
    /// Runs in the first compile pass.
    pub primary: u32,

    /// Runs in the compile pass after bibliography resolution.
    #[serde(rename = "final")]
    pub final_pass: u32,
}

impl PassConfig {
    /// Same repeat count for both compile passes.
    pub fn uniform(count: u32) -> Self {
        Self {
            primary: count,
            final_pass: count,
        }
    }
}

impl Default for PassConfig {
    fn default() -> Self {
        Self::uniform(3)
    }
}

/// Everything needed to build one document.
#[derive(Debug, Clone, Default)]
pub struct CompilationRequest {
    /// Markup source text.
    pub source: String,

    /// Working file base name, without extension.
    pub base_name: String,

    /// Explicit include search path prefix.
    pub search_path: Option<PathBuf>,

    /// Repeat counts; `None` uses the configured `latex_count`.
    pub passes: Option<PassConfig>,

    /// Caller metadata, returned rewritten in the result.
    pub resources: Resources,

    /// Extra files (figures, styles) written next to the source.
    pub support_files: BTreeMap<String, Vec<u8>>,
}

impl CompilationRequest {
    /// A request for `source` with default settings.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            base_name: DEFAULT_BASE_NAME.to_string(),
            ..Self::default()
        }
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = base_name.into();
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn with_passes(mut self, passes: PassConfig) -> Self {
        self.passes = Some(passes);
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_support_file(mut self, name: impl Into<String>, contents: Vec<u8>) -> Self {
        self.support_files.insert(name.into(), contents);
        self
    }

    /// Name of the source file inside the workspace.
    pub fn working_file(&self) -> String {
        format!("{}{}", self.base_name, SOURCE_EXTENSION)
    }

    /// Name of the artifact inside the workspace.
    pub fn artifact_file(&self, output_extension: &str) -> String {
        format!("{}{}", self.base_name, output_extension)
    }

    /// Include search path prefix: the explicit hint, else `metadata.path`
    /// from the resources, else the current directory.
    ///
    /// Children run inside the workspace, so a relative hint is resolved
    /// against the caller's current directory.
    pub fn search_path_hint(&self) -> Result<PathBuf> {
        let from_metadata = self
            .resources
            .get("metadata")
            .and_then(|metadata| metadata.get("path"))
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        match self.search_path.clone().or(from_metadata) {
            Some(path) if path.is_relative() => Ok(std::env::current_dir()?.join(path)),
            Some(path) => Ok(path),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Reject requests that cannot produce a well-formed working file.
    pub fn validate(&self) -> Result<()> {
        let base = self.base_name.as_str();
        if base.is_empty() || base == "." || base == ".." || base.contains(['/', '\\']) {
            return Err(BuildError::InvalidConfig(format!(
                "invalid working file base name '{}'",
                base
            )));
        }
        let working_file = self.working_file();
        if self
            .support_files
            .keys()
            .any(|name| name.trim_start_matches("./") == working_file)
        {
            return Err(BuildError::InvalidConfig(format!(
                "support file '{}' would overwrite the source",
                working_file
            )));
        }
        if let Some(passes) = self.passes {
            if passes.primary == 0 || passes.final_pass == 0 {
                return Err(BuildError::InvalidConfig(
                    "pass repeat counts must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A successfully built document.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// Artifact bytes.
    pub artifact: Vec<u8>,

    /// Caller metadata with the output extension rewritten and the
    /// multi-file marker removed.
    pub resources: Resources,

    /// Soft failures recorded along the way.
    pub diagnostics: Vec<Diagnostic>,

    /// One report per pass that ran.
    pub passes: Vec<PassReport>,

    /// Temporary byproducts removed before the workspace was released.
    pub cleaned_files: usize,
}

impl CompilationResult {
    /// Number of passes that passed.
    pub fn passed_count(&self) -> usize {
        self.passes.iter().filter(|p| p.success).count()
    }

    /// Number of passes that failed (soft failures only on a successful build).
    pub fn failed_count(&self) -> usize {
        self.passes.iter().filter(|p| !p.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_request_defaults() {
        let request = CompilationRequest::new("X");
        assert_eq!(request.source, "X");
        assert_eq!(request.working_file(), "notebook.tex");
        assert_eq!(request.artifact_file(".pdf"), "notebook.pdf");
        assert!(request.passes.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_search_path_prefers_explicit_hint() {
        let mut resources = Resources::new();
        resources.insert("metadata".to_string(), json!({ "path": "/from/metadata" }));
        let request = CompilationRequest::new("X")
            .with_resources(resources)
            .with_search_path("/explicit");
        assert_eq!(request.search_path_hint().unwrap(), PathBuf::from("/explicit"));
    }

    #[test]
    fn test_search_path_from_metadata() {
        let mut resources = Resources::new();
        resources.insert("metadata".to_string(), json!({ "path": "/from/metadata" }));
        let request = CompilationRequest::new("X").with_resources(resources);
        assert_eq!(
            request.search_path_hint().unwrap(),
            PathBuf::from("/from/metadata")
        );
    }

    #[test]
    fn test_search_path_defaults_to_current_dir() {
        let mut resources = Resources::new();
        resources.insert("metadata".to_string(), json!({ "path": "" }));
        let request = CompilationRequest::new("X").with_resources(resources);
        assert_eq!(
            request.search_path_hint().unwrap(),
            std::env::current_dir().unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_bad_base_name() {
        assert!(CompilationRequest::new("X").with_base_name("").validate().is_err());
        assert!(CompilationRequest::new("X")
            .with_base_name("../up")
            .validate()
            .is_err());
    }

    #[test]
    fn test_relative_search_path_resolved_against_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        let request = CompilationRequest::new("X").with_search_path("figs");
        assert_eq!(request.search_path_hint().unwrap(), cwd.join("figs"));

        let mut resources = Resources::new();
        resources.insert("metadata".to_string(), json!({ "path": "notebooks/ch1" }));
        let request = CompilationRequest::new("X").with_resources(resources);
        assert_eq!(
            request.search_path_hint().unwrap(),
            cwd.join("notebooks/ch1")
        );
    }

    #[test]
    fn test_validate_rejects_support_file_shadowing_source() {
        let request = CompilationRequest::new("X")
            .with_base_name("doc")
            .with_support_file("doc.tex", b"other".to_vec());
        assert!(matches!(
            request.validate(),
            Err(BuildError::InvalidConfig(_))
        ));
        assert!(CompilationRequest::new("X")
            .with_support_file("./notebook.tex", b"other".to_vec())
            .validate()
            .is_err());

        let request = CompilationRequest::new("X")
            .with_base_name("doc")
            .with_support_file("refs.bib", b"@book{}".to_vec());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_passes() {
        let request = CompilationRequest::new("X").with_passes(PassConfig {
            primary: 0,
            final_pass: 3,
        });
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_pass_config_serde_names() {
        let passes: PassConfig = serde_json::from_value(json!({ "primary": 2, "final": 4 })).unwrap();
        assert_eq!(passes.primary, 2);
        assert_eq!(passes.final_pass, 4);
    }
}
