//! Compiler configuration.
//!
//! Loaded from a TOML file (`texbuild.toml`); every field has a default so an
//! empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{CommandSpec, CommandTemplate};
use crate::error::{BuildError, Result};

/// Conventional configuration file name.
pub const CONFIG_FILE_NAME: &str = "texbuild.toml";

/// Where to send people whose TeX installation is missing.
pub const DEFAULT_INSTALL_URL: &str =
    "https://nbconvert.readthedocs.io/en/latest/install.html#installing-tex";

/// Toolchain and pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Command used to compile the document.
    pub latex_command: CommandTemplate,

    /// Command used to resolve bibliography references.
    pub bib_command: CommandTemplate,

    /// How many times the compile command runs per compile pass.
    pub latex_count: u32,

    /// Byproduct extensions removed after a successful build.
    pub temp_file_exts: Vec<String>,

    /// Log the captured output of every launch.
    pub verbose: bool,

    /// Environment variable carrying the include search path.
    pub search_path_var: String,

    /// Extension of the produced artifact, leading dot included.
    pub output_extension: String,

    /// Per-launch timeout in seconds (0 = none).
    pub timeout_secs: u64,

    /// Installation instructions link shown when a tool is missing.
    pub install_url: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            latex_command: CommandTemplate::builtin(&["xelatex", "{filename}"]),
            bib_command: CommandTemplate::builtin(&["bibtex", "{filename}"]),
            latex_count: 3,
            temp_file_exts: [".aux", ".bbl", ".blg", ".idx", ".log", ".out"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            verbose: false,
            search_path_var: "TEXINPUTS".to_string(),
            output_extension: ".pdf".to_string(),
            timeout_secs: 0,
            install_url: DEFAULT_INSTALL_URL.to_string(),
        }
    }
}

impl CompilerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CompilerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.latex_count == 0 {
            return Err(BuildError::InvalidConfig(
                "latex_count must be at least 1".to_string(),
            ));
        }
        if self.search_path_var.is_empty() || self.search_path_var.contains('=') {
            return Err(BuildError::InvalidConfig(format!(
                "invalid search_path_var '{}'",
                self.search_path_var
            )));
        }
        if !self.output_extension.starts_with('.') {
            return Err(BuildError::InvalidConfig(format!(
                "output_extension '{}' must start with '.'",
                self.output_extension
            )));
        }
        Ok(())
    }

    /// Per-launch timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Compile pass spec with `repeat` runs.
    pub fn latex_spec(&self, repeat: u32) -> Result<CommandSpec> {
        CommandSpec::hard(self.latex_command.clone(), repeat)
    }

    /// Bibliography pass spec (single soft run on the file stem).
    pub fn bib_spec(&self) -> CommandSpec {
        CommandSpec::soft_stem(self.bib_command.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.latex_command.program(), "xelatex");
        assert_eq!(config.bib_command.program(), "bibtex");
        assert_eq!(config.latex_count, 3);
        assert_eq!(config.search_path_var, "TEXINPUTS");
        assert_eq!(config.output_extension, ".pdf");
        assert!(config.temp_file_exts.contains(&".aux".to_string()));
        assert!(config.timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = CompilerConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = CompilerConfig::from_toml_str(
            r#"
latex_command = ["pdflatex", "-interaction=nonstopmode", "{filename}"]
latex_count = 2
timeout_secs = 120
"#,
        )
        .unwrap();

        assert_eq!(config.latex_command.program(), "pdflatex");
        assert_eq!(config.latex_count, 2);
        assert_eq!(config.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.bib_command.program(), "bibtex");
    }

    #[test]
    fn test_invalid_template_in_toml() {
        let err = CompilerConfig::from_toml_str(r#"latex_command = ["xelatex"]"#).unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_zero_latex_count_rejected() {
        let err = CompilerConfig::from_toml_str("latex_count = 0").unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_output_extension_rejected() {
        assert!(CompilerConfig::from_toml_str(r#"output_extension = "pdf""#).is_err());
    }

    #[test]
    fn test_toml_roundtrip_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let original = CompilerConfig {
            verbose: true,
            ..CompilerConfig::default()
        };
        std::fs::write(&path, original.to_toml_string().unwrap()).unwrap();

        let loaded = CompilerConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_specs_from_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.latex_spec(3).unwrap().repeat(), 3);
        assert!(config.latex_spec(0).is_err());
        assert_eq!(config.bib_spec().repeat(), 1);
    }
}
