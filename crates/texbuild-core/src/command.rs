//! Typed command templates and per-pass command specifications.

use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the working file name at invocation time.
pub const FILENAME_PLACEHOLDER: &str = "{filename}";

/// An ordered argument vector with exactly one `{filename}` placeholder.
///
/// The first element is the program. The placeholder must appear in exactly
/// one of the remaining arguments; this is checked once at construction so
/// rendering can never fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    /// Validate and wrap an argument vector.
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();

        let Some(program) = argv.first() else {
            return Err(BuildError::InvalidTemplate("empty command".to_string()));
        };
        if program.trim().is_empty() {
            return Err(BuildError::InvalidTemplate("empty program name".to_string()));
        }
        if program.contains(FILENAME_PLACEHOLDER) {
            return Err(BuildError::InvalidTemplate(format!(
                "program '{}' may not contain {}",
                program, FILENAME_PLACEHOLDER
            )));
        }

        let occurrences: usize = argv[1..]
            .iter()
            .map(|arg| arg.matches(FILENAME_PLACEHOLDER).count())
            .sum();
        if occurrences != 1 {
            return Err(BuildError::InvalidTemplate(format!(
                "expected exactly one {} placeholder in {:?}, found {}",
                FILENAME_PLACEHOLDER, argv, occurrences
            )));
        }

        Ok(Self { argv })
    }

    /// Built-in templates whose shape is known to be valid.
    pub(crate) fn builtin(argv: &[&str]) -> Self {
        Self {
            argv: argv.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// The program name (first element).
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Substitute the placeholder and return the arguments after the program.
    pub fn render_args(&self, filename: &str) -> Vec<String> {
        self.argv[1..]
            .iter()
            .map(|arg| arg.replace(FILENAME_PLACEHOLDER, filename))
            .collect()
    }

    /// Full rendered command line, program included. Used for logging only.
    pub fn render(&self, filename: &str) -> Vec<String> {
        let mut rendered = vec![self.program().to_string()];
        rendered.extend(self.render_args(filename));
        rendered
    }
}

impl TryFrom<Vec<String>> for CommandTemplate {
    type Error = BuildError;

    fn try_from(argv: Vec<String>) -> Result<Self> {
        CommandTemplate::new(argv)
    }
}

impl From<CommandTemplate> for Vec<String> {
    fn from(template: CommandTemplate) -> Self {
        template.argv
    }
}

/// How a failure of this command affects the build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort the build and surface the captured output.
    Hard,
    /// Record a diagnostic and continue.
    Soft,
}

/// Which form of the working file name replaces the placeholder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileArg {
    /// `notebook.tex`
    FileName,
    /// `notebook` (bibtex expects the stem)
    Stem,
}

/// A command template plus the policy it runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The command to run.
    pub template: CommandTemplate,

    /// Required number of successful runs (always at least 1).
    repeat: u32,

    /// Failure policy.
    pub severity: Severity,

    /// Placeholder form.
    pub file_arg: FileArg,
}

impl CommandSpec {
    /// Create a command spec. Rejects a zero repeat count.
    pub fn new(
        template: CommandTemplate,
        repeat: u32,
        severity: Severity,
        file_arg: FileArg,
    ) -> Result<Self> {
        if repeat == 0 {
            return Err(BuildError::InvalidConfig(format!(
                "repeat count for '{}' must be at least 1",
                template.program()
            )));
        }
        Ok(Self {
            template,
            repeat,
            severity,
            file_arg,
        })
    }

    /// A hard-failing command run against the full file name.
    pub fn hard(template: CommandTemplate, repeat: u32) -> Result<Self> {
        Self::new(template, repeat, Severity::Hard, FileArg::FileName)
    }

    /// A soft-failing command run once against the file stem.
    pub fn soft_stem(template: CommandTemplate) -> Self {
        Self {
            template,
            repeat: 1,
            severity: Severity::Soft,
            file_arg: FileArg::Stem,
        }
    }

    /// Required number of successful runs.
    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    /// Program name of the template.
    pub fn program(&self) -> &str {
        self.template.program()
    }

    /// The placeholder value for `working_file` under this spec's [`FileArg`].
    pub fn file_argument(&self, working_file: &str) -> String {
        match self.file_arg {
            FileArg::FileName => working_file.to_string(),
            FileArg::Stem => std::path::Path::new(working_file)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| working_file.to_string()),
        }
    }
}
