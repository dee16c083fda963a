//! Captured output accumulated across failed launches.

/// Fallback transcript when nothing was captured.
const EMPTY_TRANSCRIPT: &str = "no output was captured from the toolchain";

/// Ordered outputs of every failed attempt in one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedFailure {
    outputs: Vec<String>,
}

impl CapturedFailure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the output of one failed attempt.
    pub fn record(&mut self, output: impl Into<String>) {
        self.outputs.push(output.into());
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// All outputs joined with newlines.
    pub fn transcript(&self) -> String {
        self.outputs.join("\n")
    }

    /// Like [`CapturedFailure::transcript`], but never empty.
    pub fn diagnostic_message(&self) -> String {
        let transcript = self.transcript();
        if transcript.trim().is_empty() {
            EMPTY_TRANSCRIPT.to_string()
        } else {
            transcript
        }
    }
}
