//! Scoped build workspace.
//!
//! A [`Workspace`] owns a fresh temporary directory and the child-process
//! environment for one compilation. Every command and file path is resolved
//! against [`Workspace::path`]; the host's working directory and environment
//! are never touched. The directory is removed when the workspace is released
//! or dropped, so early returns and panics clean up too.

use crate::error::{BuildError, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Prefix for workspace directory names.
const WORKSPACE_PREFIX: &str = "texbuild-";

/// Ephemeral directory plus the environment handed to every child process.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    env: Vec<(OsString, OsString)>,
}

impl Workspace {
    /// Create a workspace whose `search_path_var` is `search_hint` prepended
    /// to the host's current value of that variable.
    pub fn acquire(search_path_var: &str, search_hint: &Path) -> Result<Self> {
        let prior = std::env::var_os(search_path_var).unwrap_or_default();
        Self::acquire_with_prior(search_path_var, search_hint, &prior)
    }

    /// Like [`Workspace::acquire`] with an explicit prior value, so callers
    /// never need to read or write the shared process environment.
    pub fn acquire_with_prior(
        search_path_var: &str,
        search_hint: &Path,
        prior: &OsStr,
    ) -> Result<Self> {
        let value = augmented_search_path(search_hint, prior)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(|e| BuildError::Workspace(format!("could not create directory: {}", e)))?;

        debug!(dir = %dir.path().display(), "Acquired workspace");
        Ok(Self {
            dir,
            env: vec![(OsString::from(search_path_var), value)],
        })
    }

    /// The workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Environment overrides for child processes.
    pub fn env(&self) -> &[(OsString, OsString)] {
        &self.env
    }

    /// Value of an environment override, if set.
    pub fn env_value(&self, key: &str) -> Option<&OsStr> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Resolve a relative name inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file inside the workspace. `name` must be a plain relative
    /// path that stays inside the directory.
    pub async fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let relative = Path::new(name);
        let contained = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(BuildError::Workspace(format!(
                "refusing to write '{}' outside the workspace",
                name
            )));
        }

        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Remove the directory now, logging instead of failing.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(dir = %path.display(), "Released workspace"),
            Err(e) => debug!(dir = %path.display(), "Workspace removal failed: {}", e),
        }
    }
}

/// Join `[hint, prior]` with the platform path-list separator.
///
/// An empty `prior` still yields a trailing separator; TeX reads the empty
/// entry as "the default search path".
pub fn augmented_search_path(hint: &Path, prior: &OsStr) -> Result<OsString> {
    std::env::join_paths([hint.as_os_str(), prior]).map_err(|e| {
        BuildError::Workspace(format!(
            "search path hint {:?} cannot be joined: {}",
            hint, e
        ))
    })
}
