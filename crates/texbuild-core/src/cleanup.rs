//! Best-effort removal of toolchain byproducts.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

/// Deletes `<base><ext>` for each configured extension.
pub struct TempArtifactCleaner;

impl TempArtifactCleaner {
    /// Remove byproducts of `base` (a path without extension).
    ///
    /// Missing files are skipped silently; any other failure is logged at
    /// debug level. Returns how many files were removed.
    pub fn clean(base: &Path, extensions: &[String]) -> usize {
        info!("Removing temporary LaTeX files");
        let mut removed = 0;
        for ext in extensions {
            let mut target = base.as_os_str().to_os_string();
            target.push(ext);
            let target = Path::new(&target);

            match std::fs::remove_file(target) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => debug!(file = %target.display(), "Could not remove: {}", e),
            }
        }
        removed
    }
}
