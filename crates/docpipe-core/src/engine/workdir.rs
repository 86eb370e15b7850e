use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use super::traits::PathAllocator;
use crate::error::{Error, Result};

/// Request-scoped working directory.
///
/// Every generated path lives inside one temporary directory, named by a
/// random UUID. The directory and everything in it is removed when the
/// `WorkDir` is dropped, so the transport decides when teardown happens.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Create a working directory under the system temp dir.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("docpipe-").tempdir()?;
        debug!("Created working directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create a working directory under `root`, creating `root` if needed.
    pub fn new_in(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            Error::ConfigInvalid {
                field: "work_root".to_string(),
                reason: format!("cannot create {}: {e}", root.display()),
            }
        })?;

        let dir = tempfile::Builder::new()
            .prefix("docpipe-")
            .tempdir_in(root)?;
        debug!("Created working directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copy `source` into the working directory under its own file name.
    ///
    /// Transports use this to stage uploads so that the original file name
    /// survives as the logical name used for batch output naming.
    pub fn import(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| Error::InvalidRequest(format!("'{}' has no file name", source.display())))?;

        let target = self.dir.path().join(name);
        if target.exists() {
            return Err(Error::InvalidRequest(format!(
                "duplicate input file name '{}'",
                name.to_string_lossy()
            )));
        }

        std::fs::copy(source, &target)?;
        Ok(target)
    }
}

impl PathAllocator for WorkDir {
    fn generate_path(&self, extension: &str) -> PathBuf {
        let extension = extension.trim_start_matches('.');
        let name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{extension}", Uuid::new_v4())
        };
        self.dir.path().join(name)
    }

    fn rename(&self, from: &Path, name: &str) -> Result<PathBuf> {
        let rename_err = |reason: String| Error::Rename {
            from: from.to_path_buf(),
            name: name.to_string(),
            reason,
        };

        // Exactly one normal component keeps the target inside the directory
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(rename_err("not a plain file name".to_string())),
        }

        let target = self.dir.path().join(name);
        if target.exists() {
            return Err(rename_err("target already exists".to_string()));
        }
        std::fs::rename(from, &target).map_err(|e| rename_err(e.to_string()))?;

        debug!("Renamed {} -> {}", from.display(), target.display());
        Ok(target)
    }
}
