//! Per-run temporary directory lifecycle.
//!
//! ```text
//! <tmp>/unitypack-XXXXXX/
//!   staging/            # archive root, one folder per GUID
//!   out/package.tar.gz  # private archive before publication
//! ```
//!
//! The root is created with an atomic unique name, so concurrent runs never
//! share it. It is removed by [`RunWorkspace::cleanup`] on the normal path and
//! by `Drop` on every other path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{PackError, PackResult};

const ROOT_PREFIX: &str = "unitypack-";
const STAGING_DIR: &str = "staging";
const OUT_DIR: &str = "out";
const ARCHIVE_NAME: &str = "package.tar.gz";

#[derive(Debug)]
pub struct RunWorkspace {
    root: TempDir,
    staging: PathBuf,
    out: PathBuf,
}

impl RunWorkspace {
    /// Allocate a fresh root under `base`, or the system temp dir when `None`.
    pub fn allocate(base: Option<&Path>) -> PackResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(ROOT_PREFIX);
        let root = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            PackError::io(
                "allocate temp directory in",
                base.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
                e,
            )
        })?;

        let staging = root.path().join(STAGING_DIR);
        let out = root.path().join(OUT_DIR);
        for dir in [&staging, &out] {
            std::fs::create_dir(dir).map_err(|e| PackError::io("create directory", dir, e))?;
        }

        debug!(root = %root.path().display(), "allocated run workspace");
        Ok(Self { root, staging, out })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directory whose contents become the archive.
    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Private location the archiver writes to.
    pub fn archive_path(&self) -> PathBuf {
        self.out.join(ARCHIVE_NAME)
    }

    /// Remove `extra_dirs` and then the workspace root.
    ///
    /// Every removal is attempted; failures are returned rather than raised so
    /// the caller can decide how they rank against earlier errors. Directories
    /// that are already gone are not failures.
    pub async fn cleanup(self, extra_dirs: &[PathBuf]) -> Vec<PackError> {
        let mut failures = Vec::new();

        for dir in extra_dirs {
            if let Err(e) = remove_dir_forced(dir).await {
                failures.push(e);
            }
        }

        let root_path = self.root.path().to_path_buf();
        match tokio::task::spawn_blocking(move || self.root.close()).await {
            Ok(Ok(())) => debug!(root = %root_path.display(), "removed run workspace"),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {}
            Ok(Err(e)) => failures.push(PackError::Cleanup {
                path: root_path,
                source: e,
            }),
            Err(e) => failures.push(e.into()),
        }

        for failure in &failures {
            warn!(error = %failure, "cleanup failed");
        }
        failures
    }
}

/// `rm -rf` semantics: a missing directory is success.
pub async fn remove_dir_forced(dir: &Path) -> PackResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "removed directory");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PackError::Cleanup {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_unique() {
        let base = TempDir::new().unwrap();
        let a = RunWorkspace::allocate(Some(base.path())).unwrap();
        let b = RunWorkspace::allocate(Some(base.path())).unwrap();
        assert_ne!(a.root(), b.root());
        assert!(a.staging().is_dir());
        assert!(a.archive_path().parent().unwrap().is_dir());
        assert!(!a.archive_path().starts_with(a.staging()));
    }

    #[tokio::test]
    async fn cleanup_removes_root_and_extra_dirs() {
        let base = TempDir::new().unwrap();
        let extra = base.path().join("extra");
        std::fs::create_dir_all(extra.join("nested")).unwrap();
        std::fs::write(extra.join("nested/file"), b"x").unwrap();

        let ws = RunWorkspace::allocate(Some(base.path())).unwrap();
        std::fs::write(ws.staging().join("leftover"), b"y").unwrap();
        let root = ws.root().to_path_buf();

        let failures = ws
            .cleanup(&[extra.clone(), base.path().join("never-existed")])
            .await;

        assert!(failures.is_empty(), "{failures:?}");
        assert!(!root.exists());
        assert!(!extra.exists());
    }

    #[test]
    fn drop_removes_root() {
        let base = TempDir::new().unwrap();
        let root = {
            let ws = RunWorkspace::allocate(Some(base.path())).unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn allocate_in_missing_base_fails() {
        let base = TempDir::new().unwrap();
        let err = RunWorkspace::allocate(Some(&base.path().join("missing"))).unwrap_err();
        assert!(matches!(err, PackError::Io { .. }));
    }
}
