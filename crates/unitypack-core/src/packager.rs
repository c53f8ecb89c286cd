//! Package assembly pipeline.
//!
//! allocate workspace → stage every meta file concurrently → archive once →
//! publish → clean up. Cleanup runs whatever happened before it; an earlier
//! error always wins over a cleanup failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::archive::{publish_atomic, Archiver};
use crate::config::PackConfig;
use crate::error::{PackError, PackResult};
use crate::fanout::FanOut;
use crate::sink::{LogSink, RunLog};
use crate::staging::{materialize_asset, StagedAsset};
use crate::workspace::RunWorkspace;

/// Inputs for one package build.
#[derive(Clone)]
pub struct PackageRequest {
    /// Meta file paths relative to `project_root`, each ending in `.meta`.
    pub meta_files: Vec<String>,
    pub project_root: PathBuf,
    pub output: PathBuf,
    /// Extra directories removed (recursively) when the run ends.
    pub remove_dirs: Vec<PathBuf>,
    pub log: Option<LogSink>,
}

impl PackageRequest {
    pub fn new(
        meta_files: impl IntoIterator<Item = impl Into<String>>,
        project_root: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            meta_files: meta_files.into_iter().map(Into::into).collect(),
            project_root: project_root.into(),
            output: output.into(),
            remove_dirs: Vec::new(),
            log: None,
        }
    }

    pub fn with_remove_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.remove_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn with_log(mut self, sink: LogSink) -> Self {
        self.log = Some(sink);
        self
    }
}

impl std::fmt::Debug for PackageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageRequest")
            .field("meta_files", &self.meta_files)
            .field("project_root", &self.project_root)
            .field("output", &self.output)
            .field("remove_dirs", &self.remove_dirs)
            .field("log", &self.log.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Result of a successful build.
#[derive(Debug)]
pub struct PackageReport {
    pub output: PathBuf,
    /// Staged assets in request order. Empty for [`Packager::pack_staged_folder`].
    pub assets: Vec<StagedAsset>,
    /// Non-fatal failures while removing temporary directories.
    pub cleanup_errors: Vec<PackError>,
}

impl PackageReport {
    pub fn is_clean(&self) -> bool {
        self.cleanup_errors.is_empty()
    }
}

/// Builds `.unitypackage` files.
#[derive(Clone)]
pub struct Packager {
    config: PackConfig,
    archiver: Arc<dyn Archiver>,
}

impl Packager {
    pub fn new(config: PackConfig) -> Self {
        let archiver = config.build_archiver();
        Self { config, archiver }
    }

    /// Replace the archiver chosen by the config.
    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Stage every meta file of `request` and write the package to `request.output`.
    pub async fn create_package(&self, request: PackageRequest) -> PackResult<PackageReport> {
        if request.meta_files.is_empty() {
            return Err(PackError::InvalidInput {
                message: "no meta files given".to_string(),
            });
        }

        let log = RunLog::new(request.log.clone());
        let workspace = RunWorkspace::allocate(self.config.temp_dir.as_deref())?;
        info!(
            assets = request.meta_files.len(),
            project_root = %request.project_root.display(),
            staging = %workspace.staging().display(),
            archiver = self.archiver.name(),
            "building package"
        );

        let result = self.stage_and_archive(&request, &workspace, &log).await;
        let (assets, cleanup_errors) =
            settle(result, workspace, &request.remove_dirs, &log).await?;

        Ok(PackageReport {
            output: request.output,
            assets,
            cleanup_errors,
        })
    }

    /// Package a folder that already has the `<guid>/{asset.meta, asset, pathname}` layout.
    pub async fn pack_staged_folder(
        &self,
        folder: &Path,
        output: &Path,
        remove_dirs: &[PathBuf],
        log: Option<LogSink>,
    ) -> PackResult<PackageReport> {
        if !folder.is_dir() {
            return Err(PackError::InvalidInput {
                message: format!("not a directory: {}", folder.display()),
            });
        }

        let log = RunLog::new(log);
        let workspace = RunWorkspace::allocate(self.config.temp_dir.as_deref())?;
        let result = self
            .archive_and_publish(folder, &workspace.archive_path(), output, &log)
            .await;
        let ((), cleanup_errors) = settle(result, workspace, remove_dirs, &log).await?;

        Ok(PackageReport {
            output: output.to_path_buf(),
            assets: Vec::new(),
            cleanup_errors,
        })
    }

    async fn stage_and_archive(
        &self,
        request: &PackageRequest,
        workspace: &RunWorkspace,
        log: &RunLog,
    ) -> PackResult<Vec<StagedAsset>> {
        let project_root = Arc::new(request.project_root.clone());
        let staging = Arc::new(workspace.staging().to_path_buf());
        let job_log = log.clone();

        FanOut::new(self.config.parallelism)
            .run(
                request.meta_files.clone(),
                move |_, meta_rel: String| {
                    let root = project_root.clone();
                    let staging = staging.clone();
                    let log = job_log.clone();
                    async move { materialize_asset(&meta_rel, &root, &staging, &log).await }
                },
                |assets| async move {
                    self.archive_and_publish(
                        workspace.staging(),
                        &workspace.archive_path(),
                        &request.output,
                        log,
                    )
                    .await
                    .map(|()| assets)
                },
            )
            .await
    }

    async fn archive_and_publish(
        &self,
        source: &Path,
        built: &Path,
        output: &Path,
        log: &RunLog,
    ) -> PackResult<()> {
        log.line(&format!(
            "archive : {} -> {} ({})",
            source.display(),
            output.display(),
            self.archiver.name()
        ));
        self.archiver.compress(source, built, log).await?;
        publish_atomic(built, output).await
    }
}

impl Default for Packager {
    fn default() -> Self {
        Self::new(PackConfig::default())
    }
}

/// Run cleanup and rank its failures below `result`.
async fn settle<T>(
    result: PackResult<T>,
    workspace: RunWorkspace,
    remove_dirs: &[PathBuf],
    log: &RunLog,
) -> PackResult<(T, Vec<PackError>)> {
    let cleanup_errors = workspace.cleanup(remove_dirs).await;
    for err in &cleanup_errors {
        log.line(&format!("cleanup-error : {}", err));
    }

    match result {
        Ok(value) => Ok((value, cleanup_errors)),
        Err(err) => {
            if !cleanup_errors.is_empty() {
                warn!(
                    error = %err,
                    cleanup_failures = cleanup_errors.len(),
                    "cleanup also failed after run error"
                );
            }
            Err(err)
        }
    }
}

/// Build a package with the default configuration.
pub async fn create_unity_package(
    meta_files: impl IntoIterator<Item = impl Into<String>>,
    project_root: impl Into<PathBuf>,
    output: impl Into<PathBuf>,
    log: Option<LogSink>,
) -> PackResult<PackageReport> {
    let mut request = PackageRequest::new(meta_files, project_root, output);
    request.log = log;
    Packager::default().create_package(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Archiver that counts invocations and records what it saw.
    #[derive(Default)]
    struct CountingArchiver {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Archiver for CountingArchiver {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn compress(&self, source_dir: &Path, dest: &Path, _log: &RunLog) -> PackResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut names: Vec<String> = std::fs::read_dir(source_dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            *self.seen.lock().unwrap() = names;
            if self.fail {
                return Err(PackError::archive("simulated compressor failure"));
            }
            std::fs::write(dest, b"archive").unwrap();
            Ok(())
        }
    }

    struct Project {
        root: TempDir,
        temp: TempDir,
        out: TempDir,
    }

    impl Project {
        fn new() -> Self {
            Self {
                root: TempDir::new().unwrap(),
                temp: TempDir::new().unwrap(),
                out: TempDir::new().unwrap(),
            }
        }

        fn file(&self, rel: &str, content: &str) -> &Self {
            let path = self.root.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
            self
        }

        fn packager(&self, archiver: Arc<CountingArchiver>) -> Packager {
            Packager::new(PackConfig::default().with_temp_dir(self.temp.path())).with_archiver(archiver)
        }

        fn temp_is_empty(&self) -> bool {
            std::fs::read_dir(self.temp.path()).unwrap().next().is_none()
        }
    }

    #[tokio::test]
    async fn archives_once_and_cleans_up() {
        let p = Project::new();
        p.file("Assets/A.meta", "guid: a1\nfolderAsset: yes\n")
            .file("Assets/A/b.txt.meta", "guid: b2\n")
            .file("Assets/A/b.txt", "bee")
            .file("Assets/A/c.png.meta", "guid: c3\nfolderAsset: no\n");
        let archiver = Arc::new(CountingArchiver::default());
        let output = p.out.path().join("out.unitypackage");

        let report = p
            .packager(archiver.clone())
            .create_package(PackageRequest::new(
                ["Assets/A.meta", "Assets/A/b.txt.meta", "Assets/A/c.png.meta"],
                p.root.path(),
                &output,
            ))
            .await
            .unwrap();

        assert_eq!(archiver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*archiver.seen.lock().unwrap(), vec!["a1", "b2", "c3"]);
        assert_eq!(std::fs::read(&output).unwrap(), b"archive");
        let guids: Vec<&str> = report.assets.iter().map(|a| a.guid.as_str()).collect();
        assert_eq!(guids, vec!["a1", "b2", "c3"]);
        assert!(report.is_clean());
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn parse_failure_skips_archive_and_output() {
        let p = Project::new();
        p.file("Assets/Good.meta", "guid: good\n")
            .file("Assets/Bad.meta", "fileFormatVersion: 2\n");
        let archiver = Arc::new(CountingArchiver::default());
        let output = p.out.path().join("out.unitypackage");

        let err = p
            .packager(archiver.clone())
            .create_package(PackageRequest::new(
                ["Assets/Good.meta", "Assets/Bad.meta"],
                p.root.path(),
                &output,
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(archiver.calls.load(Ordering::SeqCst), 0);
        assert!(!output.exists());
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn archive_failure_still_cleans_up() {
        let p = Project::new();
        p.file("Assets/Only.meta", "guid: only\n");
        let remove = p.out.path().join("scratch");
        std::fs::create_dir_all(&remove).unwrap();
        let archiver = Arc::new(CountingArchiver {
            fail: true,
            ..Default::default()
        });
        let output = p.out.path().join("out.unitypackage");

        let err = p
            .packager(archiver)
            .create_package(
                PackageRequest::new(["Assets/Only.meta"], p.root.path(), &output)
                    .with_remove_dirs([remove.clone()]),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Archive);
        assert!(!output.exists());
        assert!(!remove.exists());
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn cleanup_failure_after_success_is_reported_not_raised() {
        let p = Project::new();
        p.file("Assets/Kept.meta", "guid: kept\n");
        let not_a_dir = p.out.path().join("plain-file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let output = p.out.path().join("out.unitypackage");

        let report = p
            .packager(Arc::new(CountingArchiver::default()))
            .create_package(
                PackageRequest::new(["Assets/Kept.meta"], p.root.path(), &output)
                    .with_remove_dirs([not_a_dir.clone()]),
            )
            .await
            .unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.cleanup_errors.len(), 1);
        assert_eq!(report.cleanup_errors[0].kind(), ErrorKind::Cleanup);
        assert!(output.exists());
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_mask_archive_error() {
        let p = Project::new();
        p.file("Assets/Kept.meta", "guid: kept\n");
        let not_a_dir = p.out.path().join("plain-file");
        std::fs::write(&not_a_dir, b"x").unwrap();
        let archiver = Arc::new(CountingArchiver {
            fail: true,
            ..Default::default()
        });
        let output = p.out.path().join("out.unitypackage");

        let err = p
            .packager(archiver)
            .create_package(
                PackageRequest::new(["Assets/Kept.meta"], p.root.path(), &output)
                    .with_remove_dirs([not_a_dir]),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Archive);
        assert!(!output.exists());
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn duplicate_guid_fails_run() {
        let p = Project::new();
        p.file("Assets/One.meta", "guid: same\n")
            .file("Assets/Two.meta", "guid: same\n");
        let archiver = Arc::new(CountingArchiver::default());

        let err = p
            .packager(archiver.clone())
            .create_package(PackageRequest::new(
                ["Assets/One.meta", "Assets/Two.meta"],
                p.root.path(),
                p.out.path().join("dup.unitypackage"),
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(archiver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_request_is_rejected_before_allocation() {
        let p = Project::new();
        let err = p
            .packager(Arc::new(CountingArchiver::default()))
            .create_package(PackageRequest::new(
                Vec::<String>::new(),
                p.root.path(),
                p.out.path().join("x"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::InvalidInput { .. }));
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn log_sink_sees_directory_creation() {
        let p = Project::new();
        p.file("Assets/Logged.meta", "guid: logged\n");
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = lines.clone();

        p.packager(Arc::new(CountingArchiver::default()))
            .create_package(
                PackageRequest::new(
                    ["Assets/Logged.meta"],
                    p.root.path(),
                    p.out.path().join("l.unitypackage"),
                )
                .with_log(Arc::new(move |line: &str| {
                    captured.lock().unwrap().push(line.to_string());
                })),
            )
            .await
            .unwrap();

        let lines = lines.lock().unwrap();
        assert!(lines
            .iter()
            .any(|l| l.starts_with("create-directory : ") && l.ends_with("logged")));
        assert!(lines.iter().any(|l| l.starts_with("archive : ")));
    }

    #[tokio::test]
    async fn pack_staged_folder_archives_existing_tree() {
        let p = Project::new();
        p.file("staged/abcd/asset.meta", "guid: abcd\n")
            .file("staged/abcd/pathname", "Assets/X");
        let archiver = Arc::new(CountingArchiver::default());
        let staged = p.root.path().join("staged");
        let output = p.out.path().join("folder.unitypackage");

        let report = p
            .packager(archiver.clone())
            .pack_staged_folder(&staged, &output, &[staged.clone()], None)
            .await
            .unwrap();

        assert_eq!(*archiver.seen.lock().unwrap(), vec!["abcd"]);
        assert!(report.assets.is_empty());
        assert!(output.exists());
        assert!(!staged.exists());
        assert!(p.temp_is_empty());
    }

    #[tokio::test]
    async fn pack_staged_folder_requires_directory() {
        let p = Project::new();
        let err = p
            .packager(Arc::new(CountingArchiver::default()))
            .pack_staged_folder(
                &p.root.path().join("missing"),
                &p.out.path().join("x"),
                &[],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::InvalidInput { .. }));
    }
}
