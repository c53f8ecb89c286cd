//! Archive builder: gzip(tar(staging root)) and atomic publication.
//!
//! Entries are relative to the staging root, so the archive root holds the
//! GUID folders directly. Two interchangeable backends implement [`Archiver`]:
//!
//! - [`TarGzArchiver`]: in-process `tar` + `flate2` with deterministic headers
//! - [`CommandArchiver`]: external `tar`, then `7z -tgzip` or `gzip`

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use flate2::{Compression, GzBuilder};
use tar::{Builder, Header, HeaderMode};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{PackError, PackResult};
use crate::sink::RunLog;

/// Turns a directory tree into a gzip-compressed tar file.
#[async_trait]
pub trait Archiver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write `gzip(tar(source_dir))` to `dest`, overwriting it.
    async fn compress(&self, source_dir: &Path, dest: &Path, log: &RunLog) -> PackResult<()>;
}

/// In-process archiver.
#[derive(Debug, Clone)]
pub struct TarGzArchiver {
    level: u32,
}

impl TarGzArchiver {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

#[async_trait]
impl Archiver for TarGzArchiver {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn compress(&self, source_dir: &Path, dest: &Path, _log: &RunLog) -> PackResult<()> {
        let src = source_dir.to_path_buf();
        let out = dest.to_path_buf();
        let level = self.level;
        tokio::task::spawn_blocking(move || write_tar_gz(&src, &out, level))
            .await?
            .map_err(|e| PackError::archive(format!("writing {}: {}", dest.display(), e)))
    }
}

fn write_tar_gz(source_dir: &Path, dest: &Path, level: u32) -> io::Result<()> {
    let file = BufWriter::new(File::create(dest)?);
    let encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(file, Compression::new(level));

    let mut tar = Builder::new(encoder);
    tar.mode(HeaderMode::Deterministic);
    append_tree(&mut tar, source_dir, Path::new(""))?;

    let encoder = tar.into_inner()?;
    let mut file = encoder.finish()?;
    file.flush()?;
    Ok(())
}

/// Append everything under `root/rel` in sorted order.
fn append_tree<W: Write>(tar: &mut Builder<W>, root: &Path, rel: &Path) -> io::Result<()> {
    let mut entries = std::fs::read_dir(root.join(rel))?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = rel.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let mut header = base_header(0o755);
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            tar.append_data(&mut header, &name, io::empty())?;
            append_tree(tar, root, &name)?;
        } else if file_type.is_file() {
            let file = File::open(entry.path())?;
            let mut header = base_header(0o644);
            header.set_size(file.metadata()?.len());
            tar.append_data(&mut header, &name, file)?;
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular staging entry");
        }
    }
    Ok(())
}

fn base_header(mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header
}

/// Archiver that shells out to `tar` and a gzip-capable compressor.
///
/// When the configured 7-Zip binary exists it is preferred; otherwise `gzip`
/// from `PATH` is used.
#[derive(Debug, Clone, Default)]
pub struct CommandArchiver {
    seven_zip: Option<PathBuf>,
}

impl CommandArchiver {
    pub fn new(seven_zip: Option<PathBuf>) -> Self {
        Self { seven_zip }
    }

    fn usable_seven_zip(&self) -> Option<&Path> {
        self.seven_zip.as_deref().filter(|p| p.is_file())
    }
}

#[async_trait]
impl Archiver for CommandArchiver {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn compress(&self, source_dir: &Path, dest: &Path, log: &RunLog) -> PackResult<()> {
        let work_dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let tar_path = work_dir.join("archtemp.tar");
        let gz_path = work_dir.join("archtemp.tar.gz");

        let mut tar = Command::new("tar");
        tar.arg("-cf").arg(&tar_path).arg("-C").arg(source_dir).arg(".");
        run_tool("tar", tar, log).await?;

        match self.usable_seven_zip() {
            Some(seven_zip) => {
                let mut cmd = Command::new(seven_zip);
                cmd.arg("a").arg("-tgzip").arg(&gz_path).arg(&tar_path);
                run_tool("7z", cmd, log).await?;
            }
            None => {
                let mut cmd = Command::new("gzip");
                cmd.arg("-f").arg(&tar_path);
                run_tool("gzip", cmd, log).await?;
            }
        }

        tokio::fs::rename(&gz_path, dest)
            .await
            .map_err(|e| PackError::archive(format!("moving {}: {}", gz_path.display(), e)))
    }
}

async fn run_tool(label: &str, mut cmd: Command, log: &RunLog) -> PackResult<()> {
    debug!(tool = label, command = ?cmd, "running archive tool");
    let output = cmd
        .output()
        .await
        .map_err(|e| PackError::archive(format!("failed to launch {}: {}", label, e)))?;
    if output.status.success() {
        return Ok(());
    }

    report_output(label, &output, log);
    Err(PackError::archive(format!(
        "{} exited with {}: {}",
        label,
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

fn report_output(label: &str, output: &Output, log: &RunLog) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    warn!(tool = label, status = %output.status, %stdout, %stderr, "archive tool failed");
    log.line(&format!("stdout : {}", stdout));
    log.line(&format!("stderr : {}", stderr));
}

/// Copy `built` to `output` without exposing a partial file at `output`.
///
/// The bytes land in a temp file next to `output` first and are renamed into
/// place, so readers see either the previous file or the complete archive.
pub async fn publish_atomic(built: &Path, output: &Path) -> PackResult<()> {
    let built = built.to_path_buf();
    let target = output.to_path_buf();
    tokio::task::spawn_blocking(move || -> PackResult<()> {
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staged = tempfile::Builder::new()
            .prefix(".unitypack-")
            .suffix(".partial")
            .tempfile_in(&parent)
            .map_err(|e| PackError::io("create temp output in", &parent, e))?;
        std::fs::copy(&built, staged.path())
            .map_err(|e| PackError::io("copy archive to", staged.path(), e))?;
        staged
            .persist(&target)
            .map_err(|e| PackError::io("publish archive to", &target, e.error))?;
        Ok(())
    })
    .await??;

    info!(output = %output.display(), "package written");
    Ok(())
}
