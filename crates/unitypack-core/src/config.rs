//! Packager configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archive::{Archiver, CommandArchiver, TarGzArchiver};

/// Which [`Archiver`] backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiverKind {
    /// In-process tar + gzip.
    #[default]
    Builtin,
    /// External `tar` and `7z`/`gzip` binaries.
    External,
}

impl FromStr for ArchiverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" | "internal" => Ok(Self::Builtin),
            "external" | "command" => Ok(Self::External),
            other => Err(format!(
                "unknown archiver `{}` (expected builtin or external)",
                other
            )),
        }
    }
}

/// Packager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackConfig {
    /// Maximum concurrent asset materializations.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    #[serde(default)]
    pub archiver: ArchiverKind,

    /// 7-Zip executable preferred by the external archiver when present.
    #[serde(default = "default_seven_zip_path")]
    pub seven_zip_path: Option<PathBuf>,

    /// Parent directory for run workspaces (system temp dir when unset).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// gzip level 0-9 for the builtin archiver.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_parallelism() -> usize {
    8
}

fn default_compression_level() -> u32 {
    6
}

fn default_seven_zip_path() -> Option<PathBuf> {
    if cfg!(windows) {
        Some(PathBuf::from(r"C:\Program Files\7-Zip\7z.exe"))
    } else {
        None
    }
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            archiver: ArchiverKind::default(),
            seven_zip_path: default_seven_zip_path(),
            temp_dir: None,
            compression_level: default_compression_level(),
        }
    }
}

impl PackConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `UNITYPACK_PARALLELISM` | Concurrent materializations (default: 8) |
    /// | `UNITYPACK_ARCHIVER` | `builtin` or `external` (default: builtin) |
    /// | `UNITYPACK_SEVEN_ZIP` | Path to `7z` for the external archiver |
    /// | `UNITYPACK_TEMP_DIR` | Parent directory for run workspaces |
    /// | `UNITYPACK_COMPRESSION_LEVEL` | gzip level 0-9 (default: 6) |
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parallelism: std::env::var("UNITYPACK_PARALLELISM")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.parallelism),
            archiver: std::env::var("UNITYPACK_ARCHIVER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.archiver),
            seven_zip_path: std::env::var_os("UNITYPACK_SEVEN_ZIP")
                .map(PathBuf::from)
                .or(defaults.seven_zip_path),
            temp_dir: std::env::var_os("UNITYPACK_TEMP_DIR").map(PathBuf::from),
            compression_level: std::env::var("UNITYPACK_COMPRESSION_LEVEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|l| *l <= 9)
                .unwrap_or(defaults.compression_level),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_archiver(mut self, archiver: ArchiverKind) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_seven_zip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seven_zip_path = Some(path.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Build the configured archiver backend.
    pub fn build_archiver(&self) -> Arc<dyn Archiver> {
        match self.archiver {
            ArchiverKind::Builtin => Arc::new(TarGzArchiver::new(self.compression_level)),
            ArchiverKind::External => Arc::new(CommandArchiver::new(self.seven_zip_path.clone())),
        }
    }
}
