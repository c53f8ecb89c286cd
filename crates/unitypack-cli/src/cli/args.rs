use clap::{Parser, Subcommand};
use std::path::PathBuf;
use unitypack_core::{ArchiverKind, PackConfig};

#[derive(Parser)]
#[command(
    name = "unitypack",
    version,
    about = "Build Unity .unitypackage archives from asset meta files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a package from meta files and their assets
    Create(CreateArgs),
    /// Package a folder already laid out as <guid>/{asset.meta,asset,pathname}
    PackFolder(PackFolderArgs),
    /// List the assets inside a package
    Inspect(InspectArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CreateArgs {
    /// Meta files relative to the project root (e.g. Assets/Foo.prefab.meta)
    pub meta_files: Vec<String>,

    /// Read more meta paths from a file, one per line (`#` starts a comment)
    #[arg(long)]
    pub list: Option<PathBuf>,

    /// Unity project root the meta paths are relative to
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Output package path
    #[arg(long, short)]
    pub output: PathBuf,

    /// Directory to delete once the build finishes (repeatable)
    #[arg(long = "remove-dir")]
    pub remove_dirs: Vec<PathBuf>,

    #[command(flatten)]
    pub pack: PackOptions,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PackFolderArgs {
    /// Staged folder whose contents become the archive root
    #[arg(long)]
    pub folder: PathBuf,

    /// Output package path
    #[arg(long, short)]
    pub output: PathBuf,

    /// Directory to delete once the build finishes (repeatable)
    #[arg(long = "remove-dir")]
    pub remove_dirs: Vec<PathBuf>,

    #[command(flatten)]
    pub pack: PackOptions,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InspectArgs {
    /// Package file (.unitypackage)
    pub package: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Settings shared by the building commands. Unset flags fall back to
/// `UNITYPACK_*` environment variables, then defaults.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PackOptions {
    /// Archiver backend: builtin or external
    #[arg(long)]
    pub archiver: Option<ArchiverKind>,

    /// Maximum assets staged concurrently
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// 7-Zip executable for the external archiver
    #[arg(long)]
    pub seven_zip: Option<PathBuf>,

    /// Parent directory for temporary staging
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Echo pipeline progress lines to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

impl PackOptions {
    pub fn to_config(&self) -> PackConfig {
        let mut config = PackConfig::from_env();
        if let Some(kind) = self.archiver {
            config = config.with_archiver(kind);
        }
        if let Some(n) = self.parallelism {
            config = config.with_parallelism(n);
        }
        if let Some(path) = &self.seven_zip {
            config = config.with_seven_zip_path(path);
        }
        if let Some(dir) = &self.temp_dir {
            config = config.with_temp_dir(dir);
        }
        config
    }
}
