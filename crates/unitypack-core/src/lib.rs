//! Build Unity `.unitypackage` archives from asset meta files.
//!
//! A package is a gzip-compressed tar with one folder per asset, named by the
//! asset's GUID:
//!
//! ```text
//! <guid>/asset.meta   # the asset's .meta file
//! <guid>/asset        # the asset itself (files only)
//! <guid>/pathname     # project-relative path, e.g. Assets/Voiceer/Yui.asset
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use unitypack_core::{PackConfig, PackageRequest, Packager};
//!
//! # async fn example() -> unitypack_core::PackResult<()> {
//! let packager = Packager::new(PackConfig::from_env());
//! let report = packager
//!     .create_package(PackageRequest::new(
//!         ["Assets/Voiceer.meta", "Assets/Voiceer/VoiceResources.meta"],
//!         "/path/to/project",
//!         "Voiceer.unitypackage",
//!     ))
//!     .await?;
//! println!("packed {} assets", report.assets.len());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod fanout;
pub mod inspect;
pub mod meta;
pub mod packager;
pub mod sink;
pub mod staging;
pub mod workspace;

pub use archive::{publish_atomic, Archiver, CommandArchiver, TarGzArchiver};
pub use config::{ArchiverKind, PackConfig};
pub use error::{ErrorKind, PackError, PackResult};
pub use fanout::{CompletionTracker, FanOut};
pub use inspect::{read_package_index, PackageEntry};
pub use meta::{strip_meta_suffix, FolderAsset, MetaDescriptor, MetaParseError, META_SUFFIX};
pub use packager::{create_unity_package, PackageReport, PackageRequest, Packager};
pub use sink::{LogSink, RunLog};
pub use staging::{materialize_asset, StagedAsset};
pub use workspace::RunWorkspace;
