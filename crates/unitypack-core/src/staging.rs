//! Per-asset staging folder materialization.
//!
//! Each meta file becomes one folder under the staging root:
//!
//! ```text
//! <staging>/<guid>/
//!   asset.meta   # copy of the meta file
//!   asset        # copy of the payload (files only, when present)
//!   pathname     # project-relative asset path, UTF-8, no trailing newline
//! ```

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::error::{PackError, PackResult};
use crate::meta::{strip_meta_suffix, FolderAsset, MetaDescriptor};
use crate::sink::RunLog;

pub const META_ENTRY: &str = "asset.meta";
pub const PAYLOAD_ENTRY: &str = "asset";
pub const PATHNAME_ENTRY: &str = "pathname";

/// Outcome of staging one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub guid: String,
    pub folder_asset: FolderAsset,
    /// Project-relative asset path written to `pathname`.
    pub pathname: String,
    /// Whether an `asset` payload was copied.
    pub has_payload: bool,
}

/// Materialize the staging folder for `meta_rel` (relative to `project_root`).
///
/// The GUID folder is created exclusively; an existing folder (for example a
/// second meta file carrying the same GUID) fails with an IO error instead of
/// being overwritten.
pub async fn materialize_asset(
    meta_rel: &str,
    project_root: &Path,
    staging_root: &Path,
    log: &RunLog,
) -> PackResult<StagedAsset> {
    let asset_rel = strip_meta_suffix(meta_rel).ok_or_else(|| PackError::InvalidMetaPath {
        path: meta_rel.to_string(),
    })?;

    let meta_path = project_root.join(meta_rel);
    let bytes = fs::read(&meta_path)
        .await
        .map_err(|e| PackError::io("read meta file", &meta_path, e))?;
    let descriptor = MetaDescriptor::parse_bytes(&bytes).map_err(|source| PackError::Parse {
        path: meta_path.clone(),
        source,
    })?;

    let dir = staging_root.join(&descriptor.guid);
    log.line(&format!("create-directory : {}", dir.display()));
    fs::create_dir(&dir).await.map_err(|e| {
        let action = if e.kind() == ErrorKind::AlreadyExists {
            "staging folder already exists (duplicate guid?)"
        } else {
            "create staging folder"
        };
        PackError::io(action, &dir, e)
    })?;

    let meta_dest = dir.join(META_ENTRY);
    fs::copy(&meta_path, &meta_dest)
        .await
        .map_err(|e| PackError::io("copy meta file to", &meta_dest, e))?;

    let mut has_payload = false;
    if !descriptor.is_folder_asset() {
        let payload_path = project_root.join(asset_rel);
        if is_regular_file(&payload_path).await? {
            let payload_dest = dir.join(PAYLOAD_ENTRY);
            fs::copy(&payload_path, &payload_dest)
                .await
                .map_err(|e| PackError::io("copy asset payload to", &payload_dest, e))?;
            has_payload = true;
        } else {
            debug!(path = %payload_path.display(), "no payload file, skipping");
        }
    }

    let pathname_dest = dir.join(PATHNAME_ENTRY);
    fs::write(&pathname_dest, asset_rel.as_bytes())
        .await
        .map_err(|e| PackError::io("write pathname to", &pathname_dest, e))?;

    debug!(guid = %descriptor.guid, pathname = asset_rel, has_payload, "staged asset");

    Ok(StagedAsset {
        guid: descriptor.guid,
        folder_asset: descriptor.folder_asset,
        pathname: asset_rel.to_string(),
        has_payload,
    })
}

async fn is_regular_file(path: &Path) -> PackResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PackError::io("stat asset payload", path, e)),
    }
}
