//! Read back the asset index of an existing package.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use serde::Serialize;

use crate::error::{PackError, PackResult};
use crate::staging::{META_ENTRY, PATHNAME_ENTRY, PAYLOAD_ENTRY};

/// One GUID folder found in a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageEntry {
    pub guid: String,
    pub pathname: Option<String>,
    pub has_meta: bool,
    /// Size of the `asset` payload, if present.
    pub payload_bytes: Option<u64>,
}

/// List GUID folders of a gzip(tar) package, sorted by GUID.
///
/// Accepts archives produced by either archiver; a leading `./` on entry
/// names is ignored. Files outside a GUID folder are skipped.
pub fn read_package_index<R: Read>(reader: R) -> PackResult<Vec<PackageEntry>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut by_guid: BTreeMap<String, PackageEntry> = BTreeMap::new();

    let entries = archive.entries().map_err(read_err)?;
    for entry in entries {
        let mut entry = entry.map_err(read_err)?;
        let path = entry.path().map_err(read_err)?.into_owned();
        let Some((guid, name)) = split_entry_path(&path) else {
            continue;
        };
        let is_file = entry.header().entry_type().is_file();
        if name.is_empty() && is_file {
            continue;
        }

        let slot = by_guid.entry(guid.clone()).or_insert_with(|| PackageEntry {
            guid,
            ..Default::default()
        });
        if !is_file {
            continue;
        }
        match name.as_str() {
            META_ENTRY => slot.has_meta = true,
            PAYLOAD_ENTRY => slot.payload_bytes = Some(entry.header().size().map_err(read_err)?),
            PATHNAME_ENTRY => {
                let mut text = String::new();
                entry.read_to_string(&mut text).map_err(read_err)?;
                slot.pathname = Some(text);
            }
            _ => {}
        }
    }

    Ok(by_guid.into_values().collect())
}

/// `guid/name` → `(guid, name)`; `guid` alone → `(guid, "")`.
fn split_entry_path(path: &Path) -> Option<(String, String)> {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    match parts.as_slice() {
        [guid] => Some((guid.clone(), String::new())),
        [guid, name] => Some((guid.clone(), name.clone())),
        _ => None,
    }
}

fn read_err(e: std::io::Error) -> PackError {
    PackError::archive(format!("reading package: {}", e))
}
