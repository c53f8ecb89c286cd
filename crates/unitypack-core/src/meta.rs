//! Unity `.meta` descriptor parsing.
//!
//! A meta file is a YAML mapping; only two keys matter for packaging:
//!
//! ```text
//! fileFormatVersion: 2
//! guid: 3f1c6e0b9b2d4a4f8e7a1c2d3e4f5a6b
//! folderAsset: yes
//! DefaultImporter: ...
//! ```

use std::fmt;

use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// File name suffix that marks a meta file.
pub const META_SUFFIX: &str = ".meta";

/// Strip the `.meta` suffix from a meta file path.
///
/// Asset paths are derived by dropping exactly `META_SUFFIX.len()` (5) trailing
/// bytes; anything without the suffix is rejected rather than guessed at.
pub fn strip_meta_suffix(meta_path: &str) -> Option<&str> {
    meta_path.strip_suffix(META_SUFFIX)
}

/// Value of the optional `folderAsset` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderAsset {
    Yes,
    No,
    /// Key absent. Treated like `No` when materializing.
    #[default]
    Unspecified,
}

/// Parsed subset of a meta file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDescriptor {
    pub guid: String,
    pub folder_asset: FolderAsset,
}

#[derive(Debug, thiserror::Error)]
pub enum MetaParseError {
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document is not a mapping")]
    NotAMapping,

    #[error("missing `guid` field")]
    MissingGuid,

    #[error("`guid` is empty")]
    EmptyGuid,

    #[error("`guid` is not usable as a folder name: {0:?}")]
    InvalidGuid(String),

    #[error("`folderAsset` must be `yes` or `no`, got {0}")]
    InvalidFolderAsset(String),

    #[error("meta file is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Keys read from the meta mapping, as the scalar text written in the file.
#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default, deserialize_with = "scalar_text::deserialize_opt")]
    guid: Option<String>,

    #[serde(default, rename = "folderAsset", deserialize_with = "scalar_text::deserialize_opt")]
    folder_asset: Option<String>,
}

/// Top-level document: a mapping, or anything else.
enum Document {
    Mapping(RawMeta),
    Other,
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(DocumentVisitor)
    }
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = Document;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a YAML document")
    }

    fn visit_map<A>(self, map: A) -> Result<Document, A::Error>
    where
        A: MapAccess<'de>,
    {
        RawMeta::deserialize(de::value::MapAccessDeserializer::new(map)).map(Document::Mapping)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Document, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Document::Other)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_i128<E: de::Error>(self, _: i128) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_u128<E: de::Error>(self, _: u128) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Document, E> {
        Ok(Document::Other)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Document, E> {
        Ok(Document::Other)
    }
}

/// Scalars as text. Unity writes GUIDs unquoted, so an all-digit GUID is a
/// YAML integer that may not fit in 64 bits.
mod scalar_text {
    use super::*;

    struct Text(String);

    impl<'de> Deserialize<'de> for Text {
        fn deserialize<D>(d: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            d.deserialize_str(TextVisitor).map(Text)
        }
    }

    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a scalar")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    pub fn deserialize_opt<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<Text> = Option::deserialize(d)?;
        Ok(opt.map(|t| t.0))
    }
}

impl MetaDescriptor {
    pub fn parse(text: &str) -> Result<Self, MetaParseError> {
        let raw = match serde_yaml::from_str::<Document>(text)? {
            Document::Mapping(raw) => raw,
            Document::Other => return Err(MetaParseError::NotAMapping),
        };

        let guid = raw
            .guid
            .map(|g| g.trim().to_string())
            .ok_or(MetaParseError::MissingGuid)?;
        if guid.is_empty() {
            return Err(MetaParseError::EmptyGuid);
        }
        if guid == "." || guid == ".." || guid.contains(['/', '\\']) {
            return Err(MetaParseError::InvalidGuid(guid));
        }

        let folder_asset = match raw.folder_asset.as_deref() {
            None => FolderAsset::Unspecified,
            Some("yes") => FolderAsset::Yes,
            Some("no") => FolderAsset::No,
            Some(other) => return Err(MetaParseError::InvalidFolderAsset(other.to_string())),
        };

        Ok(Self { guid, folder_asset })
    }

    /// Parse raw meta file bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, MetaParseError> {
        Self::parse(std::str::from_utf8(bytes)?)
    }

    pub fn is_folder_asset(&self) -> bool {
        self.folder_asset == FolderAsset::Yes
    }
}
