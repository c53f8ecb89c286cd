//! Error types for package assembly.

use std::path::PathBuf;

use crate::meta::MetaParseError;

/// Coarse classification of a [`PackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unreadable file, directory conflict, copy failure.
    Io,
    /// Malformed meta content or unusable input path.
    Parse,
    /// The archive or compression step failed.
    Archive,
    /// Removing temporary directories failed.
    Cleanup,
    /// Caller supplied an unusable request.
    Input,
    /// A worker task panicked or was aborted.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Package assembly errors.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Filesystem operation failed.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Meta file content could not be turned into a descriptor.
    #[error("invalid meta file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: MetaParseError,
    },

    /// Meta path does not carry the `.meta` suffix.
    #[error("not a meta file path (expected `.meta` suffix): {path}")]
    InvalidMetaPath { path: String },

    /// Request is unusable as a whole.
    #[error("invalid request: {message}")]
    InvalidInput { message: String },

    /// Archiving or compressing the staging tree failed.
    #[error("archive step failed: {message}")]
    Archive { message: String },

    /// Removing a temporary or caller-designated directory failed.
    #[error("failed to remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Worker task did not complete.
    #[error("asset task failed: {message}")]
    Task { message: String },
}

impl PackError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Parse { .. } | Self::InvalidMetaPath { .. } => ErrorKind::Parse,
            Self::InvalidInput { .. } => ErrorKind::Input,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::Cleanup { .. } => ErrorKind::Cleanup,
            Self::Task { .. } => ErrorKind::Internal,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Parse | ErrorKind::Input => 1,
            ErrorKind::Io | ErrorKind::Cleanup | ErrorKind::Internal => 2,
            ErrorKind::Archive => 3,
        }
    }
}

impl From<tokio::task::JoinError> for PackError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}

/// Result type for package operations.
pub type PackResult<T> = Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        let parse = PackError::InvalidMetaPath {
            path: "Assets/Foo".into(),
        };
        assert_eq!(parse.kind(), ErrorKind::Parse);
        assert_eq!(parse.exit_code(), 1);

        let io = PackError::io(
            "read",
            "/nope",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(io.exit_code(), 2);

        assert_eq!(PackError::archive("gzip exited 1").exit_code(), 3);
    }

    #[test]
    fn io_error_message_names_path() {
        let err = PackError::io(
            "create directory",
            "/tmp/stage/abc",
            std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("create directory /tmp/stage/abc"), "{msg}");
    }
}
