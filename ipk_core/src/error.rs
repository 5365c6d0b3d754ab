//! Error types for ipk_core.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ipk_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, extracting or listing a package.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io { source: io::Error },

    /// Gzip or tar framing is malformed or truncated.
    #[error("Malformed archive: {reason}")]
    Decode { reason: String },

    /// The `debian-binary` marker names a format version we cannot read.
    #[error("Unsupported debian-binary version: {version:?}")]
    UnsupportedVersion { version: String },

    /// A user name or id could not be found in the user database.
    #[error("Unknown user: {user}")]
    UnknownUser { user: String },

    /// A group name or id could not be found in the group database.
    #[error("Unknown group: {group}")]
    UnknownGroup { group: String },

    /// A hard link points at a path that has not been materialized.
    #[error("Hard link {name} points to missing target {target}")]
    LinkTarget { name: String, target: String },

    /// Entry name cannot be archived or extracted safely.
    #[error("Invalid entry name {name:?}: {reason}")]
    InvalidEntryName { name: String, reason: String },

    /// A payload ended before the size declared in its entry.
    #[error("Payload of {name} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Owner or group name does not fit in a tar header.
    #[error("Name too long for tar header: {name}")]
    NameTooLong { name: String },

    /// Path already exists where a link should be created.
    #[error("Path already exists: {path}")]
    PathExists { path: PathBuf },
}

impl Error {
    /// Create a Decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Error::Decode {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedVersion error.
    pub fn unsupported_version(version: impl Into<String>) -> Self {
        Error::UnsupportedVersion {
            version: version.into(),
        }
    }

    /// Create an UnknownUser error.
    pub fn unknown_user(user: impl fmt::Display) -> Self {
        Error::UnknownUser {
            user: user.to_string(),
        }
    }

    /// Create an UnknownGroup error.
    pub fn unknown_group(group: impl fmt::Display) -> Self {
        Error::UnknownGroup {
            group: group.to_string(),
        }
    }

    /// Create a LinkTarget error.
    pub fn link_target(name: impl Into<String>, target: impl Into<String>) -> Self {
        Error::LinkTarget {
            name: name.into(),
            target: target.into(),
        }
    }

    /// Create an InvalidEntryName error.
    pub fn invalid_entry_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidEntryName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a SizeMismatch error.
    pub fn size_mismatch(name: impl Into<String>, expected: u64, actual: u64) -> Self {
        Error::SizeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create a NameTooLong error.
    pub fn name_too_long(name: impl Into<String>) -> Self {
        Error::NameTooLong { name: name.into() }
    }

    /// Create a PathExists error.
    pub fn path_exists(path: impl Into<PathBuf>) -> Self {
        Error::PathExists { path: path.into() }
    }

    /// Whether this error came from malformed archive framing.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

/// Marker carried inside an `io::Error` raised while decoding archive bytes.
///
/// Payload readers must speak `io::Error`, so decode failures travel through
/// `io::copy` wrapped in this type and are unwrapped again by the `From` impl.
#[derive(Debug)]
pub(crate) struct DecodeFailure(pub(crate) io::Error);

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for DecodeFailure {}

/// Tag an I/O error raised by the gzip or tar layer as a decode error.
pub(crate) fn decode_io(err: io::Error) -> io::Error {
    if err.get_ref().is_some_and(|inner| inner.is::<DecodeFailure>()) {
        return err;
    }
    io::Error::new(err.kind(), DecodeFailure(err))
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<DecodeFailure>()) {
            Some(failure) => Error::decode(failure.to_string()),
            None => Error::Io { source: err },
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: io::Error::other(err.to_string()),
            },
        }
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Error::Io {
            source: io::Error::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_io_error_maps_to_io() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_tagged_io_error_maps_to_decode() {
        let raw = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated gzip");
        let err: Error = decode_io(raw).into();
        assert!(err.is_decode());
        assert!(err.to_string().contains("truncated gzip"));
    }

    #[test]
    fn test_decode_io_does_not_double_wrap() {
        let once = decode_io(io::Error::other("bad block"));
        let twice = decode_io(once);
        let inner = twice.get_ref().unwrap().downcast_ref::<DecodeFailure>().unwrap();
        assert!(inner.0.get_ref().is_none_or(|e| !e.is::<DecodeFailure>()));
    }
}
