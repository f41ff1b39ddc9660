//! Linker error types.

use licenselink_types::ErrorKind;
use licenselink_wire::WireError;
use thiserror::Error;

/// Errors from building an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Entry point is not a valid class name: {0:?}")]
    InvalidEntryPoint(String),

    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    /// Same name, different content.
    #[error("Duplicate entry with different content: {0}")]
    DuplicateEntry(String),

    #[error("Archive already finalized")]
    Finalized,

    #[error("Archive is not finalized")]
    NotFinalized,

    /// The finished archive does not fit in one payload frame.
    #[error("Archive of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u32 },

    /// An earlier write failed part-way; the archive can no longer be used.
    #[error("Archive is unusable after an earlier failure")]
    Broken,

    #[error("Archive format error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::InvalidEntryPoint(_)
            | ArchiveError::InvalidName(_)
            | ArchiveError::DuplicateEntry(_) => ErrorKind::Protocol,
            ArchiveError::Finalized | ArchiveError::NotFinalized => ErrorKind::Protocol,
            ArchiveError::TooLarge { .. }
            | ArchiveError::Broken
            | ArchiveError::Zip(_)
            | ArchiveError::Io(_) => ErrorKind::Resource,
        }
    }
}

/// Why a link session ended without delivering an archive.
#[derive(Error, Debug)]
pub enum SessionError {
    /// I/O with the Developer failed.
    #[error("Developer connection: {0}")]
    Developer(#[from] WireError),

    #[error("Invalid dependency count: {0}")]
    InvalidCount(i32),

    #[error("Dependency {index}: invalid port {port}")]
    InvalidPort { index: usize, port: i32 },

    #[error("Dependency {index}: cannot reach {endpoint}: {source}")]
    SwhUnreachable {
        index: usize,
        endpoint: String,
        source: WireError,
    },

    #[error("Dependency {index}: I/O with {endpoint} failed: {source}")]
    Swh {
        index: usize,
        endpoint: String,
        source: WireError,
    },

    /// The Software House refused the license.
    #[error("Dependency {index}: license rejected by {endpoint}")]
    DependencyRejected { index: usize, endpoint: String },

    #[error("Dependency {index}: {source}")]
    DependencyArtifact { index: usize, source: ArchiveError },

    #[error("Archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Invalid file count: {0}")]
    InvalidFileCount(i32),

    #[error("Received {received} of {expected} files")]
    IncompleteFiles { expected: usize, received: usize },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Developer(e) => e.kind(),
            SessionError::InvalidCount(_)
            | SessionError::InvalidPort { .. }
            | SessionError::InvalidFileCount(_)
            | SessionError::IncompleteFiles { .. } => ErrorKind::Protocol,
            SessionError::SwhUnreachable { source, .. } | SessionError::Swh { source, .. } => {
                source.kind()
            }
            SessionError::DependencyRejected { .. } => ErrorKind::InvalidLicense,
            SessionError::DependencyArtifact { source, .. } => source.kind(),
            SessionError::Archive(e) => e.kind(),
        }
    }

    /// Index of the dependency that aborted the session, if any.
    pub fn dependency_index(&self) -> Option<usize> {
        match self {
            SessionError::InvalidPort { index, .. }
            | SessionError::SwhUnreachable { index, .. }
            | SessionError::Swh { index, .. }
            | SessionError::DependencyRejected { index, .. }
            | SessionError::DependencyArtifact { index, .. } => Some(*index),
            _ => None,
        }
    }
}
