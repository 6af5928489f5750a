//! Error types for the photo indexer

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// File contents could not be read for fingerprinting
    Read,
    /// Thumbnail could not be produced
    Rendition,
    /// Path already present in the catalog
    DuplicatePath,
    /// The scan root itself is missing or unreadable
    RootUnavailable,
    /// I/O error during traversal
    IoError,
    /// Catalog operation failed
    DatabaseError,
    /// Unknown error
    Unknown,
}

impl ScanErrorKind {
    /// Whether an error of this kind ends the scan invocation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanErrorKind::RootUnavailable | ScanErrorKind::DatabaseError
        )
    }
}

/// Represents an error that occurred during scanning
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a root unavailable error
    pub fn root_unavailable(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::RootUnavailable, Some(path), message)
    }

    /// Create a database error
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::DatabaseError, None, message)
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<ReadError> for ScanError {
    fn from(err: ReadError) -> Self {
        let kind = match err.source.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::Read,
        };
        let message = err.to_string();
        Self::new(kind, Some(err.path), message)
    }
}

impl From<RenditionError> for ScanError {
    fn from(err: RenditionError) -> Self {
        Self::new(ScanErrorKind::Rendition, Some(err.path().to_path_buf()), err.to_string())
    }
}

impl From<CatalogError> for ScanError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DuplicatePath(path) => Self::new(
                ScanErrorKind::DuplicatePath,
                Some(PathBuf::from(&path)),
                format!("already indexed: {path}"),
            ),
            CatalogError::NonUtf8Path(path) => {
                let message = format!("path is not valid UTF-8: {path:?}");
                Self::new(ScanErrorKind::Read, Some(path), message)
            }
            other => Self::database_error(other.to_string()),
        }
    }
}

/// A file could not be read while computing its fingerprint
#[derive(Debug, Error)]
#[error("cannot read {path:?}: {source}")]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ReadError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// A thumbnail could not be produced for a source file
#[derive(Debug, Error)]
pub enum RenditionError {
    #[error("cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot encode thumbnail for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot write thumbnail for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenditionError {
    /// Source file the rendition was attempted for
    pub fn path(&self) -> &std::path::Path {
        match self {
            RenditionError::Decode { path, .. }
            | RenditionError::Encode { path, .. }
            | RenditionError::Io { path, .. } => path,
        }
    }
}

/// Errors returned by the catalog store
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Uniqueness violation on the path column
    #[error("path already catalogued: {0}")]
    DuplicatePath(String),
    #[error("path not catalogued: {0}")]
    NotFound(String),
    /// The path has no exact text form and cannot be a catalog key
    #[error("path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl CatalogError {
    pub fn is_duplicate_path(&self) -> bool {
        matches!(self, CatalogError::DuplicatePath(_))
    }
}

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
