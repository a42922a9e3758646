use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building the catalog, encoding archives,
/// discovering addresses or answering requests.
#[derive(Debug, Error)]
pub enum Error {
    /// An input path could not be turned into an absolute, named entry.
    #[error("cannot resolve path {path:?}: {reason}")]
    PathResolution { path: PathBuf, reason: String },

    /// An archive member is neither a regular file nor a directory.
    #[error("unsupported file type: {0:?}")]
    UnsupportedFileType(PathBuf),

    /// Reading or opening a file failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unknown catalog name or unknown archive format.
    #[error("not found: {0}")]
    LookupNotFound(String),

    /// Public address lookup failed.
    #[error("address discovery via {endpoint} failed: {reason}")]
    AddressDiscovery { endpoint: String, reason: String },

    /// The zip container cannot represent this much data without zip64.
    #[error("archive too large: {0}")]
    ArchiveTooLarge(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status a request handler answers with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::LookupNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        status.into_response()
    }
}
