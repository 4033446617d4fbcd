use std::{io, path::PathBuf};

use thiserror::Error;

use crate::resolver::ResourceIdentifier;

/// Shown with every failed download.
pub const SHARING_HINT: &str = "check that the file is shared as 'Anyone with the link'";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not find a file id in {input:?}")]
    NotFound { input: String },
}

pub type AcquireResult<T> = Result<T, AcquireError>;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Nothing usable was staged; `detail` carries what the fetcher reported.
    #[error("download of {identifier} failed: {detail}")]
    Fetch {
        identifier: ResourceIdentifier,
        path: PathBuf,
        detail: String,
    },
    /// The archive is kept on disk for inspection.
    #[error("failed to extract {}", .archive.display())]
    Extract {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{operation} failed for {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AcquireError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Pipeline stage the error belongs to, for reports and telemetry.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Extract { .. } => "extract",
            Self::Io { .. } => "io",
        }
    }
}
