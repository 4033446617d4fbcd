use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    archive::{extract_zip, is_recognized_archive},
    error::{AcquireError, AcquireResult},
    fetch::Fetcher,
    hashing::sha256_file,
    resolver::ResourceIdentifier,
};

pub const DEFAULT_ARCHIVE_NAME: &str = "project.zip";

/// One pass of fetch, verify, extract and cleanup.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub identifier: ResourceIdentifier,
    pub staging_dir: PathBuf,
    pub archive_name: String,
    /// Defaults to `staging_dir` when `None`.
    pub extract_dir: Option<PathBuf>,
}

impl DownloadRequest {
    pub fn new(identifier: ResourceIdentifier, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            identifier,
            staging_dir: staging_dir.into(),
            archive_name: DEFAULT_ARCHIVE_NAME.into(),
            extract_dir: None,
        }
    }

    pub fn with_extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = Some(dir.into());
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.staging_dir.join(&self.archive_name)
    }

    pub fn extract_target(&self) -> PathBuf {
        self.extract_dir
            .clone()
            .unwrap_or_else(|| self.staging_dir.clone())
    }
}

/// Asked once extraction succeeded; `true` deletes the staged archive.
pub trait ConfirmCleanup {
    fn confirm_cleanup(&mut self, archive: &Path) -> bool;
}

impl ConfirmCleanup for bool {
    fn confirm_cleanup(&mut self, _archive: &Path) -> bool {
        *self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    Kept,
    /// Deletion failed; the extraction still counts as successful.
    Failed(String),
    /// The staged file was not an archive and stays where it is.
    NotApplicable,
}

#[derive(Clone, Debug)]
pub struct ExtractionResult {
    pub identifier: ResourceIdentifier,
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
    pub sha256: Option<String>,
    pub fetch_detail: String,
    pub extract_dir: Option<PathBuf>,
    /// `None` when the staged file was not a recognized archive.
    pub entries: Option<usize>,
    pub cleanup: CleanupOutcome,
}

impl ExtractionResult {
    pub fn archive_megabytes(&self) -> f64 {
        self.archive_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub struct Pipeline {
    fetcher: Box<dyn Fetcher>,
}

impl Pipeline {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher_name(&self) -> &'static str {
        self.fetcher.name()
    }

    pub async fn acquire(
        &self,
        request: &DownloadRequest,
        cleanup: &mut dyn ConfirmCleanup,
    ) -> AcquireResult<ExtractionResult> {
        fs::create_dir_all(&request.staging_dir).map_err(|e| {
            AcquireError::io("create staging dir", &request.staging_dir, e)
        })?;
        let archive = request.archive_path();
        discard_previous(&archive)?;

        let outcome = self.fetcher.fetch(&request.identifier, &archive).await;
        let archive_bytes = verify_staged(&archive).ok_or_else(|| AcquireError::Fetch {
            identifier: request.identifier.clone(),
            path: archive.clone(),
            detail: if outcome.reported_success {
                "downloader reported success but produced no file".into()
            } else {
                outcome.detail.trim().to_string()
            },
        })?;
        if !outcome.reported_success {
            tracing::warn!(
                "{} reported failure but {} exists; continuing",
                self.fetcher.name(),
                archive.display()
            );
        }
        tracing::info!("staged {} ({archive_bytes} bytes)", archive.display());

        let sha256 = match sha256_file(&archive) {
            Ok(digest) => Some(digest),
            Err(err) => {
                tracing::warn!("failed to hash {}: {err}", archive.display());
                None
            }
        };

        let mut result = ExtractionResult {
            identifier: request.identifier.clone(),
            archive_path: archive.clone(),
            archive_bytes,
            sha256,
            fetch_detail: outcome.detail,
            extract_dir: None,
            entries: None,
            cleanup: CleanupOutcome::NotApplicable,
        };

        if !is_recognized_archive(&archive) {
            tracing::warn!("{} is not a zip archive; left in place", archive.display());
            return Ok(result);
        }

        let target = request.extract_target();
        let entries = extract_blocking(archive.clone(), target.clone()).await?;
        tracing::info!("extracted {entries} entries into {}", target.display());
        result.extract_dir = Some(target);
        result.entries = Some(entries);

        result.cleanup = if cleanup.confirm_cleanup(&archive) {
            match fs::remove_file(&archive) {
                Ok(()) => CleanupOutcome::Removed,
                Err(err) => {
                    tracing::warn!("failed to remove {}: {err}", archive.display());
                    CleanupOutcome::Failed(err.to_string())
                }
            }
        } else {
            CleanupOutcome::Kept
        };

        Ok(result)
    }
}

/// Verification must only ever see bytes from the current attempt.
fn discard_previous(archive: &Path) -> AcquireResult<()> {
    match fs::remove_file(archive) {
        Ok(()) => {
            tracing::info!("removed previous {}", archive.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AcquireError::io("remove previous archive", archive, err)),
    }
}

/// Size of the staged file, or `None` when nothing usable exists.
fn verify_staged(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

async fn extract_blocking(archive: PathBuf, target: PathBuf) -> AcquireResult<usize> {
    let source_path = archive.clone();
    tokio::task::spawn_blocking(move || extract_zip(&archive, &target))
        .await
        .map_err(|join_err| AcquireError::Extract {
            archive: source_path.clone(),
            source: zip::result::ZipError::Io(std::io::Error::other(join_err)),
        })?
        .map_err(|source| AcquireError::Extract {
            archive: source_path,
            source,
        })
}
