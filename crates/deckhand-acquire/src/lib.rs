//! Turns an operator-supplied share link into an unpacked project tree.
//!
//! [`resolve`] extracts the file id, then [`Pipeline::acquire`] fetches the
//! archive into a staging directory, checks it actually landed on disk,
//! unpacks it and optionally removes the staged copy.

mod archive;
mod error;
mod fetch;
mod hashing;
mod pipeline;
mod resolver;

pub use archive::is_recognized_archive;
pub use error::{AcquireError, AcquireResult, ResolveError, SHARING_HINT};
pub use fetch::{
    build_fetcher, FetchConfig, FetchOutcome, FetchStrategy, Fetcher, HelperFetcher, HttpFetcher,
    DEFAULT_DOWNLOAD_BASE, DEFAULT_HELPER_PROGRAM,
};
pub use pipeline::{
    CleanupOutcome, ConfirmCleanup, DownloadRequest, ExtractionResult, Pipeline,
    DEFAULT_ARCHIVE_NAME,
};
pub use resolver::{resolve, ResourceIdentifier, EXAMPLE_INPUTS, TOKEN_LEN};
