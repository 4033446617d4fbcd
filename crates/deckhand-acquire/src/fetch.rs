use std::{fmt, io, path::Path, str::FromStr};

use async_trait::async_trait;
use deckhand_util::run_command;
use futures_util::StreamExt;
use reqwest::{header::CONTENT_TYPE, Client};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::resolver::ResourceIdentifier;

pub const DEFAULT_DOWNLOAD_BASE: &str = "https://drive.google.com/uc";
pub const DEFAULT_HELPER_PROGRAM: &str = "gdown";

/// How the archive is pulled from the storage provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Stream the direct-download endpoint with reqwest.
    #[default]
    Http,
    /// Delegate to an external helper that handles large-file confirmation pages.
    Helper,
}

impl FetchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Helper => "helper",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" | "direct" => Ok(Self::Http),
            "helper" | "gdown" => Ok(Self::Helper),
            other => Err(format!("unknown fetch strategy {other:?} (expected http or helper)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub strategy: FetchStrategy,
    pub base_url: String,
    /// Adds `confirm=t` so the provider skips its virus-scan interstitial.
    pub confirm_bypass: bool,
    pub helper_program: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::Http,
            base_url: DEFAULT_DOWNLOAD_BASE.into(),
            confirm_bypass: true,
            helper_program: DEFAULT_HELPER_PROGRAM.into(),
        }
    }
}

impl FetchConfig {
    pub fn direct_url(&self, id: &ResourceIdentifier) -> String {
        let base = self.base_url.trim_end_matches('?');
        if self.confirm_bypass {
            format!("{base}?export=download&confirm=t&id={id}")
        } else {
            format!("{base}?export=download&id={id}")
        }
    }

    pub fn helper_url(&self, id: &ResourceIdentifier) -> String {
        format!("{}?id={id}", self.base_url.trim_end_matches('?'))
    }
}

/// What a fetcher claims happened. The pipeline verifies the file itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub reported_success: bool,
    pub detail: String,
}

impl FetchOutcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            reported_success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            reported_success: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, id: &ResourceIdentifier, dest: &Path) -> FetchOutcome;
}

pub fn build_fetcher(config: &FetchConfig) -> Box<dyn Fetcher> {
    match config.strategy {
        FetchStrategy::Http => Box::new(HttpFetcher::new(config.clone())),
        FetchStrategy::Helper => Box::new(HelperFetcher::new(config.clone())),
    }
}

pub struct HttpFetcher {
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, String> {
        let client = Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;

        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("server answered {}", resp.status()));
        }
        if content_type_is_html(resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())) {
            return Err("provider returned an HTML page instead of the file".into());
        }

        let tmp = dest.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let result = stream_to_file(resp, &tmp).await;
        match result {
            Ok(written) => {
                tokio::fs::rename(&tmp, dest)
                    .await
                    .map_err(|e| format!("failed to finalize download: {e}"))?;
                Ok(written)
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(err)
            }
        }
    }
}

async fn stream_to_file(resp: reqwest::Response, tmp: &Path) -> Result<u64, String> {
    let mut file = tokio::fs::File::create(tmp)
        .await
        .map_err(|e| format!("failed to create {}: {e}", tmp.display()))?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("download read failed: {e}"))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("failed to write {}: {e}", tmp.display()))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| format!("failed to flush {}: {e}", tmp.display()))?;
    Ok(written)
}

fn content_type_is_html(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, id: &ResourceIdentifier, dest: &Path) -> FetchOutcome {
        let url = self.config.direct_url(id);
        tracing::info!("downloading {url} to {}", dest.display());
        match self.download(&url, dest).await {
            Ok(bytes) => FetchOutcome::ok(format!("received {bytes} bytes")),
            Err(detail) => {
                tracing::warn!("http download failed: {detail}");
                FetchOutcome::failed(detail)
            }
        }
    }
}

/// Runs `<helper> <url> -O <dest>`; gdown follows the confirmation flow itself.
pub struct HelperFetcher {
    config: FetchConfig,
}

impl HelperFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Fetcher for HelperFetcher {
    fn name(&self) -> &'static str {
        "helper"
    }

    async fn fetch(&self, id: &ResourceIdentifier, dest: &Path) -> FetchOutcome {
        let url = self.config.helper_url(id);
        let program = self.config.helper_program.as_str();
        tracing::info!("delegating download of {url} to {program}");
        let dest_arg = dest.to_string_lossy().to_string();
        match run_command(program, [url.as_str(), "-O", dest_arg.as_str()]).await {
            Ok(output) if output.success => FetchOutcome::ok(output.combined()),
            Ok(output) => FetchOutcome::failed(format!(
                "{program} exited with {}: {}",
                output.code,
                output.combined().trim()
            )),
            Err(err) if err.kind() == io::ErrorKind::NotFound => FetchOutcome::failed(format!(
                "{program} is not installed; install dependencies first"
            )),
            Err(err) => FetchOutcome::failed(format!("failed to run {program}: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt, net::TcpListener};

    use super::*;

    fn id() -> ResourceIdentifier {
        ResourceIdentifier::new("1k1TS7j5jv05xo_mBqU1kitYPyOIJDkJv").unwrap()
    }

    /// Answers a single request with a canned response and returns the base url.
    ///
    /// `declared_len` lets a test announce more bytes than it sends.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
        declared_len: Option<usize>,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                declared_len.unwrap_or(body.len())
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/uc")
    }

    fn http_fetcher(base_url: String) -> HttpFetcher {
        HttpFetcher::new(FetchConfig {
            base_url,
            ..FetchConfig::default()
        })
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn http_body_lands_at_destination() {
        let body = b"PK\x03\x04 fake zip payload".to_vec();
        let base = serve_once("200 OK", "application/zip", body.clone(), None).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("project.zip");

        let outcome = http_fetcher(base).fetch(&id(), &dest).await;
        assert!(outcome.reported_success, "{}", outcome.detail);
        assert_eq!(outcome.detail, format!("received {} bytes", body.len()));
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(leftovers(dir.path()), vec!["project.zip".to_string()]);
    }

    #[tokio::test]
    async fn html_interstitial_leaves_nothing_behind() {
        let body = b"<html>Google Drive can't scan this file</html>".to_vec();
        let base = serve_once("200 OK", "text/html; charset=utf-8", body, None).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("project.zip");

        let outcome = http_fetcher(base).fetch(&id(), &dest).await;
        assert!(!outcome.reported_success);
        assert!(outcome.detail.contains("HTML"));
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn error_status_is_a_failed_fetch() {
        let base = serve_once("404 Not Found", "text/plain", b"gone".to_vec(), None).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("project.zip");

        let outcome = http_fetcher(base).fetch(&id(), &dest).await;
        assert!(!outcome.reported_success);
        assert!(outcome.detail.contains("404"));
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn truncated_body_removes_temp_file() {
        let base = serve_once("200 OK", "application/zip", b"partial".to_vec(), Some(4096)).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("project.zip");

        let outcome = http_fetcher(base).fetch(&id(), &dest).await;
        assert!(!outcome.reported_success);
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn direct_url_carries_confirmation_bypass() {
        let config = FetchConfig::default();
        assert_eq!(
            config.direct_url(&id()),
            "https://drive.google.com/uc?export=download&confirm=t&id=1k1TS7j5jv05xo_mBqU1kitYPyOIJDkJv"
        );

        let config = FetchConfig {
            confirm_bypass: false,
            ..FetchConfig::default()
        };
        assert!(!config.direct_url(&id()).contains("confirm="));
    }

    #[test]
    fn helper_url_is_the_plain_endpoint() {
        assert_eq!(
            FetchConfig::default().helper_url(&id()),
            "https://drive.google.com/uc?id=1k1TS7j5jv05xo_mBqU1kitYPyOIJDkJv"
        );
    }

    #[test]
    fn strategy_parses_aliases() {
        assert_eq!("HTTP".parse::<FetchStrategy>(), Ok(FetchStrategy::Http));
        assert_eq!("gdown".parse::<FetchStrategy>(), Ok(FetchStrategy::Helper));
        assert!("ftp".parse::<FetchStrategy>().is_err());
        assert_eq!(FetchStrategy::Helper.to_string(), "helper");
    }

    #[test]
    fn build_fetcher_honors_strategy() {
        let helper = build_fetcher(&FetchConfig {
            strategy: FetchStrategy::Helper,
            ..FetchConfig::default()
        });
        assert_eq!(helper.name(), "helper");
        assert_eq!(build_fetcher(&FetchConfig::default()).name(), "http");
    }

    #[test]
    fn html_responses_are_detected() {
        assert!(content_type_is_html(Some("text/html; charset=utf-8")));
        assert!(!content_type_is_html(Some("application/zip")));
        assert!(!content_type_is_html(None));
    }

    #[tokio::test]
    async fn missing_helper_reports_failure_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("project.zip");
        let fetcher = HelperFetcher::new(FetchConfig {
            helper_program: "deckhand-missing-helper".into(),
            ..FetchConfig::default()
        });
        let outcome = fetcher.fetch(&id(), &dest).await;
        assert!(!outcome.reported_success);
        assert!(outcome.detail.contains("not installed"));
        assert!(!dest.exists());
    }
}
