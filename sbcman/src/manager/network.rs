//! Blocking HTTP client for bundle downloads.
//!
//! This module provides the production [`NetworkClient`]:
//! - Streaming GET downloads in fixed 8 KiB chunks
//! - HEAD-based existence and size probes
//! - Plain GET for small text documents (release feeds)

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_LENGTH;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{ManagerError, ManagerResult};
use super::traits::{NetworkClient, ProgressCallback};

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Chunk size for streaming downloads (8 KiB).
pub const CHUNK_SIZE: usize = 8 * 1024;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("SBC-Man/", env!("CARGO_PKG_VERSION"));

/// HTTP-based network client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default settings.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new HTTP client with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, timeout }
    }

    /// Request timeout in use.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stream the response body of `url` into `dest`.
    fn stream_download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> ManagerResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ManagerError::io(parent, e))?;
        }

        let mut response = self.client.get(url).send().map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {}s", self.timeout.as_secs())
            } else {
                e.to_string()
            };
            ManagerError::DownloadFailed {
                url: url.to_string(),
                reason,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        let total_size = content_length(&response).unwrap_or(0);
        let file = File::create(dest).map_err(|e| ManagerError::io(dest, e))?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut downloaded = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(ManagerError::Cancelled);
            }

            let bytes_read =
                response
                    .read(&mut buffer)
                    .map_err(|e| ManagerError::DownloadFailed {
                        url: url.to_string(),
                        reason: format!("Read error: {}", e),
                    })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| ManagerError::io(dest, e))?;

            downloaded += bytes_read as u64;
            on_progress(downloaded, total_size);
        }

        writer.flush().map_err(|e| ManagerError::io(dest, e))?;

        Ok(downloaded)
    }

    fn head(&self, url: &str) -> Option<Response> {
        match self.client.head(url).send() {
            Ok(response) if response.status().is_success() => Some(response),
            Ok(response) => {
                warn!(url, status = %response.status(), "URL not accessible");
                None
            }
            Err(e) => {
                warn!(url, error = %e, "URL not accessible");
                None
            }
        }
    }
}

/// Parse the `Content-Length` header of a response.
fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

impl NetworkClient for HttpClient {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> bool {
        info!(url, dest = %dest.display(), "Downloading");

        match self.stream_download(url, dest, on_progress, cancel) {
            Ok(bytes) => {
                info!(dest = %dest.display(), bytes, "Download complete");
                true
            }
            Err(ManagerError::Cancelled) => {
                info!(url, "Download cancelled");
                fs::remove_file(dest).ok();
                false
            }
            Err(e) => {
                error!(error = %e, "Download failed");
                fs::remove_file(dest).ok();
                false
            }
        }
    }

    fn check(&self, url: &str) -> bool {
        let accessible = self.head(url).is_some();
        if accessible {
            debug!(url, "URL accessible");
        }
        accessible
    }

    fn size(&self, url: &str) -> Option<u64> {
        let response = self.head(url)?;
        match content_length(&response) {
            Some(size) if size > 0 => {
                debug!(url, size, "Remote file size");
                Some(size)
            }
            _ => {
                warn!(url, "Missing or invalid content-length header");
                None
            }
        }
    }

    fn fetch_text(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(e) => {
                error!(url, error = %e, "GET request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            error!(url, status = %response.status(), "GET request failed");
            return None;
        }

        response
            .text()
            .map_err(|e| error!(url, error = %e, "Failed to read response body"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_default() {
        let client = HttpClient::default();
        assert_eq!(client.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_http_client_with_timeout() {
        let client = HttpClient::with_timeout(Duration::from_secs(60));
        assert_eq!(client.timeout().as_secs(), 60);
    }

    #[test]
    fn test_chunk_size_is_8k() {
        assert_eq!(CHUNK_SIZE, 8192);
    }

    #[test]
    fn test_unreachable_host_reduces_to_false() {
        let client = HttpClient::with_timeout(Duration::from_secs(2));
        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("nested/out.zip");
        let mut ticks = 0;

        let ok = client.download(
            "http://127.0.0.1:9/nothing.zip",
            &dest,
            &mut |_, _| ticks += 1,
            &CancellationToken::new(),
        );

        assert!(!ok);
        assert_eq!(ticks, 0);
        assert!(!dest.exists());
        assert!(!client.check("http://127.0.0.1:9/"));
        assert_eq!(client.size("http://127.0.0.1:9/"), None);
        assert_eq!(client.fetch_text("http://127.0.0.1:9/"), None);
    }
}
