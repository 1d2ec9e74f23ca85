use std::path::PathBuf;
use std::time::Duration;

use forage_core::error::AppError;
use futures::StreamExt;
use futures::stream;
use sha2::{Digest, Sha256};

use crate::browser::DEFAULT_USER_AGENT;

/// What happened to one media URL.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub url: String,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }
}

/// Concurrent media downloader with a hard in-flight limit.
///
/// One shared HTTP client, `buffer_unordered(max_concurrent)` for the
/// fan-out bound. A failed item is reported in its outcome and never
/// aborts the rest of the batch.
pub struct MediaDownloader {
    client: reqwest::Client,
    dest: PathBuf,
    max_concurrent: usize,
}

impl MediaDownloader {
    pub fn new(dest: impl Into<PathBuf>, max_concurrent: usize) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| AppError::Generic(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            dest: dest.into(),
            max_concurrent: max_concurrent.max(1),
        })
    }

    /// Download every URL into the destination directory, at most
    /// `max_concurrent` in flight.
    pub async fn download_all(&self, urls: &[String]) -> Vec<DownloadOutcome> {
        if urls.is_empty() {
            return Vec::new();
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.dest).await {
            let error = format!("cannot create {}: {e}", self.dest.display());
            return urls
                .iter()
                .map(|url| DownloadOutcome {
                    url: url.clone(),
                    path: None,
                    error: Some(error.clone()),
                })
                .collect();
        }

        tracing::info!(
            count = urls.len(),
            max_concurrent = self.max_concurrent,
            dest = %self.dest.display(),
            "Downloading media"
        );

        stream::iter(urls.iter().cloned())
            .map(|url| self.download_one(url))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    async fn download_one(&self, url: String) -> DownloadOutcome {
        match self.fetch_to_disk(&url).await {
            Ok(path) => {
                tracing::debug!(%url, path = %path.display(), "Media downloaded");
                DownloadOutcome {
                    url,
                    path: Some(path),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Media download failed");
                DownloadOutcome {
                    url,
                    path: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn fetch_to_disk(&self, url: &str) -> Result<PathBuf, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::Generic(format!("request failed: {e}")))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Generic(format!("body read failed: {e}")))?;

        let path = self.dest.join(filename_for(url, content_type.as_deref()));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

/// Content-addressed filename: truncated sha256 of the URL plus a
/// best-effort extension. Untrusted URL text never reaches the path.
fn filename_for(url: &str, content_type: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{}.{}", &hash[..16], extension_for(url, content_type))
}

fn extension_for(url: &str, content_type: Option<&str>) -> &'static str {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        match ct {
            "image/jpeg" => return "jpg",
            "image/png" => return "png",
            "image/gif" => return "gif",
            "image/webp" => return "webp",
            "video/mp4" => return "mp4",
            "video/webm" => return "webm",
            _ => {}
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    for ext in ["jpeg", "jpg", "png", "gif", "webp", "mp4", "webm"] {
        if path.ends_with(&format!(".{ext}")) {
            return ext;
        }
    }
    "bin"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_is_stable_and_distinct() {
        let a1 = filename_for("https://cdn.example.com/a.jpg", None);
        let a2 = filename_for("https://cdn.example.com/a.jpg", None);
        let b = filename_for("https://cdn.example.com/b.jpg", None);
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.ends_with(".jpg"));
    }

    #[test]
    fn test_extension_prefers_content_type() {
        assert_eq!(
            extension_for("https://x.test/file", Some("image/png")),
            "png"
        );
        assert_eq!(
            extension_for("https://x.test/file.jpg", Some("video/mp4; codecs=avc1")),
            "mp4"
        );
    }

    #[test]
    fn test_extension_falls_back_to_url_suffix() {
        assert_eq!(extension_for("https://x.test/photo.PNG?w=640", None), "png");
        assert_eq!(extension_for("https://x.test/clip.webm#t=5", None), "webm");
        assert_eq!(extension_for("https://x.test/opaque", None), "bin");
    }

    #[tokio::test]
    async fn test_download_all_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = MediaDownloader::new(dir.path(), 4).unwrap();
        assert!(downloader.download_all(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_url_reports_error_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = MediaDownloader::new(dir.path(), 2).unwrap();

        // Closed local port: connection is refused immediately, no real traffic.
        let urls = vec!["http://127.0.0.1:9/a.jpg".to_string()];
        let outcomes = downloader.download_all(&urls).await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[0].error.is_some());
    }
}
