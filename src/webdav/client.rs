//! WebDAV client: collection creation, uniqueness probing, chunked PUT.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::mailbox::Attachment;
use crate::registry::ServerConfig;

use super::retry::RetryPolicy;
use super::Uploader;

/// Probing for a free remote filename gives up after this many candidates.
const MAX_NAME_PROBES: u32 = 1000;

pub struct WebDavUploader {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl WebDavUploader {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            retry,
        }
    }

    /// Create every collection on the server URL's path, tolerating ones
    /// that already exist.
    async fn ensure_collections(&self, server: &ServerConfig) -> Result<(), UploadError> {
        let url = parse_base(&server.url)?;
        let segments: Vec<String> = match url.path_segments() {
            Some(segments) => segments
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
            None => return Ok(()),
        };

        let mut collection = url.clone();
        collection.set_path("");

        for segment in segments {
            collection
                .path_segments_mut()
                .map_err(|_| UploadError::Client("server url cannot be a base".to_string()))?
                .push(&segment);

            let mkcol = Method::from_bytes(b"MKCOL")
                .map_err(|e| UploadError::Client(format!("invalid method: {}", e)))?;
            let response = self
                .http
                .request(mkcol, collection.clone())
                .basic_auth(&server.login, Some(&server.password))
                .timeout(Duration::from_secs(server.timeout_seconds))
                .send()
                .await;

            match response {
                Ok(resp) => match resp.status() {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        return Err(UploadError::Auth(format!(
                            "MKCOL {} rejected with {}",
                            collection,
                            resp.status()
                        )));
                    }
                    // Created, or the collection already exists.
                    status => {
                        debug!("MKCOL {} -> {}", collection, status);
                    }
                },
                Err(e) => {
                    debug!("MKCOL {} failed ({}); continuing", collection, e);
                }
            }
        }

        Ok(())
    }

    /// Check whether a file already exists on the store. Errors count as
    /// absent so a flaky probe cannot block the upload.
    async fn exists(&self, server: &ServerConfig, filename: &str) -> bool {
        let url = match join_url(&server.url, filename) {
            Ok(url) => url,
            Err(_) => return false,
        };

        match self
            .http
            .head(url)
            .basic_auth(&server.login, Some(&server.password))
            .timeout(Duration::from_secs(server.timeout_seconds))
            .send()
            .await
        {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    /// Find a remote filename that does not collide with an existing file,
    /// probing `name (1).ext`, `name (2).ext`, ...
    async fn find_unique_name(
        &self,
        server: &ServerConfig,
        filename: &str,
    ) -> Result<String, UploadError> {
        if !self.exists(server, filename).await {
            return Ok(filename.to_string());
        }

        for counter in 1..=MAX_NAME_PROBES {
            let candidate = numbered_candidate(filename, counter);
            if !self.exists(server, &candidate).await {
                info!("'{}' already exists; storing as '{}'", filename, candidate);
                return Ok(candidate);
            }
        }

        Err(UploadError::Client(format!(
            "no free name for '{}' after {} probes",
            filename, MAX_NAME_PROBES
        )))
    }

    async fn try_put(
        &self,
        url: &Url,
        server: &ServerConfig,
        content: &Bytes,
    ) -> Result<(), UploadError> {
        let chunk_size = (server.chunk_size_bytes as usize).max(1);
        let body = reqwest::Body::wrap_stream(futures::stream::iter(
            split_chunks(content, chunk_size)
                .into_iter()
                .map(Ok::<_, std::io::Error>),
        ));

        let response = self
            .http
            .put(url.clone())
            .basic_auth(&server.login, Some(&server.password))
            .timeout(Duration::from_secs(server.timeout_seconds))
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) => match classify_status(resp.status()) {
                None => Ok(()),
                Some(e) => Err(e),
            },
            Err(e) => Err(UploadError::Transient(e.to_string())),
        }
    }
}

#[async_trait]
impl Uploader for WebDavUploader {
    async fn upload(
        &self,
        attachment: &Attachment,
        server: &ServerConfig,
    ) -> Result<String, UploadError> {
        self.ensure_collections(server).await?;

        let remote_name = self.find_unique_name(server, &attachment.filename).await?;
        let url = join_url(&server.url, &remote_name)?;

        info!(
            "Uploading '{}' ({} bytes) to '{}'",
            attachment.filename, attachment.size_bytes, server.name
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_put(&url, server, &attachment.content).await {
                Ok(()) => {
                    info!("Upload of '{}' succeeded", remote_name);
                    return Ok(url.to_string());
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Transient failure uploading '{}' (attempt {}/{}): {}; retrying in {:?}",
                        remote_name, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        "Upload of '{}' failed after {} attempt(s): {}",
                        remote_name, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

fn parse_base(base: &str) -> Result<Url, UploadError> {
    Url::parse(base).map_err(|e| UploadError::Client(format!("invalid server url: {}", e)))
}

fn join_url(base: &str, filename: &str) -> Result<Url, UploadError> {
    let mut url = parse_base(base)?;
    url.path_segments_mut()
        .map_err(|_| UploadError::Client("server url cannot be a base".to_string()))?
        .pop_if_empty()
        .push(filename);
    Ok(url)
}

/// `report.pdf` -> `report (1).pdf`; extensionless names get the suffix
/// appended.
fn numbered_candidate(filename: &str, counter: u32) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => {
            let (stem, ext) = filename.split_at(idx);
            format!("{} ({}){}", stem, counter, ext)
        }
        _ => format!("{} ({})", filename, counter),
    }
}

fn split_chunks(content: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..content.len())
        .step_by(chunk_size)
        .map(|start| content.slice(start..usize::min(start + chunk_size, content.len())))
        .collect()
}

/// Map a response status to the transfer taxonomy; `None` means success.
fn classify_status(status: StatusCode) -> Option<UploadError> {
    if status.is_success() {
        return None;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Some(UploadError::Auth(format!("status {}", status)))
        }
        StatusCode::INSUFFICIENT_STORAGE => Some(UploadError::StorageFull),
        s if s.is_client_error() => Some(UploadError::Client(format!("status {}", s))),
        s => Some(UploadError::Transient(format!("status {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_candidate() {
        assert_eq!(numbered_candidate("report.pdf", 1), "report (1).pdf");
        assert_eq!(numbered_candidate("dump.sql.gz", 3), "dump.sql (3).gz");
        assert_eq!(numbered_candidate("README", 2), "README (2)");
        assert_eq!(numbered_candidate(".env", 1), ".env (1)");
    }

    #[test]
    fn test_split_chunks() {
        let content = Bytes::from_static(b"abcdefghij");
        let chunks = split_chunks(&content, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0][..], b"abcd");
        assert_eq!(&chunks[2][..], b"ij");

        assert!(split_chunks(&Bytes::new(), 4).is_empty());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::CREATED).is_none());
        assert!(classify_status(StatusCode::NO_CONTENT).is_none());
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(UploadError::Auth(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::INSUFFICIENT_STORAGE),
            Some(UploadError::StorageFull)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Some(UploadError::Client(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(UploadError::Transient(_))
        ));
    }

    #[test]
    fn test_join_url_encodes_segments() {
        let url = join_url("https://dav.example.com/backups/", "report (1).pdf").unwrap();
        assert_eq!(
            url.as_str(),
            "https://dav.example.com/backups/report%20(1).pdf"
        );
    }
}
