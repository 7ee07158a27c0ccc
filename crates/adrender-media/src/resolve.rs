//! Source resolution: turning declared inputs into verified local files.
//!
//! Remote assets are streamed into a job-scoped scratch file and verified
//! non-empty before use. Local paths are used as-is when they exist.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// A source reference classified as local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef<'a> {
    /// Existing local file, used as-is
    Local(&'a str),
    /// Remote URL, downloaded to scratch
    Remote(&'a str),
}

/// Check whether a value parses as an absolute http(s) URL.
pub fn is_url_shaped(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Classify a source declaration into local vs remote.
///
/// A URL-shaped value wins even when it was placed in the path field;
/// a path only takes priority when it is not URL-shaped.
pub fn classify_source<'a>(
    path: Option<&'a str>,
    url: Option<&'a str>,
) -> MediaResult<SourceRef<'a>> {
    if let Some(p) = path {
        if is_url_shaped(p) {
            return Ok(SourceRef::Remote(p));
        }
        if Path::new(p).exists() {
            return Ok(SourceRef::Local(p));
        }
        // A declared-but-missing local path falls through to the URL if
        // one was also given.
        if url.is_none() {
            return Err(MediaError::FileNotFound(PathBuf::from(p)));
        }
    }
    match url {
        Some(u) => Ok(SourceRef::Remote(u)),
        None => Err(MediaError::download_failed(
            "<none>",
            "no source reference declared",
        )),
    }
}

/// Downloads remote sources into a scratch directory.
pub struct SourceResolver {
    client: reqwest::Client,
    scratch_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// The scratch path a given job/source index downloads to.
    ///
    /// Callers register this in the job's temp files *before* the download
    /// starts, so a partial file is still cleaned up.
    pub fn scratch_path(&self, job_id: &str, index: usize, url: &str) -> PathBuf {
        let ext = Path::new(url)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.len() <= 4 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("mp4");
        self.scratch_dir
            .join(format!("{job_id}-src{index:02}.{ext}"))
    }

    /// Stream a remote URL to `dest` and verify the result is non-empty.
    pub async fn download(&self, url: &str, dest: &Path) -> MediaResult<()> {
        info!("Downloading source {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::download_failed(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(MediaError::download_failed(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| MediaError::download_failed(url, e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        let size = tokio::fs::metadata(dest).await?.len();
        if size == 0 {
            tokio::fs::remove_file(dest).await.ok();
            return Err(MediaError::EmptyDownload {
                url: url.to_string(),
            });
        }

        debug!("Downloaded {} bytes from {}", size, url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_shape_detection() {
        assert!(is_url_shaped("https://cdn.example.com/a.mp4"));
        assert!(is_url_shaped("http://cdn.example.com/a.mp4"));
        assert!(!is_url_shaped("/data/uploads/a.mp4"));
        assert!(!is_url_shaped("a.mp4"));
        assert!(!is_url_shaped("file:///etc/passwd"));
    }

    #[test]
    fn test_url_shaped_path_field_is_remote() {
        let source = classify_source(Some("https://cdn.example.com/a.mp4"), None).unwrap();
        assert_eq!(source, SourceRef::Remote("https://cdn.example.com/a.mp4"));
    }

    #[test]
    fn test_missing_local_path_is_an_error() {
        let err = classify_source(Some("/definitely/not/here.mp4"), None).unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_download_writes_and_verifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let resolver = SourceResolver::new(dir.path());
        let url = format!("{}/a.mp4", server.uri());
        let dest = resolver.scratch_path("job-1", 0, &url);

        resolver.download(&url, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"video-bytes");
    }

    #[tokio::test]
    async fn test_download_404_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let resolver = SourceResolver::new(dir.path());
        let url = format!("{}/missing.mp4", server.uri());
        let dest = resolver.scratch_path("job-1", 1, &url);

        let err = resolver.download(&url, &dest).await.unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_empty_download_is_rejected_and_removed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let resolver = SourceResolver::new(dir.path());
        let url = format!("{}/empty.mp4", server.uri());
        let dest = resolver.scratch_path("job-1", 2, &url);

        let err = resolver.download(&url, &dest).await.unwrap_err();
        assert!(matches!(err, MediaError::EmptyDownload { .. }));
        assert!(!dest.exists());
    }
}
