//! Remote source retrieval.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::domain::entities::ImageId;
use crate::domain::errors::LoadError;
use crate::domain::ports::{ImageSource, SourceProvider};

/// Opens remote locators with connect and read timeouts.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    http_client: reqwest::Client,
}

impl RemoteFetcher {
    /// Creates a fetcher with the given timeouts.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, LoadError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| LoadError::io(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    /// Opens `locator` for reading.
    ///
    /// `http` and `https` bodies are downloaded in full; `file` URLs are
    /// streamed from disc.
    ///
    /// # Errors
    /// Returns `UnsupportedSourceType` for other schemes and `Io` for
    /// transport failures.
    pub async fn open(
        &self,
        locator: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, LoadError> {
        let url = Url::parse(locator)
            .map_err(|e| LoadError::unsupported_source(format!("invalid locator '{locator}': {e}")))?;

        match url.scheme() {
            "http" | "https" => {
                let bytes = self.download(url).await?;
                Ok(Box::new(std::io::Cursor::new(bytes)))
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| LoadError::unsupported_source(format!("invalid file url '{url}'")))?;
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| LoadError::io(format!("Failed to open {}: {e}", path.display())))?;
                Ok(Box::new(file))
            }
            other => Err(LoadError::unsupported_source(format!(
                "scheme '{other}' in '{locator}'"
            ))),
        }
    }

    async fn download(&self, url: Url) -> Result<bytes::Bytes, LoadError> {
        debug!(url = %url, "Downloading image");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::io(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoadError::io(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| LoadError::io(format!("Failed to read body: {e}")))
    }
}

/// Provider treating the id itself as the locator.
///
/// URLs are passed through; plain file-system paths become `file` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlSourceProvider;

#[async_trait]
impl SourceProvider for UrlSourceProvider {
    async fn fetch(&self, id: &ImageId) -> Result<ImageSource, LoadError> {
        if Url::parse(id.as_str()).is_ok() {
            return Ok(ImageSource::Remote(id.as_str().to_string()));
        }

        let path = tokio::fs::canonicalize(Path::new(id.as_str()))
            .await
            .map_err(|e| LoadError::io(format!("Failed to resolve '{id}': {e}")))?;
        let url = Url::from_file_path(&path)
            .map_err(|()| LoadError::unsupported_source(format!("path '{}'", path.display())))?;
        Ok(ImageSource::Remote(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_test::{assert_err, assert_ok};

    fn fetcher() -> RemoteFetcher {
        RemoteFetcher::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let result = fetcher().open("ftp://example.com/a.png").await;
        assert!(matches!(result, Err(LoadError::UnsupportedSourceType { .. })));
    }

    #[tokio::test]
    async fn test_invalid_locator() {
        let result = fetcher().open("not a url").await;
        assert!(matches!(result, Err(LoadError::UnsupportedSourceType { .. })));
    }

    #[tokio::test]
    async fn test_file_url_streams_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"pixels").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let mut reader = assert_ok!(fetcher().open(url.as_str()).await);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"pixels");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_failure() {
        let result = fetcher().open("file:///nonexistent/pixload/a.png").await;
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_provider_passes_urls_through() {
        let source =
            assert_ok!(UrlSourceProvider.fetch(&ImageId::new("https://example.com/a.png")).await);
        assert!(matches!(source, ImageSource::Remote(ref url) if url == "https://example.com/a.png"));
    }

    #[tokio::test]
    async fn test_provider_turns_paths_into_file_urls() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("b.png");
        std::fs::write(&path, b"x").unwrap();

        let source = assert_ok!(
            UrlSourceProvider
                .fetch(&ImageId::new(path.to_string_lossy().into_owned()))
                .await
        );
        assert!(matches!(source, ImageSource::Remote(ref url) if url.starts_with("file://")));
    }

    #[tokio::test]
    async fn test_provider_missing_path_fails() {
        let err = assert_err!(
            UrlSourceProvider
                .fetch(&ImageId::new("/nonexistent/pixload/c.png"))
                .await
        );
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
