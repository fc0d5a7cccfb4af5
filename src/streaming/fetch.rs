//! Fetch and decode collaborators
//!
//! The streaming engine never does I/O or parsing of payload formats itself.
//! A [`Fetcher`] turns a URI into bytes and a [`Decoder`] turns bytes into
//! whatever the renderer wants to keep resident.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use crate::core::TileError;
use crate::tileset::{ContentKind, TilesetDocument};

use super::config::FetchOptions;

/// Boxed future returned by [`Fetcher::fetch`]
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, TileError>> + Send>>;

/// Retrieves raw bytes for a content URI
///
/// Failures are reported as [`TileError::Network`].
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, uri: &str, options: &FetchOptions) -> FetchFuture;
}

/// Output of a successful decode
#[derive(Debug)]
pub struct Decoded<P> {
    pub payload: P,
    /// Resident size charged against the cache budget
    pub byte_size: usize,
}

/// Turns fetched bytes into a renderable payload
///
/// Runs on the blocking thread pool. Failures are reported as
/// [`TileError::Decode`].
pub trait Decoder: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn decode(&self, bytes: &[u8], kind: &ContentKind) -> Result<Decoded<Self::Payload>, TileError>;
}

/// Content produced by a finished request
#[derive(Debug)]
pub enum LoadedContent<P> {
    /// Decoded payload ready to become resident
    Renderable { payload: P, byte_size: usize },
    /// Parsed external tileset, to be attached below the requesting tile
    Tileset(TilesetDocument),
}

/// Reads content from the local filesystem
///
/// Relative URIs are resolved against `root`; `file://` prefixes are
/// stripped.
#[derive(Clone, Debug)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a content URI
    pub fn path_for(&self, uri: &str) -> PathBuf {
        let stripped = uri.strip_prefix("file://").unwrap_or(uri);
        // Query strings and fragments mean nothing on disk
        let stripped = stripped.split(['?', '#']).next().unwrap_or(stripped);
        let path = Path::new(stripped);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, uri: &str, options: &FetchOptions) -> FetchFuture {
        let path = self.path_for(uri);
        let uri = uri.to_string();
        let timeout = options.timeout_ms.map(Duration::from_millis);
        Box::pin(async move {
            let read = tokio::fs::read(&path);
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| TileError::Network(format!("{uri}: timed out after {}ms", limit.as_millis())))?,
                None => read.await,
            };
            result.map_err(|e| TileError::Network(format!("{uri}: {e}")))
        })
    }
}

/// Keeps fetched bytes as they are
///
/// Useful for tools that only care about residency, not rendering.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesDecoder;

impl Decoder for BytesDecoder {
    type Payload = Vec<u8>;

    fn decode(&self, bytes: &[u8], _kind: &ContentKind) -> Result<Decoded<Vec<u8>>, TileError> {
        if bytes.is_empty() {
            return Err(TileError::Decode("empty payload".into()));
        }
        Ok(Decoded { payload: bytes.to_vec(), byte_size: bytes.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for() {
        let fetcher = FileFetcher::new("/data/tiles");
        assert_eq!(fetcher.path_for("0/1.b3dm"), PathBuf::from("/data/tiles/0/1.b3dm"));
        assert_eq!(fetcher.path_for("file:///abs/t.json"), PathBuf::from("/abs/t.json"));
        assert_eq!(fetcher.path_for("a.glb?v=3"), PathBuf::from("/data/tiles/a.glb"));
    }

    #[tokio::test]
    async fn test_file_fetcher_reads_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tile.b3dm"), b"payload").unwrap();
        let fetcher = FileFetcher::new(dir.path());
        let options = FetchOptions::default();

        let bytes = fetcher.fetch("tile.b3dm", &options).await.unwrap();
        assert_eq!(bytes, b"payload");

        let err = fetcher.fetch("missing.b3dm", &options).await.unwrap_err();
        assert!(matches!(err, TileError::Network(_)));
    }

    #[test]
    fn test_bytes_decoder() {
        let decoded = BytesDecoder.decode(b"abc", &ContentKind::Batched).unwrap();
        assert_eq!(decoded.byte_size, 3);
        assert!(BytesDecoder.decode(b"", &ContentKind::Batched).is_err());
    }
}
