/*
 * local.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * LocalTransport: serves documents from the local filesystem.
 *
 * Accepts `file://` URLs and bare filesystem paths. Relative paths are taken
 * from the optional base directory. Network schemes are refused so that a
 * document can never reach the network through this transport.
 */

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

use crate::traits::{AsyncTransport, Transport, TransportError, TransportResult};

/// Filesystem-backed transport
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    base_dir: Option<PathBuf>,
}

impl LocalTransport {
    /// Create a transport that resolves relative paths against the process CWD.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a transport that resolves relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Map a URL or path onto the file it names.
    pub fn path_for(&self, url: &str) -> TransportResult<PathBuf> {
        let lower = url.trim_start().to_ascii_lowercase();
        if lower.starts_with("http:") || lower.starts_with("https:") {
            return Err(TransportError::UnsupportedScheme(url.to_string()));
        }

        let path = if lower.starts_with("file:") {
            let parsed =
                Url::parse(url).map_err(|_| TransportError::NotFound(url.to_string()))?;
            parsed
                .to_file_path()
                .map_err(|()| TransportError::NotFound(url.to_string()))?
        } else {
            PathBuf::from(url)
        };

        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

fn not_found_as_transport_error(url: &str, path: &Path, err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::NotFound {
        tracing::debug!(url, path = %path.display(), "Local document not found");
        TransportError::NotFound(url.to_string())
    } else {
        TransportError::Io(err)
    }
}

impl Transport for LocalTransport {
    fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        let path = self.path_for(url)?;
        tracing::debug!(url, path = %path.display(), "Reading local document");
        std::fs::read(&path).map_err(|e| not_found_as_transport_error(url, &path, e))
    }
}

#[async_trait]
impl AsyncTransport for LocalTransport {
    async fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        let path = self.path_for(url)?;
        tracing::debug!(url, path = %path.display(), "Reading local document");
        tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_as_transport_error(url, &path, e))
    }
}
