/*
 * traits.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Defines the Transport traits and supporting types for fetching documents.
 *
 * A transport owns all actual I/O. The XML loader never opens files or sockets
 * itself; it asks a transport for the bytes behind a URL:
 * - Transport: blocking fetch, used by the synchronous loader and by the
 *   import resolver during parsing
 * - AsyncTransport: suspending fetch, used by the asynchronous loader
 */

use async_trait::async_trait;
use std::io;
use std::sync::Arc;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while fetching a document
#[derive(Debug)]
pub enum TransportError {
    /// Standard I/O error
    Io(io::Error),

    /// Nothing is available at the requested URL
    NotFound(String),

    /// The transport cannot serve URLs with this scheme
    UnsupportedScheme(String),

    /// Network operation failed
    Network(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O error: {}", e),
            TransportError::NotFound(url) => write!(f, "Document not found: {}", url),
            TransportError::UnsupportedScheme(url) => {
                write!(f, "Unsupported URL scheme for this transport: {}", url)
            }
            TransportError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Blocking byte fetch for a URL.
///
/// Implementations decide which schemes they serve. Retry, timeout, caching
/// and authentication all belong here rather than in the loader: the loader
/// propagates any failure immediately.
pub trait Transport: Send + Sync {
    /// Fetch the full contents behind `url`.
    fn load(&self, url: &str) -> TransportResult<Vec<u8>>;
}

/// Suspending byte fetch for a URL.
///
/// The asynchronous loader awaits this for the top-level document. Imports
/// discovered while parsing still go through [`Transport::load`], so a type
/// used with the async loader implements both traits.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    /// Fetch the full contents behind `url`.
    async fn load(&self, url: &str) -> TransportResult<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        (**self).load(url)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        (**self).load(url)
    }
}

#[async_trait]
impl<T: AsyncTransport + ?Sized> AsyncTransport for Arc<T> {
    async fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        (**self).load(url).await
    }
}

/// Transport shared between clients
pub type SharedTransport = Arc<dyn Transport>;
