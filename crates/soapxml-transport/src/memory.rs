/*
 * memory.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * StaticTransport: an in-memory URL -> bytes table.
 *
 * Used to mock the network in tests and to serve pre-fetched documents.
 * Every request is recorded so callers can assert which URLs were fetched.
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::traits::{AsyncTransport, Transport, TransportError, TransportResult};

/// In-memory transport serving fixed documents
#[derive(Debug, Default)]
pub struct StaticTransport {
    documents: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticTransport::insert`].
    pub fn with_document(mut self, url: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(url, content);
        self
    }

    /// Register `content` under `url`, replacing any previous document.
    pub fn insert(&mut self, url: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.documents.insert(url.into(), content.into());
    }

    /// URLs requested so far, in order, including ones that were not found.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn fetch(&self, url: &str) -> TransportResult<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        tracing::debug!(url, "Serving in-memory document");
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(url.to_string()))
    }
}

impl Transport for StaticTransport {
    fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        self.fetch(url)
    }
}

#[async_trait]
impl AsyncTransport for StaticTransport {
    async fn load(&self, url: &str) -> TransportResult<Vec<u8>> {
        self.fetch(url)
    }
}
