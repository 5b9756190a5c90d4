/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Error types surfaced by the loader and parser.
 */

use soapxml_transport::TransportError;

/// Result type alias for soapxml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or parsing a document.
///
/// Security-policy violations and syntax errors carry enough detail for a
/// caller to report the offending declaration or content. Transport failures
/// pass through untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document declares a DOCTYPE while DTDs are forbidden.
    #[error("DTD is forbidden (doctype: {doctype})")]
    DtdForbidden {
        /// The DOCTYPE declaration, without its internal subset.
        doctype: String,
        system_url: Option<String>,
        public_id: Option<String>,
    },

    /// A DTD subset declares an entity while entities are forbidden.
    #[error("entity declarations are forbidden (entity: {name})")]
    EntitiesForbidden {
        name: String,
        /// Declared replacement text; `None` for external entities.
        content: Option<String>,
    },

    /// The content is not well-formed XML.
    #[error("Invalid XML content received ({message})")]
    XmlSyntax {
        message: String,
        /// The raw content handed to the parser.
        content: Vec<u8>,
        /// Byte offset where the error was detected, when known.
        position: Option<u64>,
    },

    /// Fetching a document failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading a caller-supplied stream failed.
    #[error("failed to read XML source: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be loaded.
    #[error("invalid settings: {message}")]
    Config { message: String },
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>, content: &[u8], position: Option<u64>) -> Self {
        Error::XmlSyntax {
            message: message.into(),
            content: content.to_vec(),
            position,
        }
    }

    /// Whether this error is a rejection by the DTD/entity policy.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Error::DtdForbidden { .. } | Error::EntitiesForbidden { .. }
        )
    }
}
