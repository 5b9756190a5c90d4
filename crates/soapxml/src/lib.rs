/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Secure, transport-backed XML loading for SOAP/WSDL clients.
//!
//! Documents are fetched through an injected [`Transport`], parsed with
//! [`quick-xml`] into an owned [`XmlDocument`], and checked against the DTD and
//! entity policy in [`Settings`]. Entities are never expanded and every
//! external reference goes through the transport, never through direct
//! filesystem or network access.
//!
//! # Overview
//!
//! - [`load_external`] / [`load_external_async`]: fetch (or read) and parse a document
//! - [`parse_xml`]: parse bytes already in hand
//! - [`absolute_location`] / [`normalize_location`]: resolve imports against
//!   the document that names them
//!
//! # Example
//!
//! ```rust
//! use soapxml::{Error, Settings, StaticTransport, load_external};
//!
//! let transport = StaticTransport::new()
//!     .with_document("http://example.com/wsdl/service.wsdl", r#"<definitions name="svc"/>"#)
//!     .with_document(
//!         "http://example.com/wsdl/evil.xml",
//!         r#"<!DOCTYPE r [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><r>&xxe;</r>"#,
//!     );
//! let settings = Settings::default();
//! let base = Some("http://example.com/wsdl/root.wsdl");
//!
//! let doc = load_external("service.wsdl".into(), &transport, base, &settings).unwrap();
//! assert_eq!(doc.root.get_attribute("name"), Some("svc"));
//!
//! let err = load_external("evil.xml".into(), &transport, base, &settings).unwrap_err();
//! assert!(matches!(err, Error::EntitiesForbidden { .. }));
//! ```

pub mod dtd;
pub mod encoding;
pub mod error;
pub mod loader;
pub mod location;
pub mod parser;
pub mod resolver;
pub mod settings;
pub mod types;

pub use dtd::{DoctypeDecl, Dtd, DtdError, EntityDecl, parse_doctype, scan_doctype};
pub use encoding::{XmlEncoding, decode_content};
pub use error::{Error, Result};
pub use loader::{XmlSource, load_external, load_external_async};
pub use location::{absolute_location, is_relative_path, normalize_location};
pub use parser::{ParserLimits, ParserOptions, parse_xml, parse_xml_with_resolver};
pub use resolver::{ImportResolver, TransportResolver};
pub use settings::Settings;
pub use types::{DocInfo, NamespaceDecl, XmlAttribute, XmlDocument, XmlElement, XmlNode};

pub use soapxml_transport::{
    AsyncTransport, LocalTransport, StaticTransport, Transport, TransportError,
};
