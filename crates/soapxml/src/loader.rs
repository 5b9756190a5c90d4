/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Load a document from a stream or a location, then parse it securely.
 */

use std::io::Read;

use soapxml_transport::{AsyncTransport, Transport};

use crate::error::Result;
use crate::location::absolute_location;
use crate::parser::parse_xml;
use crate::settings::Settings;
use crate::types::XmlDocument;

/// Where the bytes of a document come from.
pub enum XmlSource<'a> {
    /// A location fetched through the transport, resolved against the base URL.
    Location(&'a str),
    /// An already-open stream, read to the end. No location resolution happens.
    Stream(&'a mut (dyn Read + Send)),
}

impl<'a> XmlSource<'a> {
    pub fn stream<R: Read + Send>(reader: &'a mut R) -> Self {
        XmlSource::Stream(reader)
    }
}

impl<'a> From<&'a str> for XmlSource<'a> {
    fn from(location: &'a str) -> Self {
        XmlSource::Location(location)
    }
}

impl std::fmt::Debug for XmlSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XmlSource::Location(location) => f.debug_tuple("Location").field(location).finish(),
            XmlSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Bytes in hand, or the absolute location to fetch them from.
enum Pending {
    Content(Vec<u8>),
    Fetch(String),
}

fn prepare(source: XmlSource<'_>, base_url: Option<&str>) -> Result<Pending> {
    match source {
        XmlSource::Stream(reader) => {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            Ok(Pending::Content(content))
        }
        XmlSource::Location(location) => {
            let url = absolute_location(location, base_url);
            tracing::debug!(url = %url, "Fetching document");
            Ok(Pending::Fetch(url))
        }
    }
}

/// Load and parse a document, fetching it synchronously when given a location.
///
/// # Example
///
/// ```rust
/// use soapxml::{Settings, StaticTransport, load_external};
///
/// let transport = StaticTransport::new()
///     .with_document("http://example.com/types.xsd", "<schema/>");
/// let doc = load_external(
///     "types.xsd".into(),
///     &transport,
///     Some("http://example.com/service.wsdl"),
///     &Settings::default(),
/// )
/// .unwrap();
/// assert_eq!(doc.root.name, "schema");
/// ```
pub fn load_external<T: Transport + ?Sized>(
    source: XmlSource<'_>,
    transport: &T,
    base_url: Option<&str>,
    settings: &Settings,
) -> Result<XmlDocument> {
    let content = match prepare(source, base_url)? {
        Pending::Content(content) => content,
        Pending::Fetch(url) => Transport::load(transport, &url)?,
    };
    parse_xml(&content, transport, base_url, settings)
}

/// Asynchronous [`load_external`]: the document itself is fetched by awaiting
/// the transport.
///
/// References met while parsing (such as an external DTD subset) are still
/// fetched through the blocking [`Transport`].
pub async fn load_external_async<T: AsyncTransport + Transport + ?Sized>(
    source: XmlSource<'_>,
    transport: &T,
    base_url: Option<&str>,
    settings: &Settings,
) -> Result<XmlDocument> {
    let content = match prepare(source, base_url)? {
        Pending::Content(content) => content,
        Pending::Fetch(url) => AsyncTransport::load(transport, &url).await?,
    };
    parse_xml(&content, transport, base_url, settings)
}
