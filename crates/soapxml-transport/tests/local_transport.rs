/*
 * local_transport.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Filesystem round trips through both LocalTransport flavours.
 */

use soapxml_transport::{AsyncTransport, LocalTransport, Transport, TransportError};
use std::fs;

#[test]
fn sync_load_reads_relative_and_absolute_paths() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("service.wsdl"), b"<definitions/>").unwrap();

    let transport = LocalTransport::with_base_dir(temp.path());
    assert_eq!(
        Transport::load(&transport, "service.wsdl").unwrap(),
        b"<definitions/>"
    );

    let absolute = temp.path().join("service.wsdl");
    let transport = LocalTransport::new();
    assert_eq!(
        Transport::load(&transport, absolute.to_str().unwrap()).unwrap(),
        b"<definitions/>"
    );
}

#[tokio::test]
async fn async_load_reads_file_urls() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("types.xsd");
    fs::write(&path, b"<schema/>").unwrap();

    let url = url::Url::from_file_path(&path).unwrap().to_string();
    let transport = LocalTransport::new();
    let content = AsyncTransport::load(&transport, &url).await.unwrap();
    assert_eq!(content, b"<schema/>");
}

#[tokio::test]
async fn async_load_reports_missing_documents() {
    let temp = tempfile::tempdir().unwrap();
    let transport = LocalTransport::with_base_dir(temp.path());
    let err = AsyncTransport::load(&transport, "nope.xsd").await.unwrap_err();
    assert!(matches!(err, TransportError::NotFound(_)));
}
