/*
 * soapxml-transport
 * Copyright (c) 2025 Posit, PBC
 *
 * Transport abstraction layer for the soapxml loader.
 *
 * This crate defines the single capability the XML loader needs from the
 * outside world, "fetch the bytes behind a URL", in a blocking and an async
 * flavour, plus transports that need no network stack:
 *
 * - LocalTransport: `file://` URLs and filesystem paths
 * - StaticTransport: in-memory documents (mocking, pre-fetched content)
 *
 * HTTP clients, caching and authentication live in downstream transports
 * that implement these traits.
 */

mod local;
mod memory;
mod traits;

pub use traits::{AsyncTransport, SharedTransport, Transport, TransportError, TransportResult};

pub use local::LocalTransport;
pub use memory::StaticTransport;
