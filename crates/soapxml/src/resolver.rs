/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Dereferencing of external references met during a parse.
 */

use soapxml_transport::Transport;

use crate::error::Result;
use crate::location::has_scheme;

/// Fetches the bytes behind an external reference on behalf of the parser.
///
/// Returning `Ok(None)` declines the reference; the parser then carries on
/// without it. Implementations never touch the filesystem or network
/// themselves unless that is their whole purpose.
pub trait ImportResolver {
    fn resolve(&self, url: &str, public_id: Option<&str>) -> Result<Option<Vec<u8>>>;
}

/// Closures work as one-off resolvers.
impl<F> ImportResolver for F
where
    F: Fn(&str, Option<&str>) -> Result<Option<Vec<u8>>>,
{
    fn resolve(&self, url: &str, public_id: Option<&str>) -> Result<Option<Vec<u8>>> {
        self(url, public_id)
    }
}

/// Resolver that routes `http`/`https` references through a [`Transport`].
///
/// Any other scheme, including `file` and bare paths, is declined.
pub struct TransportResolver<'t, T: Transport + ?Sized> {
    transport: &'t T,
}

impl<'t, T: Transport + ?Sized> TransportResolver<'t, T> {
    pub fn new(transport: &'t T) -> Self {
        Self { transport }
    }
}

impl<T: Transport + ?Sized> ImportResolver for TransportResolver<'_, T> {
    fn resolve(&self, url: &str, _public_id: Option<&str>) -> Result<Option<Vec<u8>>> {
        if !has_scheme(url, &["http", "https"]) {
            tracing::debug!(url, "Declining to resolve non-http reference");
            return Ok(None);
        }
        tracing::debug!(url, "Resolving external reference through transport");
        Ok(Some(self.transport.load(url)?))
    }
}
