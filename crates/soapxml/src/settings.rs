/*
 * settings.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Parse and load settings shared by every call of a client session.
 */

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Options controlling how documents are parsed and where they may be fetched from.
///
/// A `Settings` value is created once per client and passed by reference into
/// every parse/load call; nothing in this crate mutates it. Every key is
/// optional when loading from TOML:
///
/// ```rust
/// use soapxml::Settings;
///
/// let settings = Settings::from_toml_str("strict = false\nforbid_dtd = true").unwrap();
/// assert!(!settings.strict);
/// assert!(settings.forbid_dtd);
/// assert!(settings.forbid_entities);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Abort on any syntax error. When false the parser recovers and returns a
    /// best-effort tree.
    pub strict: bool,

    /// Reject documents that carry a DOCTYPE declaration.
    pub forbid_dtd: bool,

    /// Reject documents whose DTD subsets declare any entity.
    pub forbid_entities: bool,

    /// Never fetch the external subset named by a DOCTYPE.
    pub forbid_external: bool,

    /// Relax the depth and size limits that guard against oversized documents.
    pub xml_huge_tree: bool,

    /// Upgrade a location to https when its base shares the host but not the scheme.
    pub force_https: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict: true,
            forbid_dtd: false,
            forbid_entities: true,
            forbid_external: true,
            xml_huge_tree: false,
            force_https: true,
        }
    }
}

impl Settings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_forbid_dtd(mut self, forbid_dtd: bool) -> Self {
        self.forbid_dtd = forbid_dtd;
        self
    }

    pub fn with_forbid_entities(mut self, forbid_entities: bool) -> Self {
        self.forbid_entities = forbid_entities;
        self
    }

    pub fn with_forbid_external(mut self, forbid_external: bool) -> Self {
        self.forbid_external = forbid_external;
        self
    }

    pub fn with_xml_huge_tree(mut self, xml_huge_tree: bool) -> Self {
        self.xml_huge_tree = xml_huge_tree;
        self
    }

    pub fn with_force_https(mut self, force_https: bool) -> Self {
        self.force_https = force_https;
        self
    }
}
