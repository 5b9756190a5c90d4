/*
 * location.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Absolute/normalized locations for documents and their imports.
 *
 * Documents reference each other through relative paths, relative URLs or
 * absolute URLs nested arbitrarily deep. Each import is resolved against the
 * location of the document that names it, so these functions are pure and
 * idempotent on already-absolute input.
 */

use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::settings::Settings;

/// Schemes that make a location absolute.
const ABSOLUTE_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Symlink hops followed before giving up on a path.
const MAX_SYMLINK_HOPS: usize = 40;

/// The RFC 3986 scheme of `value`, if it has one.
pub(crate) fn url_scheme(value: &str) -> Option<&str> {
    let (scheme, _) = value.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

pub(crate) fn has_scheme(value: &str, schemes: &[&str]) -> bool {
    url_scheme(value).is_some_and(|scheme| schemes.iter().any(|s| scheme.eq_ignore_ascii_case(s)))
}

/// Make `location` absolute using `base`.
///
/// - equal to `base`, or already carrying an `http`/`https`/`file` scheme:
///   returned unchanged
/// - `base` is a URL: RFC 3986 join
/// - `base` is a filesystem path: `location` is taken relative to the directory
///   containing `base` and canonicalized (symlinks resolved, `.`/`..` collapsed)
///
/// An empty `base` counts as no base.
///
/// ```rust
/// use soapxml::absolute_location;
///
/// assert_eq!(
///     absolute_location("a/b.xsd", Some("http://host/dir/root.wsdl")),
///     "http://host/dir/a/b.xsd"
/// );
/// ```
pub fn absolute_location(location: &str, base: Option<&str>) -> String {
    let base = base.filter(|base| !base.is_empty());
    if base == Some(location) || has_scheme(location, &ABSOLUTE_SCHEMES) {
        return location.to_string();
    }

    match base {
        Some(base) if has_scheme(base, &ABSOLUTE_SCHEMES) => join_url(base, location),
        Some(base) => {
            let path = Path::new(location);
            if path.is_absolute() {
                return location.to_string();
            }
            let dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
            realpath(&dir.join(path)).to_string_lossy().into_owned()
        }
        None => location.to_string(),
    }
}

fn join_url(base: &str, location: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(location)) {
        Ok(joined) => joined.into(),
        Err(err) => {
            tracing::debug!(base, location, error = %err, "Cannot join location onto base URL");
            location.to_string()
        }
    }
}

/// Make `url` absolute and apply the https upgrade policy.
///
/// With `force_https`, a location on the same host as `base` but with a
/// different scheme is rewritten to `https`; everything after the scheme is
/// kept verbatim.
pub fn normalize_location(settings: &Settings, url: &str, base: Option<&str>) -> String {
    let Some(base) = base.filter(|base| !base.is_empty()) else {
        return url.to_string();
    };
    let url = absolute_location(url, Some(base));
    if !settings.force_https {
        return url;
    }

    match (split_authority(base), split_authority(&url)) {
        (Some((base_scheme, base_host)), Some((scheme, host)))
            if base_host.eq_ignore_ascii_case(host)
                && !base_scheme.eq_ignore_ascii_case(scheme) =>
        {
            tracing::debug!(url = %url, base, "Upgrading location to https");
            format!("https{}", &url[scheme.len()..])
        }
        _ => url,
    }
}

/// Scheme and non-empty authority of a URL.
fn split_authority(value: &str) -> Option<(&str, &str)> {
    let scheme = url_scheme(value)?;
    let rest = value[scheme.len() + 1..].strip_prefix("//")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    (!authority.is_empty()).then_some((scheme, authority))
}

/// Whether `value` is a relative path rather than a URL or absolute path.
pub fn is_relative_path(value: &str) -> bool {
    if has_scheme(value, &ABSOLUTE_SCHEMES) {
        return false;
    }
    !Path::new(value).is_absolute()
}

/// Canonicalize `path` without requiring it to exist.
///
/// Components are resolved left to right: symlinks that exist are followed
/// and `..` applies to the resolved prefix.
fn realpath(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut resolved = PathBuf::new();
    let mut hops = 0;
    resolve_components(&mut resolved, &absolute, &mut hops);
    resolved
}

fn resolve_components(resolved: &mut PathBuf, path: &Path, hops: &mut usize) {
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => *resolved = PathBuf::from(prefix.as_os_str()),
            Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if *hops >= MAX_SYMLINK_HOPS {
                    continue;
                }
                if let Ok(target) = std::fs::read_link(&*resolved) {
                    *hops += 1;
                    resolved.pop();
                    if target.has_root() {
                        *resolved = PathBuf::new();
                    }
                    resolve_components(resolved, &target, hops);
                }
            }
        }
    }
}
