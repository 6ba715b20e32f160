//! Bundle resource lookup.
//!
//! Resources from every bundle are merged into one path-keyed map. Callers
//! read them through [`ResourceResolver::open`], or address them with
//! `hearth-bundle://resources/<path>` URLs.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use url::Url;

use crate::error::{PluginError, PluginResult};

/// URL scheme of bundle resources.
pub const RESOURCE_SCHEME: &str = "hearth-bundle";

/// URL host of bundle resources.
pub const RESOURCE_HOST: &str = "resources";

/// Build the URL addressing resource `path`. Each `/`-separated segment is
/// percent-encoded, `%` included, so distinct paths never share a URL.
///
/// # Errors
///
/// Returns [`PluginError::InvalidResourceUrl`] if the path cannot form a URL.
pub fn resource_url(path: &str) -> PluginResult<Url> {
    let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
    Url::parse(&format!(
        "{RESOURCE_SCHEME}://{RESOURCE_HOST}/{}",
        encoded.join("/")
    ))
    .map_err(|e| PluginError::InvalidResourceUrl(e.to_string()))
}

/// The resource path a bundle URL addresses.
fn resource_path(url: &Url) -> PluginResult<String> {
    if url.scheme() != RESOURCE_SCHEME || url.host_str() != Some(RESOURCE_HOST) {
        return Err(PluginError::InvalidResourceUrl(url.to_string()));
    }
    urlencoding::decode(url.path().trim_start_matches('/'))
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| PluginError::InvalidResourceUrl(format!("{url}: {e}")))
}

/// Read-only, path-keyed view of all bundle resources.
///
/// Cloning is cheap; all clones share the same bytes.
#[derive(Debug, Clone, Default)]
pub struct ResourceResolver {
    entries: Arc<HashMap<String, Arc<[u8]>>>,
}

impl ResourceResolver {
    /// Build a resolver over merged resources.
    #[must_use]
    pub fn new(resources: HashMap<String, Vec<u8>>) -> Self {
        let entries: HashMap<String, Arc<[u8]>> = resources
            .into_iter()
            .map(|(path, bytes)| (path, Arc::from(bytes)))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Open the resource at `path` as a seekable reader.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ResourceNotFound`] if no bundle ships `path`.
    pub fn open(&self, path: &str) -> PluginResult<Cursor<Arc<[u8]>>> {
        self.bytes(path)
            .map(Cursor::new)
            .ok_or_else(|| PluginError::ResourceNotFound(path.to_owned()))
    }

    /// The bytes of the resource at `path`.
    #[must_use]
    pub fn bytes(&self, path: &str) -> Option<Arc<[u8]>> {
        self.entries.get(path).cloned()
    }

    /// Read the resource at `path` as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ResourceNotFound`] if no bundle ships `path`, or
    /// [`PluginError::ArchiveError`] if it is not valid UTF-8.
    pub fn read_to_string(&self, path: &str) -> PluginResult<String> {
        let bytes = self
            .bytes(path)
            .ok_or_else(|| PluginError::ResourceNotFound(path.to_owned()))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| PluginError::ArchiveError {
            path: path.to_owned(),
            message: e.to_string(),
        })
    }

    /// The URL addressing `path`, or `None` if no bundle ships it.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<Url> {
        if !self.contains(path) {
            tracing::debug!(path, "Resource not found");
            return None;
        }
        resource_url(path).ok()
    }

    /// Open the resource addressed by `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidResourceUrl`] for URLs outside the bundle
    /// scheme or with a malformed path, and [`PluginError::ResourceNotFound`]
    /// for unknown paths.
    pub fn open_url(&self, url: &Url) -> PluginResult<Cursor<Arc<[u8]>>> {
        self.open(&resource_path(url)?)
    }

    /// Whether a bundle ships `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// All resource paths, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom};

    use super::*;

    fn resolver() -> ResourceResolver {
        let mut map = HashMap::new();
        map.insert("sample/twin/stringA.txt".to_owned(), b"abc".to_vec());
        map.insert("docs/read me.txt".to_owned(), b"spaced".to_vec());
        ResourceResolver::new(map)
    }

    #[test]
    fn open_returns_seekable_reader() {
        let mut reader = resolver().open("sample/twin/stringA.txt").unwrap();
        reader.seek(SeekFrom::Start(1)).unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "bc");
    }

    #[test]
    fn unknown_path_is_resource_not_found() {
        let err = resolver().open("missing.txt").unwrap_err();
        assert!(matches!(err, PluginError::ResourceNotFound(ref p) if p == "missing.txt"));
        assert!(resolver().find("missing.txt").is_none());
    }

    #[test]
    fn urls_use_bundle_scheme() {
        let url = resolver().find("sample/twin/stringA.txt").unwrap();
        assert_eq!(url.as_str(), "hearth-bundle://resources/sample/twin/stringA.txt");
        assert_eq!(resolver().read_to_string("sample/twin/stringA.txt").unwrap(), "abc");
    }

    #[test]
    fn encoded_urls_resolve_to_raw_path() {
        let resolver = resolver();
        let url = resolver.find("docs/read me.txt").unwrap();
        let mut text = String::new();
        resolver.open_url(&url).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "spaced");
    }

    #[test]
    fn literal_percent_paths_keep_their_own_urls() {
        let mut map = HashMap::new();
        map.insert("docs/a%20b".to_owned(), b"literal".to_vec());
        map.insert("docs/a b".to_owned(), b"spaced".to_vec());
        let resolver = ResourceResolver::new(map);

        let literal = resolver.find("docs/a%20b").unwrap();
        let spaced = resolver.find("docs/a b").unwrap();
        assert_ne!(literal, spaced);

        let mut text = String::new();
        resolver.open_url(&literal).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "literal");
        text.clear();
        resolver.open_url(&spaced).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "spaced");
    }

    #[test]
    fn foreign_urls_are_rejected() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        let err = resolver().open_url(&url).unwrap_err();
        assert!(matches!(err, PluginError::InvalidResourceUrl(_)));
    }
}
