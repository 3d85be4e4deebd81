use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// An absolute detail-page URL. Two listings are the same listing when their
/// normalized forms are equal: fragment dropped, empty query dropped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingUrl(Url);

impl ListingUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", raw, e)))?;
        Self::normalize(url)
            .ok_or_else(|| ScanError::InvalidUrl(format!("{}: not an http(s) URL", raw)))
    }

    /// Resolve an anchor `href` against the page it was found on.
    pub fn resolve(base: &Url, href: &str) -> Option<Self> {
        let href = href.trim();
        // Skip empty, javascript:, mailto:, tel:, in-page anchors
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with('#')
        {
            return None;
        }

        let resolved = base.join(href).ok()?;
        Self::normalize(resolved)
    }

    fn normalize(mut url: Url) -> Option<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        if url.query() == Some("") {
            url.set_query(None);
        }
        Some(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Same listing with one more query pair appended, e.g. a tab selector.
    pub fn with_query_pair(&self, key: &str, value: &str) -> Self {
        let mut url = self.0.clone();
        url.query_pairs_mut().append_pair(key, value);
        Self(url)
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.0.as_str().contains(marker)
    }
}

impl fmt::Display for ListingUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for ListingUrl {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn base() -> Url {
        Url::parse("https://www.cbre.com/properties/search?page=2").unwrap()
    }

    #[test]
    fn test_resolve_relative_href() {
        let url = ListingUrl::resolve(&base(), "/properties/US-SMPL-1234").unwrap();
        assert_eq!(url.as_str(), "https://www.cbre.com/properties/US-SMPL-1234");
    }

    #[test]
    fn test_resolve_skips_non_navigational_hrefs() {
        for href in ["", "  ", "javascript:void(0)", "mailto:a@b.c", "tel:555", "#top"] {
            assert!(ListingUrl::resolve(&base(), href).is_none(), "{:?}", href);
        }
    }

    #[test]
    fn test_fragment_variants_share_identity() {
        let a = ListingUrl::parse("https://example.com/p/1#gallery").unwrap();
        let b = ListingUrl::parse("https://example.com/p/1#spaces").unwrap();
        let c = ListingUrl::parse("https://example.com/p/1?").unwrap();
        let set: BTreeSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_query_is_part_of_identity() {
        let a = ListingUrl::parse("https://x.com/?propertyId=1").unwrap();
        let b = ListingUrl::parse("https://x.com/?propertyId=2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        assert!(ListingUrl::parse("ftp://example.com/file").is_err());
        assert!(ListingUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_with_query_pair_appends() {
        let url = ListingUrl::parse("https://buildout.com/plugins/abc?propertyId=9").unwrap();
        assert_eq!(
            url.with_query_pair("tab", "spaces").as_str(),
            "https://buildout.com/plugins/abc?propertyId=9&tab=spaces"
        );
    }
}
