//! Listings from the public `api.deezer.com` endpoints.
//!
//! The public API complements the gateway for two things the original
//! client did the same way: enumerating a user's favorite track ids and
//! walking an artist's discography. Both endpoints paginate with a `next`
//! URL.

use serde::Deserialize;
use url::Url;

/// One page of a paginated public API listing.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct Page<T> {
    /// Items on this page
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,

    /// Total number of items in the listing
    #[serde(default)]
    pub total: u64,

    /// URL of the next page, absent on the last page
    #[serde(default)]
    pub next: Option<Url>,
}

/// Favorite track reference.
#[derive(Clone, Copy, PartialEq, Eq, Deserialize, Debug, Hash)]
pub struct TrackRef {
    pub id: u64,
}

/// Album reference from an artist discography.
#[derive(Clone, Copy, PartialEq, Eq, Deserialize, Debug, Hash)]
pub struct AlbumRef {
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paginated_listing() {
        let json = r#"{
            "data": [{"id": 10}, {"id": 20}],
            "total": 3,
            "next": "https://api.deezer.com/user/1/tracks?index=2"
        }"#;

        let page: Page<TrackRef> = serde_json::from_str(json).unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].id, 10);
        assert!(page.next.is_some());
    }

    #[test]
    fn last_page_has_no_next() {
        let json = r#"{"data": [{"id": 30}], "total": 3}"#;
        let page: Page<AlbumRef> = serde_json::from_str(json).unwrap();
        assert_eq!(page.data[0].id, 30);
        assert!(page.next.is_none());
    }
}
