//! Gateway API types for Deezer's web services.
//!
//! This module provides type-safe interfaces to the gateway endpoints the
//! downloader needs:
//! * User data and license tokens ([`user_data`])
//! * Track records ([`songs`])
//! * Album, playlist and profile pages ([`pages`])
//! * Public API listings ([`listings`])
//!
//! # Response Types
//!
//! The gateway returns two response shapes:
//! * Paginated lists ([`Response::Paginated`])
//! * Simple results ([`Response::Unpaginated`])
//!
//! Both carry an `error` member that is an empty array on success and a
//! code-to-message map on failure.

pub mod listings;
pub mod pages;
pub mod songs;
pub mod user_data;

pub use pages::{AlbumTrack, PlaylistPage};
pub use songs::SongRecord;
pub use user_data::UserData;

use serde::Deserialize;
use serde_with::{serde_as, OneOrMany};

/// Defines a gateway API method identifier.
///
/// Each type implementing this trait represents a specific gateway
/// endpoint, identified by a method name in Deezer's dot notation
/// (e.g. `song.getListData`).
pub trait Method {
    /// The gateway API method name.
    const METHOD: &'static str;
}

/// Response from a Deezer gateway API endpoint.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
#[serde(untagged)]
pub enum Response<T> {
    /// Paginated response with result counts
    Paginated {
        /// API status information
        #[serde(default)]
        error: serde_json::Value,
        /// Paginated result set
        results: Paginated<T>,
    },

    /// Direct response with a single result or a results array
    Unpaginated {
        /// API status information
        #[serde(default)]
        error: serde_json::Value,
        /// Result items (single item or array)
        #[serde_as(as = "OneOrMany<_>")]
        results: Vec<T>,
    },
}

impl<T> Response<T> {
    /// Returns the first result item, if any.
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.all().first()
    }

    /// Returns all result items as a slice.
    #[must_use]
    pub fn all(&self) -> &Vec<T> {
        match self {
            Self::Paginated { results, .. } => &results.data,
            Self::Unpaginated { results, .. } => results,
        }
    }

    /// Consumes the response, returning all result items.
    #[must_use]
    pub fn into_all(self) -> Vec<T> {
        match self {
            Self::Paginated { results, .. } => results.data,
            Self::Unpaginated { results, .. } => results,
        }
    }

    /// The raw API status value.
    #[must_use]
    pub fn error(&self) -> &serde_json::Value {
        match self {
            Self::Paginated { error, .. } | Self::Unpaginated { error, .. } => error,
        }
    }

    /// Whether the gateway reported an error.
    ///
    /// The gateway sends an empty array on success and a non-empty map or
    /// array on failure.
    #[must_use]
    pub fn has_error(&self) -> bool {
        match self.error() {
            serde_json::Value::Null => false,
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(entries) => !entries.is_empty(),
            _ => true,
        }
    }

    /// Whether the error payload mentions a specific error code.
    #[must_use]
    pub fn has_error_code(&self, code: &str) -> bool {
        match self.error() {
            serde_json::Value::Array(items) => items.iter().any(|item| item == code),
            serde_json::Value::Object(entries) => entries.contains_key(code),
            _ => false,
        }
    }
}

/// Paginated result set from the gateway.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct Paginated<T> {
    /// Items in this page of results
    pub data: Vec<T>,
    /// Number of items in this page
    #[serde(default)]
    pub count: u64,
    /// Total number of items available
    #[serde(default)]
    pub total: u64,
}
