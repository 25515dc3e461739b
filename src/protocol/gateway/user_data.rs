//! User data and session tokens from Deezer's gateway API.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "USER": {
//!         "USER_ID": 123456789,
//!         "BLOG_NAME": "Username",
//!         "OPTIONS": {
//!             "license_token": "secret",
//!             "license_country": "us"
//!         }
//!     },
//!     "COUNTRY": "us",
//!     "checkForm": "api_token"
//! }
//! ```

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use veil::Redact;

use super::Method;

/// Gateway method name for retrieving user data.
///
/// This is also the session bootstrap: the response carries the CSRF
/// (`api_token`) required by every other gateway call and the license
/// token required by the media server.
impl Method for UserData {
    const METHOD: &'static str = "deezer.getUserData";
}

/// User session data from the gateway.
#[derive(Clone, PartialEq, Deserialize, Redact)]
pub struct UserData {
    /// User profile and licensing options
    #[serde(rename = "USER")]
    pub user: User,

    /// Country reported for the session, used when the licensing options
    /// carry none.
    #[serde(default)]
    #[serde(rename = "COUNTRY")]
    pub country: String,

    /// API (CSRF) token attached to every gateway request
    #[serde(rename = "checkForm")]
    #[redact]
    pub api_token: String,
}

impl UserData {
    /// The two-letter country for catalog requests, lowercased.
    #[must_use]
    pub fn country(&self) -> String {
        let country = if self.user.options.license_country.is_empty() {
            &self.country
        } else {
            &self.user.options.license_country
        };
        country.to_lowercase()
    }
}

/// User profile data.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct User {
    /// Unique user identifier
    #[serde(rename = "USER_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,

    /// Display name
    #[serde(default)]
    #[serde(rename = "BLOG_NAME")]
    pub name: String,

    /// Licensing options
    #[serde(rename = "OPTIONS")]
    pub options: UserOptions,
}

/// Licensing options for a user session.
#[derive(Clone, PartialEq, Deserialize, Redact)]
pub struct UserOptions {
    /// Token required by the media server to resolve download URLs
    #[serde(default)]
    #[redact]
    pub license_token: String,

    /// Country the license applies to
    #[serde(default)]
    pub license_country: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gateway::Response;

    #[test]
    fn parses_session_bootstrap() {
        let json = r#"{
            "error": [],
            "results": {
                "USER": {
                    "USER_ID": "42",
                    "BLOG_NAME": "someone",
                    "OPTIONS": {"license_token": "lt", "license_country": "FR"}
                },
                "COUNTRY": "DE",
                "checkForm": "csrf"
            }
        }"#;

        let response: Response<UserData> = serde_json::from_str(json).unwrap();
        let data = response.first().unwrap();
        assert_eq!(data.user.id, 42);
        assert_eq!(data.api_token, "csrf");
        assert_eq!(data.country(), "fr");
    }

    #[test]
    fn falls_back_to_session_country() {
        let json = r#"{
            "error": [],
            "results": {
                "USER": {"USER_ID": 1, "OPTIONS": {"license_token": "lt"}},
                "COUNTRY": "US",
                "checkForm": "csrf"
            }
        }"#;

        let response: Response<UserData> = serde_json::from_str(json).unwrap();
        assert_eq!(response.first().unwrap().country(), "us");
    }
}
