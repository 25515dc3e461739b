//! Deezer `arl` session cookie handling.
//!
//! The `arl` is a long-lived session token taken from a logged-in browser.
//! It grants full account access, so it is validated on ingestion and
//! redacted from debug output everywhere it is stored.

use std::{fmt, ops::Deref, str::FromStr};

use crate::error::{Error, Result};

/// Number of characters in a valid `arl` token.
const ARL_LENGTH: usize = 192;

/// Validated `arl` session token.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Arl(String);

impl FromStr for Arl {
    type Err = Error;

    /// Parses and validates an `arl` token.
    ///
    /// Tokens must be exactly 192 characters of cookie-safe ASCII. A
    /// leading `arl=` prefix (as copied from browser developer tools) is
    /// stripped.
    fn from_str(s: &str) -> Result<Self> {
        let arl = s.trim().trim_start_matches("arl=");

        let chars = arl.chars().count();
        if chars != ARL_LENGTH {
            return Err(Error::input(format!(
                "arl should be {ARL_LENGTH} characters long but is {chars}"
            )));
        }

        if !arl.chars().all(|chr| chr.is_ascii_alphanumeric()) {
            return Err(Error::input("arl contains invalid characters"));
        }

        Ok(Self(arl.to_owned()))
    }
}

impl Deref for Arl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Arl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keeps the session token out of logs and crash dumps.
impl fmt::Debug for Arl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}
