//! Error handling for deeload.
//!
//! One crate-wide error type categorized by what went wrong for a track,
//! so batch loops can decide what is terminal for a single track and what
//! deserves a fallback retry.

use std::io;

use thiserror::Error;

/// Standard result type for deeload operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unparseable track id or URL. Aborts the single operation that
    /// received the input.
    #[error("invalid input: {0}")]
    Input(String),

    /// The gateway rejected our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The gateway answered but reported an error for the request.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// No usable encoding at any acceptable quality tier, or the media
    /// server reported a structured error for the track.
    #[error("no usable media: {0}")]
    Negotiation(String),

    /// Network or HTTP failure fetching the stream, cover art or download
    /// descriptor. Terminal for the current track.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Malformed or truncated encrypted stream. Terminal; partial output
    /// is discarded by the caller.
    #[error("corrupt stream: {0}")]
    Decryption(String),

    /// Directory, file or link could not be created. Terminal for the
    /// placement that failed, not for the track as a whole.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] io::Error),

    #[error("parsing JSON failed: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("parsing URL failed: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn negotiation(msg: impl Into<String>) -> Self {
        Self::Negotiation(msg.into())
    }

    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    /// Whether a fallback record, if any, should be tried for this error.
    ///
    /// Only negotiation failures qualify: transport and filesystem errors
    /// would hit the fallback just the same.
    #[must_use]
    pub fn is_negotiation(&self) -> bool {
        matches!(self, Self::Negotiation(_))
    }
}
