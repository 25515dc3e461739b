//! Wire types for the media server that resolves track tokens.
//!
//! Covers the download-descriptor exchange: the request names the
//! acceptable cipher/format combinations in preference order, the
//! response carries source URLs, the served format and a validity
//! window, or a structured per-track error.
//!
//! # Wire Format
//!
//! Request:
//! ```json
//! {
//!     "license_token": "secret",
//!     "media": [{
//!         "type": "FULL",
//!         "formats": [{
//!             "cipher": "BF_CBC_STRIPE",
//!             "format": "MP3_320"
//!         }]
//!     }],
//!     "track_tokens": ["token1"]
//! }
//! ```
//!
//! Response:
//! ```json
//! {
//!     "data": [{
//!         "media": [{
//!             "media_type": "FULL",
//!             "cipher": {"type": "BF_CBC_STRIPE"},
//!             "format": "MP3_320",
//!             "sources": [{
//!                 "url": "https://...",
//!                 "provider": "cdn"
//!             }],
//!             "nbf": 1234567890,
//!             "exp": 1234599999
//!         }]
//!     }]
//! }
//! ```

use std::{fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, TimestampSeconds};
use url::Url;
use veil::Redact;

use crate::error;

/// Request for download descriptors.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Debug, Hash)]
pub struct Request {
    /// Session license token from the gateway bootstrap
    pub license_token: String,
    /// What to request for each track
    pub media: Vec<Media>,
    /// Per-track access tokens
    pub track_tokens: Vec<String>,
}

/// One media request: content type plus acceptable encodings.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Debug, Hash)]
pub struct Media {
    /// Full track or preview clip
    #[serde(default)]
    #[serde(rename = "type")]
    pub typ: Type,

    /// Acceptable cipher/format combinations, most preferred first
    #[serde(rename = "formats")]
    pub cipher_formats: Vec<CipherFormat>,
}

/// Content type of a media request.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
pub enum Type {
    /// Whole track
    #[default]
    FULL,
    /// Short preview clip
    PREVIEW,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A cipher paired with an audio format, one candidate in the
/// negotiation list.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
pub struct CipherFormat {
    pub cipher: Cipher,
    pub format: Format,
}

/// Stream encryption schemes the service serves.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
#[expect(non_camel_case_types)]
pub enum Cipher {
    /// Blowfish CBC over every third 2 KiB segment
    #[default]
    BF_CBC_STRIPE,
    /// Plain, unencrypted stream
    NONE,
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Audio encodings the service serves.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
#[expect(non_camel_case_types)]
pub enum Format {
    /// Hosted outside the service; not downloadable here
    EXTERNAL,
    /// FLAC lossless
    FLAC,
    /// 64 kbps MP3
    MP3_64,
    /// 128 kbps MP3
    #[default]
    MP3_128,
    /// 320 kbps MP3
    MP3_320,
    /// MP3 at some other or unreported bitrate
    MP3_MISC,
}

impl Format {
    /// Canonical file extension for this format.
    ///
    /// Every MP3 tier maps onto `mp3`, so the on-disk duplicate check
    /// stays unambiguous across tiers.
    ///
    /// # Errors
    ///
    /// Returns `Error::Negotiation` for externally hosted content, which
    /// this crate does not download.
    pub fn extension(self) -> error::Result<&'static str> {
        match self {
            Self::FLAC => Ok("flac"),
            Self::MP3_64 | Self::MP3_128 | Self::MP3_320 | Self::MP3_MISC => Ok("mp3"),
            Self::EXTERNAL => Err(error::Error::negotiation(
                "externally hosted media has no supported container",
            )),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Audio quality preference.
///
/// Holds the canonical total order of quality tiers, lowest to highest.
/// The candidate list handed to the media server always starts at the
/// preferred tier and walks down, never up.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum AudioQuality {
    /// 64 kbps MP3
    Basic,
    /// 128 kbps MP3
    #[default]
    Standard,
    /// 320 kbps MP3
    High,
    /// FLAC
    Lossless,
}

const BF_CBC_STRIPE_MP3_64: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::MP3_64,
};

const BF_CBC_STRIPE_MP3_128: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::MP3_128,
};

const BF_CBC_STRIPE_MP3_320: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::MP3_320,
};

const BF_CBC_STRIPE_MP3_MISC: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::MP3_MISC,
};

const BF_CBC_STRIPE_FLAC: CipherFormat = CipherFormat {
    cipher: Cipher::BF_CBC_STRIPE,
    format: Format::FLAC,
};

const CIPHER_FORMATS_MP3_64: [CipherFormat; 2] = [BF_CBC_STRIPE_MP3_64, BF_CBC_STRIPE_MP3_MISC];

const CIPHER_FORMATS_MP3_128: [CipherFormat; 3] = [
    BF_CBC_STRIPE_MP3_128,
    BF_CBC_STRIPE_MP3_64,
    BF_CBC_STRIPE_MP3_MISC,
];

const CIPHER_FORMATS_MP3_320: [CipherFormat; 4] = [
    BF_CBC_STRIPE_MP3_320,
    BF_CBC_STRIPE_MP3_128,
    BF_CBC_STRIPE_MP3_64,
    BF_CBC_STRIPE_MP3_MISC,
];

const CIPHER_FORMATS_FLAC: [CipherFormat; 5] = [
    BF_CBC_STRIPE_FLAC,
    BF_CBC_STRIPE_MP3_320,
    BF_CBC_STRIPE_MP3_128,
    BF_CBC_STRIPE_MP3_64,
    BF_CBC_STRIPE_MP3_MISC,
];

impl AudioQuality {
    /// Ordered format candidates for this preference, highest acceptable
    /// first down to the lowest tier.
    #[must_use]
    pub fn cipher_formats(self) -> Vec<CipherFormat> {
        match self {
            Self::Basic => CIPHER_FORMATS_MP3_64.to_vec(),
            Self::Standard => CIPHER_FORMATS_MP3_128.to_vec(),
            Self::High => CIPHER_FORMATS_MP3_320.to_vec(),
            Self::Lossless => CIPHER_FORMATS_FLAC.to_vec(),
        }
    }
}

impl FromStr for AudioQuality {
    type Err = crate::error::Error;

    /// Parses a quality preference from the configuration file.
    ///
    /// Accepts both tier names (`standard`) and format names (`mp3_128`).
    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" | "mp3_64" => Ok(Self::Basic),
            "standard" | "mp3_128" => Ok(Self::Standard),
            "high" | "mp3_320" => Ok(Self::High),
            "lossless" | "flac" => Ok(Self::Lossless),
            other => Err(crate::error::Error::input(format!(
                "unknown audio quality \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::High => "high",
            Self::Lossless => "lossless",
        };
        write!(f, "{name}")
    }
}

impl From<Format> for AudioQuality {
    fn from(format: Format) -> Self {
        match format {
            Format::MP3_64 | Format::MP3_MISC | Format::EXTERNAL => Self::Basic,
            Format::MP3_128 => Self::Standard,
            Format::MP3_320 => Self::High,
            Format::FLAC => Self::Lossless,
        }
    }
}

/// Response to a descriptor request.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash)]
pub struct Response {
    pub data: Vec<Data>,
}

/// Per-track response payload: either served media or reported errors.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash)]
#[serde(untagged)]
pub enum Data {
    Media { media: Vec<Medium> },
    Errors { errors: Vec<Error> },
}

/// Structured error the media server reports for one track.
#[derive(Clone, Eq, Default, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash)]
pub struct Error {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// The download descriptor for one track: where to fetch the bytes, how
/// they are encoded and encrypted, and for how long the links hold.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash)]
pub struct Medium {
    /// Full track or preview
    #[serde(default)]
    pub media_type: Type,

    /// Encryption applied to the stream
    #[serde(default)]
    pub cipher: CipherType,

    /// Encoding actually served, at most the requested tier
    #[serde(default)]
    pub format: Format,

    /// Download locations, tried in order
    pub sources: Vec<Source>,

    /// Sources are not valid before this instant
    #[serde(default = "SystemTime::now", rename = "nbf")]
    #[serde_as(as = "TimestampSeconds<i64, Flexible>")]
    pub not_before: SystemTime,

    /// Sources are not valid after this instant
    #[serde(default = "far_future", rename = "exp")]
    #[serde_as(as = "TimestampSeconds<i64, Flexible>")]
    pub expiry: SystemTime,
}

fn far_future() -> SystemTime {
    SystemTime::now() + std::time::Duration::from_secs(60 * 60)
}

/// Cipher as the response nests it, `{ "type": "BF_CBC_STRIPE" }`.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
pub struct CipherType {
    #[serde(rename = "type")]
    pub typ: Cipher,
}

/// One download location.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Redact, Hash)]
pub struct Source {
    /// Download URL; carries access tokens, so redacted in debug output
    #[redact]
    pub url: Url,

    /// Name of the serving host, e.g. "cdn"
    #[serde(default)]
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_lists_never_exceed_preference() {
        let formats: Vec<Format> = AudioQuality::Standard
            .cipher_formats()
            .into_iter()
            .map(|cf| cf.format)
            .collect();
        assert_eq!(formats, vec![Format::MP3_128, Format::MP3_64, Format::MP3_MISC]);

        let formats: Vec<Format> = AudioQuality::Basic
            .cipher_formats()
            .into_iter()
            .map(|cf| cf.format)
            .collect();
        assert_eq!(formats, vec![Format::MP3_64, Format::MP3_MISC]);
    }

    #[test]
    fn lossless_walks_the_whole_ladder() {
        let formats: Vec<Format> = AudioQuality::Lossless
            .cipher_formats()
            .into_iter()
            .map(|cf| cf.format)
            .collect();
        assert_eq!(
            formats,
            vec![
                Format::FLAC,
                Format::MP3_320,
                Format::MP3_128,
                Format::MP3_64,
                Format::MP3_MISC
            ]
        );
    }

    #[test]
    fn every_candidate_uses_the_striped_cipher() {
        for quality in [
            AudioQuality::Basic,
            AudioQuality::Standard,
            AudioQuality::High,
            AudioQuality::Lossless,
        ] {
            assert!(quality
                .cipher_formats()
                .iter()
                .all(|cf| cf.cipher == Cipher::BF_CBC_STRIPE));
        }
    }

    #[test]
    fn quality_parses_both_spellings() {
        assert_eq!("MP3_128".parse::<AudioQuality>().unwrap(), AudioQuality::Standard);
        assert_eq!("lossless".parse::<AudioQuality>().unwrap(), AudioQuality::Lossless);
        assert!("cassette".parse::<AudioQuality>().is_err());
    }

    #[test]
    fn request_serializes_to_wire_shape() {
        let request = Request {
            license_token: "secret".to_owned(),
            media: vec![Media {
                typ: Type::FULL,
                cipher_formats: AudioQuality::Basic.cipher_formats(),
            }],
            track_tokens: vec!["token1".to_owned()],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["media"][0]["type"], "FULL");
        assert_eq!(json["media"][0]["formats"][0]["cipher"], "BF_CBC_STRIPE");
        assert_eq!(json["media"][0]["formats"][0]["format"], "MP3_64");
    }

    #[test]
    fn response_parses_provider_errors() {
        let json = r#"{"data":[{"errors":[{"code":2002,"message":"No media matches"}]}]}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        match &response.data[0] {
            Data::Errors { errors } => {
                assert_eq!(errors[0].to_string(), "No media matches (2002)");
            }
            Data::Media { .. } => panic!("expected errors"),
        }
    }

    #[test]
    fn mp3_tiers_share_one_extension() {
        assert_eq!(Format::MP3_MISC.extension().unwrap(), "mp3");
        assert_eq!(Format::MP3_320.extension().unwrap(), "mp3");
        assert_eq!(Format::FLAC.extension().unwrap(), "flac");
        assert!(Format::EXTERNAL.extension().is_err());
    }
}
