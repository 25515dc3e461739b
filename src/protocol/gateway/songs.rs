//! Track records from Deezer's gateway API.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "SNG_ID": "123456",
//!     "SNG_TITLE": "Track Title",
//!     "VERSION": "(Remix)",
//!     "ART_NAME": "Artist Name",
//!     "ALB_ID": "7890",
//!     "ALB_TITLE": "Album Title",
//!     "ALB_PICTURE": "album_cover_id",
//!     "DURATION": "180",
//!     "TRACK_NUMBER": "4",
//!     "DISK_NUMBER": "1",
//!     "TRACK_TOKEN": "secret_token",
//!     "ISRC": "USSM12345678",
//!     "PHYSICAL_RELEASE_DATE": "2008-11-21",
//!     "FILESIZE_MP3_320": "9120000",
//!     "FALLBACK": { ...same shape... }
//! }
//! ```
//!
//! All numeric fields may arrive as strings or numbers; both are accepted.
//! Missing metadata fields default to empty values so a sparse record
//! still downloads, it just tags less.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DisplayFromStr, DurationSeconds, PickFirst};
use veil::Redact;

use crate::track::TrackId;

use super::Method;

/// Gateway method name for retrieving track records by id.
impl Method for SongRecord {
    const METHOD: &'static str = "song.getListData";
}

/// Detailed track record from Deezer's gateway.
///
/// Everything the acquisition pipeline needs for one track: identity,
/// display metadata, tag fields, per-encoding size hints, the download
/// token, and an optional complete fallback record substituted when the
/// primary has no retrievable media.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Redact)]
pub struct SongRecord {
    /// Unique track identifier.
    #[serde(rename = "SNG_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: TrackId,

    /// Track title.
    #[serde(default)]
    #[serde(rename = "SNG_TITLE")]
    pub title: String,

    /// Version suffix, e.g. "(Live)" or "(Remix)".
    #[serde(default)]
    #[serde(rename = "VERSION")]
    pub version: Option<String>,

    /// Main artist name.
    #[serde(default)]
    #[serde(rename = "ART_NAME")]
    pub artist: String,

    /// Album identifier.
    #[serde(default)]
    #[serde(rename = "ALB_ID")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub album_id: Option<u64>,

    /// Album title.
    #[serde(default)]
    #[serde(rename = "ALB_TITLE")]
    pub album_title: String,

    /// Album cover identifier.
    ///
    /// When available, this id can be used to construct image URLs:
    /// ```text
    /// https://cdn-images.dzcdn.net/images/cover/{album_cover}/{resolution}x{resolution}.jpg
    /// ```
    /// Defaults to an empty string when no cover is available.
    #[serde(default)]
    #[serde(rename = "ALB_PICTURE")]
    pub album_cover: String,

    /// Track duration, parsed from seconds.
    #[serde(default)]
    #[serde(rename = "DURATION")]
    #[serde_as(as = "DurationSeconds<String, Flexible>")]
    pub duration: Duration,

    /// Position of the track on its disc.
    #[serde(default)]
    #[serde(rename = "TRACK_NUMBER")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub track_number: Option<u64>,

    /// Disc number within a multi-disc release.
    #[serde(default)]
    #[serde(rename = "DISK_NUMBER")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub disc_number: Option<u64>,

    /// Authentication token for media access.
    ///
    /// Unique per track with a limited validity period; required by the
    /// media server to resolve download URLs.
    #[serde(rename = "TRACK_TOKEN")]
    #[redact]
    pub track_token: String,

    /// International Standard Recording Code.
    #[serde(default)]
    #[serde(rename = "ISRC")]
    pub isrc: String,

    /// Record label or publisher.
    #[serde(default)]
    #[serde(rename = "LABEL_NAME")]
    pub label: String,

    /// Physical release date, `YYYY-MM-DD`.
    #[serde(default)]
    #[serde(rename = "PHYSICAL_RELEASE_DATE")]
    pub release_date: String,

    /// Digital release date, `YYYY-MM-DD`.
    #[serde(default)]
    #[serde(rename = "DIGITAL_RELEASE_DATE")]
    pub digital_release_date: String,

    /// Size hint for the 64 kbps AAC encoding, in bytes.
    #[serde(default)]
    #[serde(rename = "FILESIZE_AAC_64")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub filesize_aac_64: Option<u64>,

    /// Size hint for the 320 kbps MP3 encoding, in bytes.
    #[serde(default)]
    #[serde(rename = "FILESIZE_MP3_320")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub filesize_mp3_320: Option<u64>,

    /// Size hint for the 256 kbps MP3 encoding, in bytes.
    #[serde(default)]
    #[serde(rename = "FILESIZE_MP3_256")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub filesize_mp3_256: Option<u64>,

    /// Size hint for the 64 kbps MP3 encoding, in bytes.
    #[serde(default)]
    #[serde(rename = "FILESIZE_MP3_64")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub filesize_mp3_64: Option<u64>,

    /// Size hint for the default encoding, in bytes.
    #[serde(default)]
    #[serde(rename = "FILESIZE")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub filesize: Option<u64>,

    /// Complete alternate record used only if this record has no
    /// retrievable media. One level deep in practice; deeper nesting is
    /// never followed.
    #[serde(default)]
    #[serde(rename = "FALLBACK")]
    pub fallback: Option<Box<SongRecord>>,
}

impl SongRecord {
    /// First non-zero size hint, if any.
    ///
    /// Mirrors the encoding order the original client preferred when
    /// reporting a size.
    #[must_use]
    pub fn file_size(&self) -> Option<u64> {
        [
            self.filesize_aac_64,
            self.filesize_mp3_320,
            self.filesize_mp3_256,
            self.filesize_mp3_64,
            self.filesize,
        ]
        .into_iter()
        .flatten()
        .find(|&size| size > 0)
    }
}

/// Request parameters for track list data.
///
/// Used to request full records for multiple tracks in a single query.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Serialize, Debug, Hash)]
pub struct Request {
    /// List of track ids to fetch records for.
    #[serde(rename = "sng_ids")]
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub song_ids: Vec<TrackId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sparse_record() {
        let json = r#"{"SNG_ID":"3135556","TRACK_TOKEN":"tok"}"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.get(), 3_135_556);
        assert_eq!(record.title, "");
        assert_eq!(record.file_size(), None);
        assert!(record.fallback.is_none());
    }

    #[test]
    fn parses_numbers_in_both_shapes() {
        let json = r#"{"SNG_ID":123,"TRACK_TOKEN":"tok","TRACK_NUMBER":"7","ALB_ID":456,"FILESIZE_MP3_320":"9000"}"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.track_number, Some(7));
        assert_eq!(record.album_id, Some(456));
        assert_eq!(record.file_size(), Some(9000));
    }

    #[test]
    fn parses_nested_fallback() {
        let json = r#"{
            "SNG_ID": "1",
            "TRACK_TOKEN": "tok",
            "FALLBACK": {"SNG_ID": "2", "TRACK_TOKEN": "fallback-tok"}
        }"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();
        let fallback = record.fallback.unwrap();
        assert_eq!(fallback.id.get(), 2);
        assert_eq!(fallback.track_token, "fallback-tok");
    }

    #[test]
    fn size_hint_skips_zero_entries() {
        let json = r#"{"SNG_ID":"1","TRACK_TOKEN":"t","FILESIZE_AAC_64":"0","FILESIZE_MP3_64":"1234"}"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.file_size(), Some(1234));
    }

    #[test]
    fn request_serializes_ids_as_strings() {
        let request = Request {
            song_ids: vec![TrackId::new(1).unwrap(), TrackId::new(22).unwrap()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sng_ids"][0], "1");
        assert_eq!(json["sng_ids"][1], "22");
    }
}
