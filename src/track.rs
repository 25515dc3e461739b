//! Track domain model and media negotiation.
//!
//! Gateway records are ingested once into [`Track`], an explicit
//! optional-field struct, so downstream code never pokes at loosely-typed
//! wire data. A record that carries a fallback becomes a
//! [`TrackSource::WithFallback`]; deeper fallback chains are cut off at
//! ingestion, limiting negotiation to a single fallback hop.

use std::{fmt, num::NonZeroU64, time::Duration};

use crate::{
    error::{Error, Result},
    http,
    protocol::{
        gateway::SongRecord,
        media::{self, AudioQuality, Medium},
    },
};

/// Unique track identifier.
pub type TrackId = NonZeroU64;

/// Immutable metadata bundle for one track.
#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    title: String,
    version: Option<String>,
    artist: String,
    album_id: Option<u64>,
    album_title: String,
    album_cover: String,
    track_number: Option<u64>,
    track_total: Option<u64>,
    disc_number: Option<u64>,
    duration: Duration,
    track_token: String,
    isrc: String,
    label: String,
    release_date: String,
    digital_release_date: String,
    file_size_hint: Option<u64>,
}

impl Track {
    #[must_use]
    pub fn id(&self) -> TrackId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title with the version suffix appended, e.g. `Song (Remix)`.
    #[must_use]
    pub fn full_title(&self) -> String {
        match self.version.as_deref().filter(|v| !v.is_empty()) {
            Some(version) => format!("{} {}", self.title, version),
            None => self.title.clone(),
        }
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn album_id(&self) -> Option<u64> {
        self.album_id
    }

    #[must_use]
    pub fn album_title(&self) -> &str {
        &self.album_title
    }

    /// Cover identifier, if the record carried one.
    #[must_use]
    pub fn cover_id(&self) -> Option<&str> {
        if self.album_cover.is_empty() {
            None
        } else {
            Some(&self.album_cover)
        }
    }

    #[must_use]
    pub fn track_number(&self) -> Option<u64> {
        self.track_number
    }

    /// Number of tracks on the release, when known from an album listing.
    #[must_use]
    pub fn track_total(&self) -> Option<u64> {
        self.track_total
    }

    pub fn set_track_total(&mut self, total: u64) {
        self.track_total = Some(total);
    }

    #[must_use]
    pub fn disc_number(&self) -> Option<u64> {
        self.disc_number
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn isrc(&self) -> &str {
        &self.isrc
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Physical release date, `YYYY-MM-DD` or empty.
    #[must_use]
    pub fn release_date(&self) -> &str {
        &self.release_date
    }

    /// Digital release date, `YYYY-MM-DD` or empty.
    #[must_use]
    pub fn digital_release_date(&self) -> &str {
        &self.digital_release_date
    }

    /// First non-zero per-encoding size hint from the record.
    #[must_use]
    pub fn file_size_hint(&self) -> Option<u64> {
        self.file_size_hint
    }

    /// Endpoint that resolves track tokens to download URLs.
    const MEDIA_GET_URL: &'static str = "https://media.deezer.com/v1/get_url";

    /// Negotiates a download descriptor for this track.
    ///
    /// Hands the ordered format candidates for `quality` (preferred tier
    /// down to the lowest, never higher) to the media server together
    /// with the track token. The server answers with the best match it is
    /// willing to serve, or a structured error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Negotiation` when the server reports an error or
    /// returns no media, and `Error::Transport` on network failure.
    pub async fn get_medium(
        &self,
        client: &http::Client,
        quality: AudioQuality,
        license_token: &str,
    ) -> Result<Medium> {
        let request = media::Request {
            license_token: license_token.to_owned(),
            track_tokens: vec![self.track_token.clone()],
            media: vec![media::Media {
                typ: media::Type::FULL,
                cipher_formats: quality.cipher_formats(),
            }],
        };

        trace!("{}: {request:#?}", Self::MEDIA_GET_URL);

        let get_url = Self::MEDIA_GET_URL.parse::<reqwest::Url>()?;
        let response = client.unlimited.post(get_url).json(&request).send().await?;
        let result = response.json::<media::Response>().await?;

        // The official client always uses the first media object.
        let medium = match result.data.first() {
            Some(media::Data::Media { media }) => media.first().cloned(),
            Some(media::Data::Errors { errors }) => {
                let reason = errors
                    .first()
                    .map_or_else(|| "unspecified error".to_owned(), ToString::to_string);
                return Err(Error::negotiation(format!("track {self}: {reason}")));
            }
            None => None,
        };
        let medium =
            medium.ok_or_else(|| Error::negotiation(format!("no media found for track {self}")))?;

        let available = AudioQuality::from(medium.format);
        if quality != available {
            info!("requested track {self} in {quality} audio quality, but got {available}");
        }

        Ok(medium)
    }
}

impl From<SongRecord> for Track {
    fn from(record: SongRecord) -> Self {
        let file_size_hint = record.file_size();
        Self {
            id: record.id,
            title: record.title,
            version: record.version,
            artist: record.artist,
            album_id: record.album_id,
            album_title: record.album_title,
            album_cover: record.album_cover,
            track_number: record.track_number,
            track_total: None,
            disc_number: record.disc_number,
            duration: record.duration,
            track_token: record.track_token,
            isrc: record.isrc,
            label: record.label,
            release_date: record.release_date,
            digital_release_date: record.digital_release_date,
            file_size_hint,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{} - {}\"", self.id, self.artist, self.title)
    }
}

/// A track together with its optional alternate representation.
///
/// The fallback is consulted at most once, only after the primary fails
/// to negotiate any media. The fallback's own fallback, if the gateway
/// ever sends one, is dropped at ingestion.
#[derive(Clone, Debug)]
pub enum TrackSource {
    Primary(Track),
    WithFallback(Track, Box<Track>),
}

impl TrackSource {
    #[must_use]
    pub fn primary(&self) -> &Track {
        match self {
            Self::Primary(track) | Self::WithFallback(track, _) => track,
        }
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&Track> {
        match self {
            Self::Primary(_) => None,
            Self::WithFallback(_, fallback) => Some(fallback),
        }
    }

    /// Records the release track count on both representations.
    pub fn set_track_total(&mut self, total: u64) {
        match self {
            Self::Primary(track) => track.set_track_total(total),
            Self::WithFallback(track, fallback) => {
                track.set_track_total(total);
                fallback.set_track_total(total);
            }
        }
    }
}

impl From<SongRecord> for TrackSource {
    fn from(mut record: SongRecord) -> Self {
        match record.fallback.take() {
            Some(mut fallback) => {
                // One level of fallback only.
                if fallback.fallback.take().is_some() {
                    debug!("dropping nested fallback for track {}", record.id);
                }
                Self::WithFallback(Track::from(record), Box::new(Track::from(*fallback)))
            }
            None => Self::Primary(Track::from(record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> SongRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ingests_record_without_fallback() {
        let source = TrackSource::from(record(
            r#"{"SNG_ID":"1","SNG_TITLE":"One","ART_NAME":"Artist","TRACK_TOKEN":"t"}"#,
        ));
        assert!(source.fallback().is_none());
        assert_eq!(source.primary().title(), "One");
    }

    #[test]
    fn fallback_chain_is_cut_at_one_hop() {
        let source = TrackSource::from(record(
            r#"{
                "SNG_ID": "1", "TRACK_TOKEN": "a",
                "FALLBACK": {
                    "SNG_ID": "2", "TRACK_TOKEN": "b",
                    "FALLBACK": {"SNG_ID": "3", "TRACK_TOKEN": "c"}
                }
            }"#,
        ));

        let fallback = source.fallback().expect("fallback present");
        assert_eq!(fallback.id().get(), 2);
        // The grandchild record must not be reachable anywhere.
        assert_eq!(source.primary().id().get(), 1);
    }

    #[test]
    fn full_title_appends_version() {
        let track = Track::from(record(
            r#"{"SNG_ID":"1","SNG_TITLE":"One","VERSION":"(Remix)","TRACK_TOKEN":"t"}"#,
        ));
        assert_eq!(track.full_title(), "One (Remix)");

        let track = Track::from(record(
            r#"{"SNG_ID":"1","SNG_TITLE":"One","VERSION":"","TRACK_TOKEN":"t"}"#,
        ));
        assert_eq!(track.full_title(), "One");
    }

    #[test]
    fn display_shows_identity() {
        let track = Track::from(record(
            r#"{"SNG_ID":"7","SNG_TITLE":"Song","ART_NAME":"Band","TRACK_TOKEN":"t"}"#,
        ));
        assert_eq!(track.to_string(), "7: \"Band - Song\"");
    }
}
