//! Binary metadata tags written around the decrypted audio.
//!
//! Two standards-shaped blocks frame every download:
//! * An ID3v2.3 header before the audio, carrying the full frame set
//!   including embedded cover art
//! * An ID3v1.1 trailer after the audio, 128 bytes, for players that only
//!   read the legacy tag
//!
//! Both blocks are strictly additive: the audio payload between them is
//! byte-identical to the decrypted stream. Any field that cannot be
//! computed degrades to an empty value; only the cover fetch can touch
//! the network, and its failure is not fatal to the download.

use std::{collections::HashMap, io::Write};

use crate::{error::Result, http, track::Track};

/// Writes the ID3v2.3 header block.
///
/// Frame order follows the original client: textual frames first, the
/// best-effort `APIC` cover frame always last.
///
/// # Errors
///
/// Returns an error when the sink cannot be written.
pub fn write_id3v2(out: &mut impl Write, track: &Track, cover: Option<&[u8]>) -> Result<()> {
    let mut frames = Vec::new();

    // Track number, extended with the release total when known, e.g. "4/12".
    let mut position = track
        .track_number()
        .map_or_else(String::new, |n| n.to_string());
    if let (false, Some(total)) = (position.is_empty(), track.track_total()) {
        position = format!("{position}/{total}");
    }

    let release_year = track.release_date().get(..4).unwrap_or_default();
    let digital_year = track.digital_release_date().get(..4).unwrap_or_default();
    let millis = track.duration().as_millis().to_string();
    let size = track.file_size_hint().unwrap_or_default().to_string();
    let disc = track
        .disc_number()
        .map_or_else(String::new, |n| n.to_string());

    frames.push(frame(b"TRCK", &text(&position)));
    frames.push(frame(b"TLEN", &text(&millis)));
    frames.push(frame(b"TORY", &text(release_year)));
    frames.push(frame(b"TYER", &text(digital_year)));
    frames.push(frame(b"TDAT", &text(&date_ddmm(track.release_date()))));
    frames.push(frame(b"TPUB", &text(track.label())));
    frames.push(frame(b"TSIZ", &text(&size)));
    frames.push(frame(b"TFLT", &text("MPG/3")));
    frames.push(frame(b"TALB", &text(track.album_title())));
    frames.push(frame(b"TPE1", &text(track.artist())));
    frames.push(frame(b"TPE2", &text(track.artist())));
    frames.push(frame(b"TPOS", &text(&disc)));
    frames.push(frame(b"TIT2", &text(&track.full_title())));
    frames.push(frame(b"TSRC", &text(track.isrc())));

    if let Some(data) = cover {
        frames.push(frame(b"APIC", &picture(data)));
    }

    let body: Vec<u8> = frames.concat();

    out.write_all(b"ID3")?;
    out.write_all(&[0x03, 0x00])?; // version 2.3
    out.write_all(&[0x00])?; // flags
    out.write_all(&synchsafe(body.len() as u32))?;
    out.write_all(&body)?;

    Ok(())
}

/// Writes the 128-byte ID3v1.1 trailer block.
///
/// # Errors
///
/// Returns an error when the sink cannot be written.
pub fn write_id3v1(out: &mut impl Write, track: &Track) -> Result<()> {
    out.write_all(b"TAG")?;
    out.write_all(&fixed::<30>(track.title()))?;
    out.write_all(&fixed::<30>(track.artist()))?;
    out.write_all(&fixed::<30>(track.album_title()))?;
    out.write_all(&fixed::<4>(track.release_date()))?;
    out.write_all(&fixed::<28>(track.label()))?;
    out.write_all(&[0])?; // comment terminator
    let number = track.track_number().map_or(0, |n| u8::try_from(n).unwrap_or(u8::MAX));
    out.write_all(&[number])?;
    out.write_all(&[255])?; // genre: none

    Ok(())
}

/// Encodes a length as four bytes of seven bits each, the top bit of
/// every byte zero.
fn synchsafe(len: u32) -> [u8; 4] {
    let encoded = ((len << 3) & 0x7F00_0000)
        | ((len << 2) & 0x007F_0000)
        | ((len << 1) & 0x0000_7F00)
        | (len & 0x0000_007F);
    encoded.to_be_bytes()
}

/// One tag frame: 4-byte ASCII id, big-endian length, two flag bytes,
/// payload.
fn frame(id: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(10 + content.len());
    data.extend_from_slice(id);
    data.extend_from_slice(&(content.len() as u32).to_be_bytes());
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(content);
    data
}

/// Text payload: UTF-8 marker byte followed by the string bytes.
fn text(value: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + value.len());
    data.push(0x03);
    data.extend_from_slice(value.as_bytes());
    data
}

/// Attached picture payload: JPEG cover, picture type 3 ("Cover (front)").
fn picture(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16 + data.len());
    payload.push(0x00); // text encoding
    payload.extend_from_slice(b"image/jpeg\0");
    payload.push(0x03); // picture type
    payload.push(0x00); // empty description
    payload.extend_from_slice(data);
    payload
}

/// `DDMM` rendering of a `YYYY-MM-DD` date, empty when malformed.
fn date_ddmm(date: &str) -> String {
    let mut parts = date.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_year), Some(month), Some(day)) => format!("{day}{month}"),
        _ => String::new(),
    }
}

/// Truncates or NUL-pads a string into a fixed-width field.
fn fixed<const N: usize>(value: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let bytes = value.as_bytes();
    let len = usize::min(bytes.len(), N);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// In-memory cache of album cover downloads.
///
/// Tracks of one album share a cover id; caching saves one image fetch
/// per track after the first. The cache is owned by the downloader and
/// cleared wholesale once it outgrows its bound.
pub struct CoverCache {
    entries: HashMap<String, Vec<u8>>,
}

impl CoverCache {
    /// Entry bound above which the cache is cleared.
    const MAX_ENTRIES: usize = 100;

    /// Image resolution requested from the CDN.
    const RESOLUTION: u32 = 1200;

    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// CDN URL for a cover identifier.
    #[must_use]
    pub fn url_for(cover_id: &str) -> String {
        let resolution = Self::RESOLUTION;
        format!(
            "https://cdn-images.dzcdn.net/images/cover/{cover_id}/{resolution}x{resolution}.jpg"
        )
    }

    /// Returns the cover bytes, fetching them once per identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` when the image cannot be fetched; the
    /// caller treats that as a missing cover, not a failed track.
    pub async fn fetch(&mut self, client: &http::Client, cover_id: &str) -> Result<Vec<u8>> {
        if self.entries.len() > Self::MAX_ENTRIES {
            debug!("clearing cover cache ({} entries)", self.entries.len());
            self.entries.clear();
        }

        if let Some(bytes) = self.entries.get(cover_id) {
            return Ok(bytes.clone());
        }

        let url = Self::url_for(cover_id).parse::<reqwest::Url>()?;
        let request = client.get(url, "");
        let response = client.execute(request).await?.error_for_status()?;
        let bytes = response.bytes().await?.to_vec();

        self.entries.insert(cover_id.to_owned(), bytes.clone());
        Ok(bytes)
    }
}

impl Default for CoverCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protocol::gateway::SongRecord, track::Track};

    fn sample_track() -> Track {
        let record: SongRecord = serde_json::from_str(
            r#"{
                "SNG_ID": "3135556",
                "SNG_TITLE": "Harder, Better, Faster, Stronger",
                "ART_NAME": "Daft Punk",
                "ALB_TITLE": "Discovery",
                "DURATION": "224",
                "TRACK_NUMBER": "4",
                "DISK_NUMBER": "1",
                "TRACK_TOKEN": "tok",
                "ISRC": "GBDUW0000059",
                "LABEL_NAME": "Parlophone",
                "PHYSICAL_RELEASE_DATE": "2001-03-07",
                "DIGITAL_RELEASE_DATE": "2001-03-12",
                "FILESIZE_MP3_320": "8960000"
            }"#,
        )
        .unwrap();
        Track::from(record)
    }

    fn empty_track() -> Track {
        let record: SongRecord =
            serde_json::from_str(r#"{"SNG_ID":"1","TRACK_TOKEN":"tok"}"#).unwrap();
        Track::from(record)
    }

    fn decode_synchsafe(bytes: &[u8]) -> u32 {
        (u32::from(bytes[0]) << 21)
            | (u32::from(bytes[1]) << 14)
            | (u32::from(bytes[2]) << 7)
            | u32::from(bytes[3])
    }

    #[test]
    fn synchsafe_keeps_top_bits_zero() {
        for len in [0u32, 1, 127, 128, 16384, 0x0FFF_FFFF] {
            let encoded = synchsafe(len);
            assert!(encoded.iter().all(|b| b & 0x80 == 0), "len {len}");
            assert_eq!(decode_synchsafe(&encoded), len, "len {len}");
        }
    }

    #[test]
    fn trailer_is_exactly_128_bytes() {
        let mut out = Vec::new();
        write_id3v1(&mut out, &sample_track()).unwrap();
        assert_eq!(out.len(), 128);
        assert_eq!(&out[..3], b"TAG");
        // Title field starts right after the marker.
        assert_eq!(&out[3..8], b"Harde");
        // Year field holds the truncated physical release date.
        assert_eq!(&out[93..97], b"2001");
        // Track number and genre close the block.
        assert_eq!(out[126], 4);
        assert_eq!(out[127], 255);
    }

    #[test]
    fn trailer_tolerates_empty_metadata() {
        let mut out = Vec::new();
        write_id3v1(&mut out, &empty_track()).unwrap();
        assert_eq!(out.len(), 128);
        assert!(out[3..33].iter().all(|&b| b == 0));
        assert_eq!(out[126], 0);
    }

    #[test]
    fn header_length_field_covers_all_frames() {
        let mut out = Vec::new();
        write_id3v2(&mut out, &sample_track(), None).unwrap();

        assert_eq!(&out[..3], b"ID3");
        assert_eq!(&out[3..5], &[0x03, 0x00]);
        let body_len = decode_synchsafe(&out[6..10]) as usize;
        assert_eq!(out.len(), 10 + body_len);
    }

    #[test]
    fn header_contains_required_frames() {
        let mut out = Vec::new();
        write_id3v2(&mut out, &sample_track(), None).unwrap();

        for id in [
            "TRCK", "TLEN", "TORY", "TYER", "TDAT", "TPUB", "TSIZ", "TFLT", "TALB", "TPE1",
            "TPE2", "TPOS", "TIT2", "TSRC",
        ] {
            assert!(
                out.windows(4).any(|w| w == id.as_bytes()),
                "missing frame {id}"
            );
        }
        // No cover was provided.
        assert!(!out.windows(4).any(|w| w == b"APIC"));
    }

    #[test]
    fn cover_frame_is_appended_last() {
        let cover = vec![0xFFu8, 0xD8, 0xFF, 0xE0];
        let mut out = Vec::new();
        write_id3v2(&mut out, &sample_track(), Some(&cover)).unwrap();

        let apic = out
            .windows(4)
            .position(|w| w == b"APIC")
            .expect("APIC frame present");
        assert!(out.windows(11).any(|w| w == b"image/jpeg\0"));
        // The cover payload closes the header.
        assert_eq!(&out[out.len() - cover.len()..], &cover[..]);
        // Every text frame sits before the picture frame.
        let tsrc = out.windows(4).position(|w| w == b"TSRC").unwrap();
        assert!(tsrc < apic);
    }

    #[test]
    fn tags_are_strictly_additive_around_audio() {
        let audio: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();

        let mut out = Vec::new();
        write_id3v2(&mut out, &sample_track(), None).unwrap();
        let header_len = out.len();
        out.extend_from_slice(&audio);
        write_id3v1(&mut out, &sample_track()).unwrap();

        assert_eq!(out.len(), header_len + audio.len() + 128);
        assert_eq!(&out[header_len..header_len + audio.len()], &audio[..]);
    }

    #[test]
    fn date_frame_renders_ddmm() {
        assert_eq!(date_ddmm("2008-11-21"), "2111");
        assert_eq!(date_ddmm(""), "");
        assert_eq!(date_ddmm("2008"), "");
    }

    #[test]
    fn track_position_includes_total_when_known() {
        let mut track = sample_track();
        track.set_track_total(14);
        let mut out = Vec::new();
        write_id3v2(&mut out, &track, None).unwrap();
        assert!(out.windows(4).any(|w| w == b"4/14"));
    }
}
