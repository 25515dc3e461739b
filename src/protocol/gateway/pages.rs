//! Album, playlist and profile pages from the gateway API.
//!
//! These endpoints return collection-shaped data: an ordered set of track
//! records plus the collection's own metadata (title, id, track count).

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use super::{Method, Paginated, SongRecord};

/// Wrapper for album track records.
///
/// Contains the same record as [`SongRecord`] but fetched through the
/// album listing endpoint, which returns the album's tracks in disc
/// order.
#[derive(Clone, PartialEq, Deserialize, Debug)]
#[serde(transparent)]
pub struct AlbumTrack(pub SongRecord);

impl Method for AlbumTrack {
    const METHOD: &'static str = "song.getListByAlbum";
}

impl Deref for AlbumTrack {
    type Target = SongRecord;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Request parameters for an album's track listing.
#[derive(Clone, Eq, PartialEq, Serialize, Debug, Hash)]
pub struct AlbumRequest {
    #[serde(rename = "alb_id")]
    pub album_id: u64,
    pub start: u64,
    pub nb: u64,
}

/// Gateway method name for retrieving a playlist page.
impl Method for PlaylistPage {
    const METHOD: &'static str = "deezer.pagePlaylist";
}

/// A playlist page: header data plus the ordered track records.
///
/// # Wire Format
///
/// ```json
/// {
///     "DATA": {
///         "PLAYLIST_ID": "123",
///         "TITLE": "Road Trip",
///         "NB_SONG": 42
///     },
///     "SONGS": {
///         "data": [ ...song records... ],
///         "count": 42,
///         "total": 42
///     }
/// }
/// ```
#[derive(Clone, PartialEq, Deserialize)]
pub struct PlaylistPage {
    #[serde(rename = "DATA")]
    pub data: PlaylistInfo,

    #[serde(rename = "SONGS")]
    pub songs: Paginated<SongRecord>,
}

/// Playlist header data.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct PlaylistInfo {
    #[serde(rename = "PLAYLIST_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,

    #[serde(default)]
    #[serde(rename = "TITLE")]
    pub title: String,

    #[serde(default)]
    #[serde(rename = "NB_SONG")]
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub song_count: Option<u64>,
}

/// Request parameters for a playlist page.
#[derive(Clone, Eq, PartialEq, Serialize, Debug, Hash)]
pub struct PlaylistRequest {
    pub playlist_id: u64,
    pub lang: String,
    /// Number of songs to return; `-1` returns the whole playlist.
    pub nb: i64,
    pub start: u64,
    pub tab: u64,
    pub header: bool,
}

/// Request parameters for a profile page tab.
#[derive(Clone, Eq, PartialEq, Serialize, Debug, Hash)]
pub struct ProfileRequest {
    #[serde(rename = "USER_ID")]
    pub user_id: u64,
    /// One of `playlists`, `albums` or `artists`.
    pub tab: String,
    pub nb: u64,
}

/// The playlists tab of a user profile.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct ProfilePlaylists {
    #[serde(rename = "TAB")]
    pub tab: PlaylistsTab,
}

impl Method for ProfilePlaylists {
    const METHOD: &'static str = "deezer.pageProfile";
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct PlaylistsTab {
    pub playlists: Paginated<PlaylistSummary>,
}

/// Playlist identity as listed on a profile page.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct PlaylistSummary {
    #[serde(rename = "PLAYLIST_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,

    #[serde(default)]
    #[serde(rename = "TITLE")]
    pub title: String,
}

/// The albums tab of a user profile.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct ProfileAlbums {
    #[serde(rename = "TAB")]
    pub tab: AlbumsTab,
}

impl Method for ProfileAlbums {
    const METHOD: &'static str = "deezer.pageProfile";
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct AlbumsTab {
    pub albums: Paginated<AlbumSummary>,
}

/// Album identity as listed on a profile page.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct AlbumSummary {
    #[serde(rename = "ALB_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,

    #[serde(default)]
    #[serde(rename = "ALB_TITLE")]
    pub title: String,
}

/// The artists tab of a user profile.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct ProfileArtists {
    #[serde(rename = "TAB")]
    pub tab: ArtistsTab,
}

impl Method for ProfileArtists {
    const METHOD: &'static str = "deezer.pageProfile";
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct ArtistsTab {
    pub artists: Paginated<ArtistSummary>,
}

/// Artist identity as listed on a profile page.
#[serde_as]
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct ArtistSummary {
    #[serde(rename = "ART_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub id: u64,

    #[serde(default)]
    #[serde(rename = "ART_NAME")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gateway::Response;

    #[test]
    fn parses_playlist_page() {
        let json = r#"{
            "error": [],
            "results": {
                "DATA": {"PLAYLIST_ID": "900", "TITLE": "Mix", "NB_SONG": 2},
                "SONGS": {
                    "data": [
                        {"SNG_ID": "1", "SNG_TITLE": "One", "TRACK_TOKEN": "a"},
                        {"SNG_ID": "2", "SNG_TITLE": "Two", "TRACK_TOKEN": "b"}
                    ],
                    "count": 2,
                    "total": 2
                }
            }
        }"#;

        let response: Response<PlaylistPage> = serde_json::from_str(json).unwrap();
        let page = response.first().unwrap();
        assert_eq!(page.data.id, 900);
        assert_eq!(page.data.title, "Mix");
        assert_eq!(page.songs.data.len(), 2);
        assert_eq!(page.songs.data[1].title, "Two");
    }

    #[test]
    fn parses_profile_playlists_tab() {
        let json = r#"{
            "error": [],
            "results": {
                "TAB": {
                    "playlists": {
                        "data": [{"PLAYLIST_ID": 5, "TITLE": "Favs"}],
                        "count": 1,
                        "total": 1
                    }
                }
            }
        }"#;

        let response: Response<ProfilePlaylists> = serde_json::from_str(json).unwrap();
        let tab = &response.first().unwrap().tab;
        assert_eq!(tab.playlists.data[0].id, 5);
        assert_eq!(tab.playlists.data[0].title, "Favs");
    }
}
