//! Catalog client for Deezer's gateway and public API.
//!
//! The gateway (`gw-light.php`) serves full track records and collection
//! pages to an `arl`-authenticated session; the public API fills in the
//! two listings the gateway does not expose conveniently (favorite track
//! ids and artist discographies). All calls go through the rate-limited
//! [`http::Client`].

use reqwest::{
    self,
    header::{HeaderValue, CONTENT_TYPE},
};
use serde::Deserialize;

use crate::{
    config::Config,
    error::{Error, Result},
    http,
    protocol::gateway::{
        listings,
        pages::{
            AlbumRequest, AlbumSummary, AlbumTrack, ArtistSummary, PlaylistRequest,
            PlaylistSummary, ProfileAlbums, ProfileArtists, ProfilePlaylists, ProfileRequest,
        },
        songs, Method, PlaylistPage, Response, SongRecord, UserData,
    },
    track::TrackId,
};

/// Client for the Deezer catalog.
pub struct Gateway {
    http_client: http::Client,
    user_data: Option<UserData>,
}

impl Gateway {
    /// The URL of the Deezer cookie origin.
    ///
    /// What matters is that the domain matches `deezer.com` so the
    /// session cookies are presented to both the gateway and the page
    /// endpoints.
    const COOKIE_ORIGIN: &'static str = "https://www.deezer.com";

    /// The URL of the Deezer gateway.
    const GATEWAY_URL: &'static str = "https://www.deezer.com/ajax/gw-light.php";

    /// The Deezer gateway version.
    const GATEWAY_VERSION: &'static str = "1.0";

    /// The Deezer gateway input type.
    const GATEWAY_INPUT: usize = 3;

    /// The base URL of the public API.
    const API_URL: &'static str = "https://api.deezer.com";

    /// Page size for public API listings.
    const API_PAGE_SIZE: usize = 1000;

    /// The `Content-Type` header value for gateway requests.
    ///
    /// Although the bodies of all gateway requests are JSON, the
    /// `Content-Type` is not.
    const PLAIN_TEXT_CONTENT: HeaderValue = HeaderValue::from_static("text/plain;charset=UTF-8");

    /// An empty JSON object used as the default request body.
    const EMPTY_JSON_OBJECT: &'static str = "{}";

    /// Error code the gateway reports for a rejected session.
    const NEED_AUTH: &'static str = "NEED_USER_AUTH_REQUIRED";

    /// The cookie origin as a `reqwest::Url`.
    ///
    /// # Panics
    ///
    /// Will panic if the URL is invalid.
    fn cookie_origin() -> reqwest::Url {
        reqwest::Url::parse(Self::COOKIE_ORIGIN).expect("invalid cookie origin")
    }

    /// Creates a cookie jar holding the session cookies the gateway
    /// expects.
    fn cookie_jar(config: &Config) -> reqwest::cookie::Jar {
        let cookie_jar = reqwest::cookie::Jar::default();
        let cookie_origin = Self::cookie_origin();

        let lang_cookie = format!(
            "dz_lang={}; Domain=deezer.com; Path=/; Secure; HttpOnly",
            &config.app_lang
        );
        cookie_jar.add_cookie_str(&lang_cookie, &cookie_origin);

        let arl_cookie = format!(
            "arl={}; Domain=deezer.com; Path=/; Secure; HttpOnly",
            config.arl
        );
        cookie_jar.add_cookie_str(&arl_cookie, &cookie_origin);

        let comeback_cookie = "comeback=1; Domain=deezer.com; Path=/; Secure; HttpOnly";
        cookie_jar.add_cookie_str(comeback_cookie, &cookie_origin);

        cookie_jar
    }

    /// Creates a new gateway client from the configuration.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let cookie_jar = Self::cookie_jar(config);
        let http_client = http::Client::new(config, cookie_jar)?;

        Ok(Self {
            http_client,
            user_data: None,
        })
    }

    /// The underlying HTTP client, shared with the media and CDN
    /// requests so they reuse the session cookies and user agent.
    #[must_use]
    pub fn http(&self) -> &http::Client {
        &self.http_client
    }

    /// Refreshes the session: fetches the API token, license token and
    /// user identity for the configured `arl`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the `arl` is invalid or expired, or the HTTP
    /// request failed.
    pub async fn refresh(&mut self) -> Result<()> {
        match self
            .request::<UserData>(Self::EMPTY_JSON_OBJECT.to_owned())
            .await
        {
            Ok(response) => {
                if let Some(data) = response.first() {
                    info!(
                        "signed in as {} ({})",
                        data.user.name,
                        data.country().to_uppercase()
                    );
                    self.user_data = Some(data.clone());
                    Ok(())
                } else {
                    Err(Error::auth("no user data received".to_string()))
                }
            }
            Err(Error::Transport(e)) => {
                // For an invalid or expired `arl`, the response has some
                // fields as integer `0` which are normally typed as string,
                // which causes JSON deserialization to fail.
                if e.is_decode() {
                    return Err(Error::auth(format!("{e}: please refresh your arl")));
                }
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }

    /// License token required by the media server.
    #[must_use]
    pub fn license_token(&self) -> Option<&str> {
        self.user_data
            .as_ref()
            .map(|data| data.user.options.license_token.as_str())
    }

    /// Identity of the signed-in user.
    #[must_use]
    pub fn user_id(&self) -> Option<u64> {
        self.user_data.as_ref().map(|data| data.user.id)
    }

    /// Two-letter catalog country of the session, `us` before sign-in.
    #[must_use]
    pub fn country(&self) -> String {
        self.user_data
            .as_ref()
            .map_or_else(|| "us".to_owned(), UserData::country)
    }

    /// Performs one gateway request for the method tied to `T`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the HTTP request fails, the response cannot
    /// be parsed, or the gateway reports an error.
    async fn request<T>(&mut self, body: String) -> Result<Response<T>>
    where
        T: Method + for<'de> Deserialize<'de>,
    {
        // Get the API token from the user data or use an empty string:
        // the session bootstrap itself is made without one.
        let api_token = self
            .user_data
            .as_ref()
            .map(|data| data.api_token.as_str())
            .unwrap_or_default();

        // Check the URL early to not needlessly hit the rate limiter.
        let url_str = format!(
            "{}?method={}&input={}&api_version={}&api_token={api_token}",
            Self::GATEWAY_URL,
            T::METHOD,
            Self::GATEWAY_INPUT,
            Self::GATEWAY_VERSION,
        );
        let url = url_str.parse::<reqwest::Url>()?;
        let mut request = self.http_client.post(url, body);

        let request_headers = request.headers_mut();
        request_headers.insert(CONTENT_TYPE, Self::PLAIN_TEXT_CONTENT);

        let response = self.http_client.execute(request).await?;
        let result = response.json::<Response<T>>().await?;

        if result.has_error() {
            if result.has_error_code(Self::NEED_AUTH) {
                return Err(Error::auth(
                    "invalid credentials; please check your configuration file",
                ));
            }
            return Err(Error::Gateway(format!(
                "{}: {}",
                T::METHOD,
                result.error()
            )));
        }

        trace!("{}: {} result(s)", T::METHOD, result.all().len());
        Ok(result)
    }

    /// Fetches full records for a list of track ids, in order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails.
    pub async fn songs(&mut self, ids: &[TrackId]) -> Result<Vec<SongRecord>> {
        let request = songs::Request {
            song_ids: ids.to_vec(),
        };
        let body = serde_json::to_string(&request)?;
        let response = self.request::<SongRecord>(body).await?;
        Ok(response.into_all())
    }

    /// Fetches the full record for one track id.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails or the track is unknown.
    pub async fn song(&mut self, id: TrackId) -> Result<SongRecord> {
        self.songs(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Gateway(format!("no record for track {id}")))
    }

    /// Fetches an album's track records in disc order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails.
    pub async fn album_tracks(&mut self, album_id: u64) -> Result<Vec<SongRecord>> {
        let request = AlbumRequest {
            album_id,
            start: 0,
            nb: 500,
        };
        let body = serde_json::to_string(&request)?;
        let response = self.request::<AlbumTrack>(body).await?;
        Ok(response.into_all().into_iter().map(|track| track.0).collect())
    }

    /// Fetches a playlist page: header data plus ordered track records.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails or the playlist is unknown.
    pub async fn playlist(&mut self, playlist_id: u64) -> Result<PlaylistPage> {
        let request = PlaylistRequest {
            playlist_id,
            lang: self.country(),
            nb: -1,
            start: 0,
            tab: 0,
            header: true,
        };
        let body = serde_json::to_string(&request)?;
        let response = self.request::<PlaylistPage>(body).await?;
        response
            .into_all()
            .into_iter()
            .next()
            .ok_or_else(|| Error::Gateway(format!("no data for playlist {playlist_id}")))
    }

    /// Lists a user's playlists.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails.
    pub async fn user_playlists(&mut self, user_id: u64) -> Result<Vec<PlaylistSummary>> {
        let body = serde_json::to_string(&Self::profile_request(user_id, "playlists"))?;
        let response = self.request::<ProfilePlaylists>(body).await?;
        Ok(response
            .into_all()
            .into_iter()
            .flat_map(|page| page.tab.playlists.data)
            .collect())
    }

    /// Lists a user's saved albums.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails.
    pub async fn user_albums(&mut self, user_id: u64) -> Result<Vec<AlbumSummary>> {
        let body = serde_json::to_string(&Self::profile_request(user_id, "albums"))?;
        let response = self.request::<ProfileAlbums>(body).await?;
        Ok(response
            .into_all()
            .into_iter()
            .flat_map(|page| page.tab.albums.data)
            .collect())
    }

    /// Lists a user's favorite artists.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the request fails.
    pub async fn user_favorite_artists(&mut self, user_id: u64) -> Result<Vec<ArtistSummary>> {
        let body = serde_json::to_string(&Self::profile_request(user_id, "artists"))?;
        let response = self.request::<ProfileArtists>(body).await?;
        Ok(response
            .into_all()
            .into_iter()
            .flat_map(|page| page.tab.artists.data)
            .collect())
    }

    fn profile_request(user_id: u64, tab: &str) -> ProfileRequest {
        ProfileRequest {
            user_id,
            tab: tab.to_owned(),
            nb: 10_000,
        }
    }

    /// Enumerates a user's favorite track ids through the public API.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a page request fails or an id is invalid.
    pub async fn favorite_track_ids(&mut self, user_id: u64) -> Result<Vec<TrackId>> {
        let first = format!(
            "{}/user/{user_id}/tracks?limit={}",
            Self::API_URL,
            Self::API_PAGE_SIZE
        );

        let mut ids = Vec::new();
        let mut next = Some(first.parse::<reqwest::Url>()?);
        while let Some(url) = next {
            let page = self.listing_page::<listings::TrackRef>(url).await?;
            for track in &page.data {
                let id = TrackId::new(track.id)
                    .ok_or_else(|| Error::input("track id must not be zero"))?;
                ids.push(id);
            }
            next = page.next;
        }

        Ok(ids)
    }

    /// Enumerates an artist's album ids through the public API.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a page request fails.
    pub async fn artist_album_ids(&mut self, artist_id: u64) -> Result<Vec<u64>> {
        let first = format!(
            "{}/artist/{artist_id}/albums?limit={}",
            Self::API_URL,
            Self::API_PAGE_SIZE
        );

        let mut ids = Vec::new();
        let mut next = Some(first.parse::<reqwest::Url>()?);
        while let Some(url) = next {
            let page = self.listing_page::<listings::AlbumRef>(url).await?;
            ids.extend(page.data.iter().map(|album| album.id));
            next = page.next;
        }

        Ok(ids)
    }

    /// Fetches one page of a public API listing.
    async fn listing_page<T>(&mut self, url: reqwest::Url) -> Result<listings::Page<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = self.http_client.get(url, "");
        let response = self.http_client.execute(request).await?;
        Ok(response.json::<listings::Page<T>>().await?)
    }
}
