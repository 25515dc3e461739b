//! Runtime configuration loaded from a TOML file.
//!
//! The configuration file holds everything that grants account access (the
//! `arl` cookie and the stream cipher secret) next to the download
//! preferences, so there is exactly one file to keep private.
//!
//! ```toml
//! [deezer]
//! arl = "..."
//! bf_secret = "16 byte secret.."
//! preferred_quality = "mp3_320"
//!
//! [downloads]
//! music_dir = "/home/user/Music"
//! link_type = "hardlink"
//! ```

use std::{fs, path::PathBuf};

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::{
    arl::Arl,
    decrypt::Key,
    error::{Error, Result},
    placement::LinkType,
    protocol::media::AudioQuality,
};

/// Resolved runtime configuration.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    /// `User-Agent` presented to both the gateway and the CDN.
    pub user_agent: String,

    pub arl: Arl,

    /// Master secret for per-track key derivation. Never embedded in the
    /// source; always supplied by the user.
    pub bf_secret: Key,

    pub quality: AudioQuality,
    pub music_dir: PathBuf,
    pub link_type: LinkType,
}

/// On-disk representation of the configuration file.
#[derive(Clone, Deserialize, Debug)]
struct Settings {
    deezer: DeezerSettings,
    downloads: DownloadSettings,
}

#[serde_as]
#[derive(Clone, Deserialize, Debug)]
struct DeezerSettings {
    #[serde_as(as = "DisplayFromStr")]
    arl: Arl,

    #[serde_as(as = "DisplayFromStr")]
    bf_secret: Key,

    #[serde(default)]
    #[serde_as(as = "DisplayFromStr")]
    preferred_quality: AudioQuality,
}

#[derive(Clone, Deserialize, Debug)]
struct DownloadSettings {
    music_dir: PathBuf,

    #[serde(default)]
    link_type: LinkType,
}

impl Config {
    /// Upper bound on the configuration file size.
    ///
    /// The file holds a handful of short strings; anything larger is a
    /// mixed-up path rather than a configuration file.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Loads and validates the configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` if the file cannot be read and
    /// `Error::Input` if it cannot be parsed or fails validation.
    pub fn from_file(path: &str) -> Result<Self> {
        let attributes = fs::metadata(path)?;
        let file_size = attributes.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::input(format!(
                "{path} is too large ({file_size} bytes)"
            )));
        }

        let contents = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| Error::input(format!("{path} is invalid: {e}")))?;

        Ok(Self::with_settings(settings))
    }

    fn with_settings(settings: Settings) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of
        // `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            panic!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            );
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        // Present ourselves like a desktop client.
        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop; {app_lang})");
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,
            app_lang,
            user_agent,
            arl: settings.deezer.arl,
            bf_secret: settings.deezer.bf_secret,
            quality: settings.deezer.preferred_quality,
            music_dir: settings.downloads.music_dir,
            link_type: settings.downloads.link_type,
        }
    }
}
