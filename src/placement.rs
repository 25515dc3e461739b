//! On-disk library layout and deduplicated placement.
//!
//! Every track is downloaded exactly once into the flat canonical store
//! (`<base>/Tracks/`). Collections never get their own copy: albums,
//! playlists and favorites receive links onto the canonical file, hard or
//! symbolic per configuration. Placement is idempotent; an existing path
//! is never overwritten or deleted, so an interrupted run completes its
//! missing links on the next invocation.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex_lite::Regex;
use serde::Deserialize;

use crate::error::Result;

/// How non-canonical placements are materialized.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Debug, Hash)]
pub enum LinkType {
    /// Hard link; placements survive moving the canonical store.
    #[default]
    #[serde(rename = "hardlink")]
    Hard,
    /// Symbolic link; placements stay legible as pointers.
    #[serde(rename = "symlink")]
    Symbolic,
}

/// A canonical file on disk.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Artifact {
    /// Absolute path of the canonical file.
    pub path: PathBuf,
    /// File name component, reused for every link.
    pub file_name: String,
}

/// The library tree rooted at the configured base directory.
#[derive(Clone, Debug)]
pub struct Layout {
    base: PathBuf,
    link_type: LinkType,
}

/// Output extensions the pipeline can produce.
///
/// The duplicate check probes exactly these; each maps to one codec
/// family.
const EXTENSIONS: [&str; 2] = ["mp3", "flac"];

impl Layout {
    #[must_use]
    pub fn new(base: PathBuf, link_type: LinkType) -> Self {
        Self { base, link_type }
    }

    /// Flat canonical track store.
    #[must_use]
    pub fn tracks_dir(&self) -> PathBuf {
        self.base.join("Tracks")
    }

    /// Favorite tracks region.
    #[must_use]
    pub fn favorites_dir(&self) -> PathBuf {
        self.base.join("Library").join("Favorites")
    }

    /// Playlists region.
    #[must_use]
    pub fn playlists_dir(&self) -> PathBuf {
        self.base.join("Library").join("Playlists")
    }

    /// Directory holding one playlist's links.
    #[must_use]
    pub fn playlist_dir(&self, dir_name: &str) -> PathBuf {
        self.playlists_dir().join(dir_name)
    }

    /// Directory holding one album's links and cover.
    #[must_use]
    pub fn album_dir(&self, artist: &str, album_title: &str) -> PathBuf {
        self.base
            .join("Library")
            .join("Artists")
            .join(sanitize_dir_name(artist, "artist"))
            .join(sanitize_dir_name(album_title, "album"))
    }

    /// Canonical file name for a track, `Artist - Title.ext`.
    #[must_use]
    pub fn file_name(artist: &str, title: &str, extension: &str) -> String {
        sanitize_file_name(&format!("{artist} - {title}.{extension}"))
    }

    /// File name without the extension, used as the failure signature.
    #[must_use]
    pub fn file_stem(artist: &str, title: &str) -> String {
        sanitize_file_name(&format!("{artist} - {title}"))
    }

    /// Looks for an already-downloaded canonical file in any supported
    /// output extension.
    ///
    /// A hit short-circuits the whole acquisition pipeline: re-runs do no
    /// network work for tracks that are already on disk.
    #[must_use]
    pub fn find_existing(&self, artist: &str, title: &str) -> Option<Artifact> {
        let tracks_dir = self.tracks_dir();
        for extension in EXTENSIONS {
            let file_name = Self::file_name(artist, title, extension);
            let path = tracks_dir.join(&file_name);
            if path.exists() {
                return Some(Artifact { path, file_name });
            }
        }
        None
    }

    /// Materializes one placement as a link onto the canonical file.
    ///
    /// Creates the collection directory as needed and skips placements
    /// that already exist; nothing on disk is ever overwritten.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` if the directory or link cannot be
    /// created. The failure is terminal for this placement only.
    pub fn link_into(&self, canonical: &Path, dir: &Path, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let target = dir.join(file_name);
        if target.symlink_metadata().is_ok() {
            debug!("placement {} already exists", target.display());
            return Ok(target);
        }

        match self.link_type {
            LinkType::Hard => fs::hard_link(canonical, &target)?,
            LinkType::Symbolic => symlink(canonical, &target)?,
        }

        Ok(target)
    }

    /// Writes a playlist index file listing `entries` in track order.
    ///
    /// The index lives next to the playlist directory
    /// (`Library/Playlists/<name>.m3u`) and is regenerated in full on
    /// every run rather than patched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` if the file cannot be written.
    pub fn write_playlist_index(&self, dir_name: &str, entries: &[String]) -> Result<PathBuf> {
        let playlists_dir = self.playlists_dir();
        fs::create_dir_all(&playlists_dir)?;

        let path = playlists_dir.join(format!("{dir_name}.m3u"));
        let mut contents = String::from("#EXTM3U\n");
        for entry in entries {
            contents.push_str(entry);
            contents.push('\n');
        }
        fs::write(&path, contents)?;

        Ok(path)
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Makes a track file name filesystem-safe.
///
/// Only the path separator needs replacing; it becomes a division slash
/// so titles keep their punctuation.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.replace('/', "\u{2215}")
}

/// Makes a collection name directory-safe.
///
/// Collapses everything outside `[A-Za-z0-9_]` into single underscores
/// and trims them from the ends. Names that sanitize away entirely get a
/// random suffix so two such collections don't collide.
#[must_use]
pub fn sanitize_dir_name(name: &str, kind: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("valid regex"));

    let sanitized = unsafe_chars.replace_all(name, "_");
    let sanitized = sanitized.trim_matches('_');

    if sanitized.is_empty() {
        format!("{kind}_{:06x}", fastrand::u32(..) & 0x00FF_FFFF)
    } else {
        sanitized.to_owned()
    }
}
