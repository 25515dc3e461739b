//! Deezer library downloader with deduplicated storage.
//!
//! Downloads tracks, albums, playlists and favorites into a local library
//! tree: one canonical copy per track under `Tracks/`, every collection
//! materialized as links onto it, standard tags embedded in the audio.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod arl;
pub mod config;
pub mod decrypt;
pub mod downloader;
pub mod error;
pub mod gateway;
pub mod http;
pub mod placement;
pub mod protocol;
pub mod report;
pub mod tag;
pub mod track;
