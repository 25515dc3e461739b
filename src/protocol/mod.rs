//! Wire formats for the Deezer services this crate talks to.
//!
//! * [`gateway`] - the `gw-light.php` gateway and public API listings
//! * [`media`] - the media server that resolves track tokens to URLs

pub mod gateway;
pub mod media;
