//! Track decryption for Deezer's protected media content.
//!
//! Deezer applies a striped encryption pattern to downloads:
//! * Content is divided into 2 KiB segments
//! * Every third segment is encrypted, starting with the first
//! * Encryption uses Blowfish in CBC mode with a fixed IV
//! * A final segment shorter than 2 KiB is never encrypted
//!
//! The pattern is the source service's performance trade-off, not ours; it
//! must be reproduced bit-exact or the output does not play.
//!
//! # Security
//!
//! To comply with Deezer's Terms of Service no decryption keys are included
//! in this code. The master secret must be provided externally through the
//! configuration file.
//!
//! # Memory Management
//!
//! [`Decryptor`] is push-based and buffers at most one segment: callers
//! `feed` it network chunks of any size and it writes plaintext through to
//! the sink as soon as a full segment is available.

use std::{io::Write, ops::Deref, str::FromStr};

use blowfish::{cipher::BlockDecryptMut, cipher::KeyIvInit, Blowfish};
use cbc::cipher::block_padding::NoPadding;
use md5::{Digest, Md5};
use veil::Redact;

use crate::{
    error::{Error, Result},
    protocol::media::Cipher,
    track::TrackId,
};

/// Length of decryption keys in bytes.
pub const KEY_LENGTH: usize = 16;

/// Raw key bytes.
pub type RawKey = [u8; KEY_LENGTH];

/// Validated decryption key.
///
/// Ensures keys are the correct length for use with Blowfish, and keeps
/// the bytes out of debug output.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Redact)]
pub struct Key(#[redact(fixed = 3)] RawKey);

impl FromStr for Key {
    type Err = Error;

    /// Parses a string into a decryption key.
    ///
    /// The string must be exactly 16 bytes long, as required by Blowfish
    /// and Deezer's encryption format.
    fn from_str(s: &str) -> Result<Self> {
        let len = s.len();
        if len != KEY_LENGTH {
            return Err(Error::input(format!(
                "key length is {len} but should be {KEY_LENGTH}"
            )));
        }

        let mut key = [0; KEY_LENGTH];
        key.copy_from_slice(s.as_bytes());

        Ok(Self(key))
    }
}

impl Deref for Key {
    type Target = RawKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only used to round-trip through the configuration parser; the
        // key is never printed by the application itself.
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Calculates the track-specific decryption key.
///
/// The key is derived from the MD5 hash of the decimal track id: byte `i`
/// is `hex[i] XOR hex[i + 16] XOR secret[i]`. Deterministic and pure, so
/// the same track always yields the same key across runs.
#[must_use]
pub fn key_for_track(track_id: TrackId, secret: &Key) -> Key {
    let track_hash = format!("{:x}", Md5::digest(track_id.to_string()));
    let track_hash = track_hash.as_bytes();

    let mut key = RawKey::default();
    for i in 0..KEY_LENGTH {
        key[i] = track_hash[i] ^ track_hash[i + KEY_LENGTH] ^ secret[i];
    }
    Key(key)
}

/// Streaming decryptor for protected tracks.
///
/// Call [`feed`](Self::feed) with chunks as they arrive from the network
/// and [`finish`](Self::finish) once the stream ends to flush the trailing
/// partial segment.
pub struct Decryptor {
    /// Encryption method used for this track.
    cipher: Cipher,

    /// Track-specific decryption key from [`key_for_track`].
    key: Key,

    /// Bytes carried over until a full segment is available.
    pending: Vec<u8>,

    /// Index of the next segment to be written out.
    segment: u64,
}

impl Decryptor {
    /// Fixed IV for CBC decryption.
    const CBC_BF_IV: &'static [u8; 8] = b"\x00\x01\x02\x03\x04\x05\x06\x07";

    /// Size of each segment in bytes (2 KiB).
    const CBC_SEGMENT_SIZE: usize = 2 * 1024;

    /// Number of segments in a stripe (3).
    ///
    /// Every third segment is encrypted.
    const CBC_STRIPE_COUNT: u64 = 3;

    /// Supported encryption methods.
    const SUPPORTED_CIPHERS: [Cipher; 2] = [Cipher::NONE, Cipher::BF_CBC_STRIPE];

    /// Creates a new decryptor for one track download.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decryption` if the track uses an unsupported
    /// encryption algorithm.
    pub fn new(cipher: Cipher, key: Key) -> Result<Self> {
        if !Self::SUPPORTED_CIPHERS.contains(&cipher) {
            return Err(Error::decryption(format!(
                "unsupported encryption algorithm {cipher}"
            )));
        }

        Ok(Self {
            cipher,
            key,
            pending: Vec::with_capacity(Self::CBC_SEGMENT_SIZE),
            segment: 0,
        })
    }

    /// Feeds a chunk of the encrypted stream, writing any completed
    /// segments to `sink` as plaintext.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` when the sink cannot be written and
    /// `Error::Decryption` when a segment fails to decrypt.
    pub fn feed(&mut self, chunk: &[u8], sink: &mut impl Write) -> Result<()> {
        if self.cipher == Cipher::NONE {
            sink.write_all(chunk)?;
            return Ok(());
        }

        let mut chunk = chunk;
        while !chunk.is_empty() {
            let wanted = Self::CBC_SEGMENT_SIZE - self.pending.len();
            let take = usize::min(wanted, chunk.len());
            self.pending.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            if self.pending.len() == Self::CBC_SEGMENT_SIZE {
                self.write_segment(sink)?;
            }
        }

        Ok(())
    }

    /// Flushes the trailing partial segment, if any, and consumes the
    /// decryptor.
    ///
    /// A final segment shorter than the stripe size always passes through
    /// unmodified, even on an index that would otherwise be encrypted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Filesystem` when the sink cannot be written.
    pub fn finish(mut self, sink: &mut impl Write) -> Result<()> {
        if !self.pending.is_empty() {
            sink.write_all(&self.pending)?;
            self.pending.clear();
        }

        Ok(())
    }

    /// Writes out one full buffered segment, decrypting it when its index
    /// falls on a stripe boundary.
    fn write_segment(&mut self, sink: &mut impl Write) -> Result<()> {
        let is_encrypted = self.segment % Self::CBC_STRIPE_COUNT == 0;

        if is_encrypted {
            // The cipher state is reset on each segment.
            let cipher = cbc::Decryptor::<Blowfish>::new_from_slices(&*self.key, Self::CBC_BF_IV)
                .map_err(|e| Error::decryption(e.to_string()))?;

            // The buffer is an exact multiple of the Blowfish block size,
            // so no padding is involved.
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut self.pending)
                .map_err(|e| Error::decryption(e.to_string()))?;
        }

        sink.write_all(&self.pending)?;
        self.pending.clear();
        self.segment += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use blowfish::cipher::BlockEncryptMut;

    fn test_key() -> Key {
        "0123456789abcdef".parse().unwrap()
    }

    fn secret() -> Key {
        "abcdefghijklmnop".parse().unwrap()
    }

    /// Applies the striped pattern to a plaintext fixture, producing the
    /// ciphertext a download would carry.
    fn encrypt_fixture(plain: &[u8], key: &Key) -> Vec<u8> {
        let mut out = Vec::with_capacity(plain.len());
        for (index, segment) in plain.chunks(Decryptor::CBC_SEGMENT_SIZE).enumerate() {
            let full = segment.len() == Decryptor::CBC_SEGMENT_SIZE;
            if full && index as u64 % Decryptor::CBC_STRIPE_COUNT == 0 {
                let mut buffer = segment.to_vec();
                let cipher =
                    cbc::Encryptor::<Blowfish>::new_from_slices(&**key, Decryptor::CBC_BF_IV)
                        .unwrap();
                cipher
                    .encrypt_padded_mut::<NoPadding>(&mut buffer, segment.len())
                    .unwrap();
                out.extend_from_slice(&buffer);
            } else {
                out.extend_from_slice(segment);
            }
        }
        out
    }

    fn decrypt_in_chunks(ciphertext: &[u8], key: Key, chunk_size: usize) -> Vec<u8> {
        let mut decryptor = Decryptor::new(Cipher::BF_CBC_STRIPE, key).unwrap();
        let mut out = Vec::new();
        for chunk in ciphertext.chunks(chunk_size) {
            decryptor.feed(chunk, &mut out).unwrap();
        }
        decryptor.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let id = TrackId::new(3_135_556).unwrap();
        let first = key_for_track(id, &secret());
        let second = key_for_track(id, &secret());
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_ids_yield_distinct_keys() {
        let a = key_for_track(TrackId::new(1).unwrap(), &secret());
        let b = key_for_track(TrackId::new(2).unwrap(), &secret());
        assert_ne!(a, b);
    }

    #[test]
    fn key_incorporates_both_hash_halves_and_secret() {
        let id = TrackId::new(42).unwrap();
        let hash = format!("{:x}", Md5::digest(id.to_string()));
        let hash = hash.as_bytes();
        let key = key_for_track(id, &secret());
        for i in 0..KEY_LENGTH {
            assert_eq!(key[i], hash[i] ^ hash[i + KEY_LENGTH] ^ secret()[i]);
        }
    }

    #[test]
    fn round_trips_multi_stripe_stream() {
        // Seven full segments and change: segments 0, 3 and 6 encrypted.
        let plain: Vec<u8> = (0..7 * 2048 + 512).map(|i| (i % 251) as u8).collect();
        let ciphertext = encrypt_fixture(&plain, &test_key());
        assert_ne!(ciphertext, plain);

        let out = decrypt_in_chunks(&ciphertext, test_key(), 1000);
        assert_eq!(out, plain);
    }

    #[test]
    fn chunk_boundaries_do_not_affect_output() {
        let plain: Vec<u8> = (0..4 * 2048 + 100).map(|i| (i % 199) as u8).collect();
        let ciphertext = encrypt_fixture(&plain, &test_key());

        for chunk_size in [1, 7, 2048, 5000] {
            assert_eq!(decrypt_in_chunks(&ciphertext, test_key(), chunk_size), plain);
        }
    }

    #[test]
    fn trailing_partial_segment_passes_through() {
        // Three full segments plus a 100-byte tail. The tail lands on
        // segment index 3, which would be encrypted if it were full.
        let plain: Vec<u8> = (0..3 * 2048 + 100).map(|i| (i % 17) as u8).collect();
        let ciphertext = encrypt_fixture(&plain, &test_key());

        // The tail must be identical in cipher- and plaintext.
        assert_eq!(&ciphertext[3 * 2048..], &plain[3 * 2048..]);
        assert_eq!(decrypt_in_chunks(&ciphertext, test_key(), 512), plain);
    }

    #[test]
    fn short_stream_passes_through_untouched() {
        let plain = b"shorter than one segment".to_vec();
        let out = decrypt_in_chunks(&plain, test_key(), 8);
        assert_eq!(out, plain);
    }

    #[test]
    fn unencrypted_tracks_pass_through() {
        let data: Vec<u8> = (0..5000).map(|i| (i % 97) as u8).collect();
        let mut decryptor = Decryptor::new(Cipher::NONE, test_key()).unwrap();
        let mut out = Vec::new();
        decryptor.feed(&data, &mut out).unwrap();
        decryptor.finish(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn rejects_short_keys() {
        assert!("12345".parse::<Key>().is_err());
        assert!("12345678901234567".parse::<Key>().is_err());
    }
}
