//! Save envelope codec for Hollow Knight and Hollow Knight: Silksong.
//!
//! # Envelope
//!
//! ```text
//! [ MAGIC (22 B) | size (1-5 B) | base64 text | TRAILER (1 B) ]
//! ```
//!
//! `MAGIC` and `TRAILER` are the framing of a .NET `BinaryFormatter` string
//! record.  The size field holds the base64 text length in 7-bit groups,
//! least significant first, high bit set on every group but the last.  The base64
//! text is the AES-256-ECB ciphertext (see [`crate::crypto`]) of the UTF-8 save
//! state.
//!
//! # Size field
//! The size field is advisory on decode: the text is everything between the
//! size field and the trailer, whatever the field says.  Files written by
//! other tools do not always agree with it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::crypto::{decrypt_ecb, encrypt_ecb, CryptoError, KEY_LEN};

/// Fixed envelope prefix.
pub const MAGIC: [u8; 22] = [
    0, 1, 0, 0, 0, 255, 255, 255, 255, 1, 0, 0, 0, 0, 0, 0, 0, 6, 1, 0, 0, 0,
];
/// Fixed envelope trailer byte.
pub const TRAILER: u8 = 0x0B;
/// Key used by the game engine.  Must not change.
pub const SAVE_KEY: &[u8; KEY_LEN] = b"UKu52ePUBwetZ9wNX88o54dnfKRu0T1l";

/// Longest size field read on decode.
pub const MAX_SIZE_FIELD_LEN: usize = 5;
/// Largest length representable in the 4 groups written on encode.
pub const MAX_ENCODED_LEN: usize = (1 << 28) - 1;

#[derive(Error, Debug)]
pub enum SaveCodecError {
    #[error("Envelope too short ({0} bytes)")]
    Truncated(usize),
    #[error("Invalid envelope magic: {found}")]
    InvalidMagic { found: String },
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Decryption failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Decrypted save is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// A framed save file, borrowed from its source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Value of the size field.  Not used to bound `text`.
    pub declared_len:   u64,
    pub size_field_len: usize,
    /// Base64 ciphertext.
    pub text:           &'a [u8],
}

impl<'a> Envelope<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SaveCodecError> {
        if bytes.len() < MAGIC.len() + 1 {
            return Err(SaveCodecError::Truncated(bytes.len()));
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(SaveCodecError::InvalidMagic {
                found: hex::encode(&bytes[..MAGIC.len()]),
            });
        }

        let body = &bytes[MAGIC.len()..bytes.len() - 1];
        let (declared_len, size_field_len) = read_size_field(body);
        let text = &body[size_field_len..];

        if declared_len != text.len() as u64 {
            debug!(declared_len, actual = text.len(), "envelope size field disagrees with payload");
        }
        Ok(Self { declared_len, size_field_len, text })
    }
}

/// Read a 7-bit-group length.  Returns the value and the bytes consumed.
pub fn read_size_field(body: &[u8]) -> (u64, usize) {
    let mut value = 0u64;
    let mut consumed = 0;
    for (i, &byte) in body.iter().take(MAX_SIZE_FIELD_LEN).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * i);
        consumed = i + 1;
        if byte & 0x80 == 0 {
            break;
        }
    }
    (value, consumed)
}

/// Append `len` as a 7-bit-group length, capped at [`MAX_ENCODED_LEN`].
pub fn write_size_field(len: usize, out: &mut Vec<u8>) {
    let mut n = len.min(MAX_ENCODED_LEN);
    while n >> 7 != 0 {
        out.push((n & 0x7F) as u8 | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// True if the first 22 bytes of `bytes` are the envelope prefix.
pub fn is_wrapped(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

pub fn encode_bytes(plaintext: &[u8]) -> Vec<u8> {
    let text = STANDARD.encode(encrypt_ecb(SAVE_KEY, plaintext));

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + text.len() + 1);
    out.extend_from_slice(&MAGIC);
    write_size_field(text.len(), &mut out);
    out.extend_from_slice(text.as_bytes());
    out.push(TRAILER);
    out
}

/// Wrap a plaintext save (usually JSON) into an encrypted envelope.
pub fn encode(plaintext: &str) -> Vec<u8> {
    encode_bytes(plaintext.as_bytes())
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<u8>, SaveCodecError> {
    let envelope = Envelope::parse(bytes)?;
    let ciphertext = STANDARD.decode(envelope.text)?;
    Ok(decrypt_ecb(SAVE_KEY, &ciphertext)?)
}

/// Unwrap an encrypted envelope back into the plaintext save.
pub fn decode(bytes: &[u8]) -> Result<String, SaveCodecError> {
    Ok(String::from_utf8(decode_bytes(bytes)?)?)
}
