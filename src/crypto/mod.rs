//! AES-256-ECB with PKCS#7 padding.
//!
//! Used by the save codec, whose key and mode are fixed by the game engine that
//! reads the files.  There is no IV and no authentication tag: a wrong key or a
//! damaged ciphertext is only noticed through invalid padding.
//!
//! Ciphertext layout: `[ block 0 | block 1 | ... ]`, each 16 bytes, the last one
//! carrying 1–16 bytes of PKCS#7 padding.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use thiserror::Error;

/// AES block length.
pub const BLOCK_LEN: usize = 16;
/// AES-256 key length.
pub const KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Ciphertext length {0} is not a positive multiple of {BLOCK_LEN}")]
    BadLength(usize),
    #[error("Invalid PKCS#7 padding, wrong key or corrupted data")]
    BadPadding,
}

/// Encrypt `plaintext`, always appending PKCS#7 padding.
pub fn encrypt_ecb(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256::new(GenericArray::from_slice(&key[..]));
    let pad = BLOCK_LEN - plaintext.len() % BLOCK_LEN;

    let mut out = Vec::with_capacity(plaintext.len() + pad);
    out.extend_from_slice(plaintext);
    out.resize(plaintext.len() + pad, pad as u8);

    for block in out.chunks_exact_mut(BLOCK_LEN) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    out
}

/// Decrypt a payload produced by [`encrypt_ecb`] and strip its padding.
pub fn decrypt_ecb(key: &[u8; KEY_LEN], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::BadLength(data.len()));
    }
    let cipher = Aes256::new(GenericArray::from_slice(&key[..]));

    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(BLOCK_LEN) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }

    let pad = out[out.len() - 1] as usize;
    if pad == 0 || pad > BLOCK_LEN || out[out.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::BadPadding);
    }
    out.truncate(out.len() - pad);
    Ok(out)
}
