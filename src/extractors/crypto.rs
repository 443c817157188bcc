//! AES-256-CBC helpers for embed hosts that encrypt their API payloads.
//!
//! Two shapes show up in the wild:
//! - a raw key and IV baked into the player, with base64 ciphertext;
//! - an OpenSSL passphrase envelope (`Salted__` + 8 byte salt + ciphertext),
//!   keyed through `EVP_BytesToKey` with MD5.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use thiserror::Error;

use crate::error::ScrapeError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const SALTED_MAGIC: &[u8] = b"Salted__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key or IV length")]
    InvalidLength,

    #[error("Ciphertext is not valid base64")]
    Base64,

    #[error("Bad padding, wrong key?")]
    Padding,

    #[error("Missing Salted__ header")]
    MissingSalt,

    #[error("Plaintext is not UTF-8")]
    Utf8,
}

impl From<CryptoError> for ScrapeError {
    fn from(err: CryptoError) -> Self {
        Self::UpstreamLogicMismatch(format!("Decryption failed: {err}"))
    }
}

pub fn encrypt_base64(plain: &[u8], key: &[u8], iv: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidLength)?;
    Ok(STANDARD.encode(cipher.encrypt_padded_vec_mut::<Pkcs7>(plain)))
}

pub fn decrypt_base64(data: &str, key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let raw = STANDARD
        .decode(data.trim())
        .map_err(|_| CryptoError::Base64)?;
    decrypt_raw(&raw, key, iv)
}

pub fn decrypt_base64_to_string(data: &str, key: &[u8], iv: &[u8]) -> Result<String, CryptoError> {
    String::from_utf8(decrypt_base64(data, key, iv)?).map_err(|_| CryptoError::Utf8)
}

/// Decrypts an OpenSSL passphrase envelope, as produced by `openssl enc -md md5`
/// or CryptoJS with a string key.
pub fn decrypt_with_passphrase(data: &str, passphrase: &str) -> Result<String, CryptoError> {
    let raw = STANDARD
        .decode(data.trim())
        .map_err(|_| CryptoError::Base64)?;
    if raw.len() < 16 || &raw[..8] != SALTED_MAGIC {
        return Err(CryptoError::MissingSalt);
    }

    let (key, iv) = evp_bytes_to_key(passphrase.as_bytes(), &raw[8..16]);
    let plain = decrypt_raw(&raw[16..], &key, &iv)?;
    String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
}

fn decrypt_raw(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}

/// OpenSSL's legacy key derivation: repeated MD5 over (previous || pass || salt).
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; 32], [u8; 16]) {
    let mut derived = Vec::with_capacity(48);
    let mut block: Vec<u8> = Vec::new();

    while derived.len() < 48 {
        let mut hasher = Md5::new();
        hasher.update(&block);
        hasher.update(passphrase);
        hasher.update(salt);
        block = hasher.finalize().to_vec();
        derived.extend_from_slice(&block);
    }

    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&derived[..32]);
    iv.copy_from_slice(&derived[32..48]);
    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"37911490979715163134003223491201";
    const IV: &[u8] = b"3134003223491201";

    #[test]
    fn test_encrypt_matches_openssl() {
        // openssl enc -aes-256-cbc -K <hex KEY> -iv <hex IV> -base64
        assert_eq!(encrypt_base64(b"MTgwMzEw", KEY, IV).unwrap(), "sdhyYCaPg9a0gv8SKLW0fA==");
    }

    #[test]
    fn test_decrypt_matches_openssl() {
        let plain =
            decrypt_base64_to_string("9Rbx8Azx+aWQ8e91Xy7mXHhGkRhDSFM0XiPcUTawUdQ=", KEY, IV).unwrap();
        assert_eq!(plain, "id=abc&title=Episode+1");
    }

    #[test]
    fn test_passphrase_envelope() {
        let data = "U2FsdGVkX18BAgMEBQYHCFMw5iB5RTAgLH4kLqym5KlPX8utyf0tPy8CmV0oFfVc8+AAfRxTI5ezD1WGUmx3hVYxQsG0PhwsMKQH2GhRAYs=";
        let plain = decrypt_with_passphrase(data, "c1d17096f2ca11b7").unwrap();
        assert_eq!(plain, r#"[{"file":"https://cdn.example/master.m3u8","type":"hls"}]"#);
    }

    #[test]
    fn test_wrong_inputs_fail_cleanly() {
        assert_eq!(decrypt_with_passphrase("bm90IHNhbHRlZA==", "k"), Err(CryptoError::MissingSalt));
        assert_eq!(decrypt_base64("%%%", KEY, IV), Err(CryptoError::Base64));
        assert_eq!(encrypt_base64(b"x", b"short", IV), Err(CryptoError::InvalidLength));
    }
}
