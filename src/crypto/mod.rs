//! Password-based symmetric encryption for secrets stored in config values.
//!
//! The key is the SHA-256 digest of the password; payloads are AES-256 in
//! 8-bit CFB mode with a fresh random IV prepended to the ciphertext.

use base64::{Engine as _, engine::general_purpose};
use cfb8::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256Cfb8Enc = cfb8::Encryptor<aes::Aes256>;
type Aes256Cfb8Dec = cfb8::Decryptor<aes::Aes256>;

/// Length of the initialization vector prefix, one AES block.
pub const IV_LEN: usize = 16;

/// Failures while decoding or decrypting a payload.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The stored text is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload is too short to hold an IV.
    #[error("payload of {len} bytes is shorter than the {IV_LEN}-byte IV")]
    Truncated {
        /// Length of the rejected payload
        len: usize,
    },

    /// The decrypted bytes are not UTF-8, usually because the password is wrong.
    #[error("decrypted payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn derive_key(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Encrypts `data` under `password`, returning `IV || ciphertext`.
pub fn encrypt(data: &[u8], password: &str) -> Vec<u8> {
    let key = derive_key(password);
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let mut buf = data.to_vec();
    Aes256Cfb8Enc::new(&key.into(), &iv.into()).encrypt(&mut buf);

    let mut out = Vec::with_capacity(IV_LEN + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    out
}

/// Decrypts an `IV || ciphertext` payload.
///
/// A wrong password does not fail here; it yields garbled bytes.
///
/// # Errors
/// Returns `CryptoError::Truncated` if `data` is shorter than the IV.
pub fn decrypt(data: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    if data.len() < IV_LEN {
        return Err(CryptoError::Truncated { len: data.len() });
    }

    let (iv, cipher) = data.split_at(IV_LEN);
    let mut iv_block = [0u8; IV_LEN];
    iv_block.copy_from_slice(iv);
    let key = derive_key(password);

    let mut buf = cipher.to_vec();
    Aes256Cfb8Dec::new(&key.into(), &iv_block.into()).decrypt(&mut buf);
    Ok(buf)
}

/// Encrypts text and base64-wraps it for storage in a JSON string.
pub fn encrypt_string(text: &str, password: &str) -> String {
    general_purpose::STANDARD.encode(encrypt(text.as_bytes(), password))
}

/// Reverses [`encrypt_string`].
///
/// # Errors
/// Returns an error if the text is not base64, is truncated, or does not
/// decrypt to UTF-8.
pub fn decrypt_string(text: &str, password: &str) -> Result<String, CryptoError> {
    let payload = general_purpose::STANDARD.decode(text)?;
    let plain = decrypt(&payload, password)?;
    Ok(String::from_utf8(plain)?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn recovers_plaintext_with_the_right_password() {
        let sealed = encrypt_string("database password", "hunter2");
        assert_eq!(decrypt_string(&sealed, "hunter2").unwrap(), "database password");
    }

    #[test]
    fn fresh_iv_per_call() {
        let first = encrypt(b"same input", "pw");
        let second = encrypt(b"same input", "pw");

        assert_eq!(first.len(), IV_LEN + b"same input".len());
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_password_garbles_instead_of_failing() {
        let sealed = encrypt(b"{\"user\":\"admin\"}", "right");
        let opened = decrypt(&sealed, "wrong").unwrap();
        assert_ne!(opened, b"{\"user\":\"admin\"}");
    }

    #[test]
    fn rejects_truncated_and_non_base64_payloads() {
        assert!(matches!(
            decrypt(&[1, 2, 3], "pw"),
            Err(CryptoError::Truncated { len: 3 })
        ));
        assert!(matches!(
            decrypt_string("not base64!", "pw"),
            Err(CryptoError::Base64(_))
        ));
    }
}
