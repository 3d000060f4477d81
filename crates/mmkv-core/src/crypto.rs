//! Value encryption: scrypt key derivation plus XChaCha20-Poly1305.
//!
//! Only record bodies are encrypted. Keys and record framing stay in the
//! clear so key listing and CRC validation work without the cipher.

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};
use rand_core::RngCore;
use scrypt::{scrypt, Params};

use crate::error::{Error, Result};
use crate::format::SALT_LEN;

/// Maximum user key length in bytes, enforced at construction time.
pub(crate) const MAX_KEY_BYTES: usize = 16;

const DERIVED_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

// scrypt cost parameters (N = 16384).
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// AEAD cipher derived from a user key and the data file's salt.
pub(crate) struct Cipher {
    aead: XChaCha20Poly1305,
}

impl Cipher {
    pub(crate) fn derive(key: &str, salt: &[u8; SALT_LEN]) -> Result<Self> {
        let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, DERIVED_KEY_LEN)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let mut derived = [0u8; DERIVED_KEY_LEN];
        scrypt(key.as_bytes(), salt, &params, &mut derived)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(Self {
            aead: XChaCha20Poly1305::new(Key::from_slice(&derived)),
        })
    }

    /// Encrypt a record body. Returns `nonce ++ ciphertext`.
    pub(crate) fn seal(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .aead
            .encrypt(XNonce::from_slice(&nonce), body)
            .map_err(|_| Error::Crypto("encryption failed".into()))?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a `nonce ++ ciphertext` blob produced by [`Cipher::seal`].
    pub(crate) fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(Error::Crypto("value blob is too short".into()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.aead
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("decryption failed (wrong encryption key?)".into()))
    }
}

pub(crate) fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let salt = random_salt();
        let cipher = Cipher::derive("hunter2", &salt).unwrap();
        let blob = cipher.seal(b"payload").unwrap();
        assert_ne!(&blob[NONCE_LEN..], b"payload");
        assert_eq!(cipher.open(&blob).unwrap(), b"payload");
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let salt = random_salt();
        let cipher = Cipher::derive("hunter2", &salt).unwrap();
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let salt = random_salt();
        let blob = Cipher::derive("right", &salt).unwrap().seal(b"x").unwrap();
        let wrong = Cipher::derive("wrong", &salt).unwrap();
        assert!(matches!(wrong.open(&blob), Err(Error::Crypto(_))));
    }

    #[test]
    fn derivation_is_deterministic_per_salt() {
        let salt = random_salt();
        let a = Cipher::derive("k", &salt).unwrap();
        let b = Cipher::derive("k", &salt).unwrap();
        let blob = a.seal(b"v").unwrap();
        assert_eq!(b.open(&blob).unwrap(), b"v");
    }
}
