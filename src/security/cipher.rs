//! Field-level encryption for values persisted at rest.
//!
//! Tokens have the form `hex(iv):hex(ciphertext)`. The IV is 16 random bytes
//! drawn per call, so encrypting the same plaintext twice never yields the
//! same token. AES-256-GCM authenticates the ciphertext, which makes any
//! tampering surface as [`CipherError::Integrity`].

use aes_gcm::AesGcm;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

use crate::constants::crypto::{FIELD_IV_LEN, FIELD_KEY_LEN, FIELD_SEPARATOR};

type Aes256Gcm16 = AesGcm<Aes256, U16>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption key must be {FIELD_KEY_LEN} bytes")]
    InvalidKey,

    #[error("malformed encrypted value: {0}")]
    Malformed(&'static str),

    #[error("encrypted value failed integrity check")]
    Integrity,

    #[error("encryption failed")]
    Encrypt,
}

#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm16,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != FIELD_KEY_LEN {
            return Err(CipherError::InvalidKey);
        }
        let cipher = Aes256Gcm16::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn from_hex(key_hex: &str) -> Result<Self, CipherError> {
        let key = hex::decode(key_hex.trim()).map_err(|_| CipherError::InvalidKey)?;
        Self::new(&key)
    }

    /// Fresh random key, hex encoded.
    #[must_use]
    pub fn generate_key_hex() -> String {
        let mut key = [0u8; FIELD_KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut iv = [0u8; FIELD_IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext = self
            .cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(format!(
            "{}{FIELD_SEPARATOR}{}",
            hex::encode(iv),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        let (iv_hex, ciphertext_hex) = token
            .split_once(FIELD_SEPARATOR)
            .ok_or(CipherError::Malformed("missing separator"))?;

        if iv_hex.len() != FIELD_IV_LEN * 2 {
            return Err(CipherError::Malformed("wrong iv length"));
        }

        let iv = hex::decode(iv_hex).map_err(|_| CipherError::Malformed("iv is not hex"))?;
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|_| CipherError::Malformed("ciphertext is not hex"))?;

        let plaintext = self
            .cipher
            .decrypt(GenericArray::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| CipherError::Integrity)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Integrity)
    }

    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>, CipherError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    pub fn decrypt_opt(&self, token: Option<&str>) -> Result<Option<String>, CipherError> {
        token.map(|t| self.decrypt(t)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::from_hex(&"7f".repeat(32)).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        for value in ["", "Acme", "jane.doe@example.com", "Zoë Ünïcødé 名前", " padded "] {
            let token = cipher.encrypt(value).unwrap();
            assert_eq!(cipher.decrypt(&token).unwrap(), value);
        }
    }

    #[test]
    fn test_same_plaintext_gives_different_tokens() {
        let cipher = cipher();
        let first = cipher.encrypt("Acme").unwrap();
        let second = cipher.encrypt("Acme").unwrap();

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).unwrap(), "Acme");
        assert_eq!(cipher.decrypt(&second).unwrap(), "Acme");
    }

    #[test]
    fn test_token_format() {
        let token = cipher().encrypt("Acme").unwrap();
        let (iv, ciphertext) = token.split_once(':').unwrap();

        assert_eq!(iv.len(), 32);
        assert!(iv.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!ciphertext.is_empty());
        assert!(ciphertext.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let cipher = cipher();
        let token = cipher.encrypt("Acme Corporation").unwrap();
        let split = token.find(':').unwrap() + 1;

        for index in split..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] = if bytes[index] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                cipher.decrypt(&tampered),
                Err(CipherError::Integrity),
                "flip at {index} went undetected"
            );
        }
    }

    #[test]
    fn test_tampered_iv_is_rejected() {
        let cipher = cipher();
        let token = cipher.encrypt("Acme").unwrap();
        let mut bytes = token.into_bytes();
        bytes[0] = if bytes[0] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_malformed_tokens() {
        let cipher = cipher();
        assert_eq!(
            cipher.decrypt("deadbeef"),
            Err(CipherError::Malformed("missing separator"))
        );
        assert_eq!(
            cipher.decrypt("abcd:00ff"),
            Err(CipherError::Malformed("wrong iv length"))
        );
        assert_eq!(
            cipher.decrypt(&format!("{}:00ff", "zz".repeat(16))),
            Err(CipherError::Malformed("iv is not hex"))
        );
        assert_eq!(
            cipher.decrypt(&format!("{}:not-hex", "00".repeat(16))),
            Err(CipherError::Malformed("ciphertext is not hex"))
        );
        assert_eq!(
            cipher.decrypt(&format!("{}:", "00".repeat(16))),
            Err(CipherError::Integrity)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = cipher().encrypt("Acme").unwrap();
        let other = FieldCipher::from_hex(&"01".repeat(32)).unwrap();
        assert_eq!(other.decrypt(&token), Err(CipherError::Integrity));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(FieldCipher::from_hex("abcd").is_err());
        assert!(FieldCipher::new(&[0u8; 16]).is_err());
        assert!(FieldCipher::from_hex(&FieldCipher::generate_key_hex()).is_ok());
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let debug = format!("{:?}", cipher());
        assert!(!debug.contains("7f7f"));
    }

    #[test]
    fn test_optional_helpers() {
        let cipher = cipher();
        assert_eq!(cipher.encrypt_opt(None).unwrap(), None);
        let token = cipher.encrypt_opt(Some("x")).unwrap();
        assert_eq!(cipher.decrypt_opt(token.as_deref()).unwrap().as_deref(), Some("x"));
    }
}
