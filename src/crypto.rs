//! Credential encryption using AES-256-GCM
//!
//! Email profile secrets are stored as `version || nonce || ciphertext+tag`.
//! Plaintext only lives in [`Credentials`], which zeroizes itself on drop.

#![allow(deprecated)]

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::RepositoryError;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Associated data bound into every credential ciphertext.
pub const CREDENTIAL_AAD: &[u8] = b"tms:credentials:v1";

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

impl From<CryptoError> for RepositoryError {
    fn from(err: CryptoError) -> Self {
        RepositoryError::internal(format!("credential encryption: {err}"))
    }
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(CryptoKey(bytes))
    }

    /// Decodes a standard base64 key.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

/// Encrypts and decrypts opaque secrets.
pub trait EncryptionService: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    fn encrypt_str(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(plaintext.as_bytes())
    }

    fn decrypt_string(&self, ciphertext: &[u8]) -> Result<String, CryptoError> {
        let bytes = self.decrypt(ciphertext)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {e}")))
    }
}

/// AES-256-GCM with a random nonce per message.
#[derive(Debug, Clone)]
pub struct AesGcmEncryption {
    key: CryptoKey,
    aad: Vec<u8>,
}

impl AesGcmEncryption {
    pub fn new(key: CryptoKey) -> Self {
        Self {
            key,
            aad: CREDENTIAL_AAD.to_vec(),
        }
    }

    /// Binds ciphertexts to a different associated-data label.
    pub fn with_aad(mut self, aad: impl Into<Vec<u8>>) -> Self {
        self.aad = aad.into();
        self
    }
}

impl EncryptionService for AesGcmEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt_bytes(&self.key, &self.aad, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        decrypt_bytes(&self.key, &self.aad, ciphertext).map(Zeroizing::new)
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);
    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }
    if !is_encrypted_payload(ciphertext) {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let sealed = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(nonce, Payload { msg: sealed, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Plaintext email credentials. Cleared from memory on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub oauth2_client_secret: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.api_key.is_none() && self.oauth2_client_secret.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("password", &mark(&self.password))
            .field("api_key", &mark(&self.api_key))
            .field("oauth2_client_secret", &mark(&self.oauth2_client_secret))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![7u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let service = AesGcmEncryption::new(test_key());
        let encrypted = service.encrypt_str("hunter2").expect("encryption succeeds");

        assert!(is_encrypted_payload(&encrypted));
        assert_ne!(&encrypted[VERSION_FIELD_LEN + NONCE_LEN..], b"hunter2");
        assert_eq!(service.decrypt_string(&encrypted).unwrap(), "hunter2");
    }

    #[test]
    fn test_different_aad_fails() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad-1", b"secret").expect("encryption succeeds");
        assert!(decrypt_bytes(&key, b"aad-2", &encrypted).is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let service = AesGcmEncryption::new(test_key());
        let mut encrypted = service.encrypt(b"secret message").expect("encryption succeeds");
        encrypted[13] ^= 0x01;
        assert!(matches!(
            service.decrypt(&encrypted),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let service = AesGcmEncryption::new(test_key());
        let first = service.encrypt(b"same").unwrap();
        let second = service.encrypt(b"same").unwrap();
        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn test_unversioned_payload_rejected() {
        let service = AesGcmEncryption::new(test_key());
        assert!(matches!(
            service.decrypt(b"plain-password-from-somewhere"),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            service.decrypt(&[]),
            Err(CryptoError::EmptyCiphertext)
        ));
        assert!(matches!(
            service.decrypt(&[VERSION_ENCRYPTED, 0x02]),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
        assert!(CryptoKey::from_base64("not base64!").is_err());

        let encoded = STANDARD.encode([1u8; 32]);
        assert!(CryptoKey::from_base64(&encoded).is_ok());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let mut creds = Credentials::default();
        creds.password = Some("hunter2".into());
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
