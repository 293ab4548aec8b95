//! Symmetric encryption of small payloads
//!
//! Values are sealed with AES-GCM under a 16-byte (AES-128) or 32-byte
//! (AES-256) secret and framed as `base64(nonce || ciphertext)`, so they can
//! be stored in text columns or cache entries.
//!
//! # Compatibility
//!
//! Values sealed with unauthenticated AES-CFB and framed as
//! `base64(iv || ciphertext)` with a 16-byte IV cannot be opened here: they
//! carry no GCM tag and fail with [`CryptoError::Decrypt`]. Such values have
//! to be decrypted with the CFB scheme and sealed again. 24-byte (AES-192)
//! secrets are rejected with [`CryptoError::InvalidSecret`].
//!
//! # Example
//!
//! ```rust
//! use groundwork::crypt::{decrypt, encrypt};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Card {
//!     last4: String,
//! }
//!
//! let secret = "0123456789abcdef0123456789abcdef";
//! let sealed = encrypt(&Card { last4: "4242".into() }, secret).unwrap();
//! let card: Card = decrypt(&sealed, secret).unwrap();
//! assert_eq!(card.last4, "4242");
//! ```

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Encryption or decryption failure
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The secret is not 16 or 32 bytes long
    #[error("secret must be 16 or 32 bytes, got {0}")]
    InvalidSecret(usize),

    /// The input is not valid base64 or is too short to hold a nonce
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    /// Authentication failed: wrong secret or tampered data
    #[error("decryption failed")]
    Decrypt,

    /// Encryption failed
    #[error("encryption failed")]
    Encrypt,

    /// The payload could not be encoded or decoded as JSON
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Cipher {
    fn new(secret: &str) -> Result<Self, CryptoError> {
        let key = secret.as_bytes();
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(|c| Self::Aes128(Box::new(c)))
                .map_err(|_| CryptoError::InvalidSecret(key.len())),
            32 => Aes256Gcm::new_from_slice(key)
                .map(|c| Self::Aes256(Box::new(c)))
                .map_err(|_| CryptoError::InvalidSecret(key.len())),
            n => Err(CryptoError::InvalidSecret(n)),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (nonce, ciphertext) = match self {
            Self::Aes128(c) => {
                let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
                (nonce, c.encrypt(&nonce, plaintext))
            }
            Self::Aes256(c) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                (nonce, c.encrypt(&nonce, plaintext))
            }
        };
        let ciphertext = ciphertext.map_err(|_| CryptoError::Encrypt)?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Malformed(format!(
                "expected at least {NONCE_LEN} bytes, got {}",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::Decrypt)
    }
}

/// Encrypt a string
pub fn encrypt_string(data: &str, secret: &str) -> Result<String, CryptoError> {
    let sealed = Cipher::new(secret)?.seal(data.as_bytes())?;
    Ok(general_purpose::STANDARD.encode(sealed))
}

/// Decrypt a string produced by [`encrypt_string`]
pub fn decrypt_string(data: &str, secret: &str) -> Result<String, CryptoError> {
    let cipher = Cipher::new(secret)?;
    let sealed = general_purpose::STANDARD
        .decode(data)
        .map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let plaintext = cipher.open(&sealed)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Malformed(e.to_string()))
}

/// Encrypt any serializable value as JSON
pub fn encrypt<T: Serialize + ?Sized>(value: &T, secret: &str) -> Result<String, CryptoError> {
    encrypt_string(&serde_json::to_string(value)?, secret)
}

/// Decrypt a value produced by [`encrypt`]
pub fn decrypt<T: DeserializeOwned>(data: &str, secret: &str) -> Result<T, CryptoError> {
    Ok(serde_json::from_str(&decrypt_string(data, secret)?)?)
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}
