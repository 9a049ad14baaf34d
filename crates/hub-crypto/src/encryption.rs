//! Hybrid encryption for SAML assertions.
//!
//! An assertion is sealed with a fresh AES-256-GCM content key; the content
//! key is then wrapped with RSA-OAEP for each recipient. The sealed form is
//! `nonce || ciphertext || tag`, matching the XML Encryption 1.1 GCM layout.

use std::sync::Arc;

use aws_lc_rs::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
    rsa::{
        OaepPrivateDecryptingKey, OaepPublicEncryptingKey, PrivateDecryptingKey,
        PublicEncryptingKey, OAEP_SHA256_MGF1SHA256,
    },
};
use thiserror::Error;

pub use aws_lc_rs::rsa::KeySize;

const CONTENT_KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Error type for encryption operations.
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Invalid key material.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed. Deliberately carries no detail.
    #[error("decryption failed")]
    Decryption,
}

/// AES-256-GCM content-encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; CONTENT_KEY_LEN]);

impl ContentKey {
    /// Generates a random content key.
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source fails.
    pub fn generate() -> Result<Self, EncryptionError> {
        let mut bytes = [0u8; CONTENT_KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|e| EncryptionError::KeyGeneration(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Builds a content key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly 32 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        <[u8; CONTENT_KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| EncryptionError::InvalidKey(format!("content key must be {CONTENT_KEY_LEN} bytes")))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn aead_key(&self) -> Result<LessSafeKey, EncryptionError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Seals `plaintext`, returning `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the nonce cannot be generated or sealing fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce)
            .map_err(|e| EncryptionError::Encryption(e.to_string()))?;

        let mut in_out = plaintext.to_vec();
        self.aead_key()?
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|e| EncryptionError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Opens data produced by [`ContentKey::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::Decryption`] if the data is truncated,
    /// tampered with, or sealed under another key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::Decryption);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce).map_err(|_| EncryptionError::Decryption)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .aead_key()?
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Decryption)?;
        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// RSA-OAEP public key of a message recipient.
#[derive(Clone)]
pub struct RecipientKey {
    name: String,
    key: Arc<OaepPublicEncryptingKey>,
}

impl RecipientKey {
    /// Loads a recipient key from an X.509 `SubjectPublicKeyInfo` DER document.
    ///
    /// # Errors
    ///
    /// Returns an error if the DER is not an RSA public key.
    pub fn from_der(name: impl Into<String>, der: &[u8]) -> Result<Self, EncryptionError> {
        let public = PublicEncryptingKey::from_der(der)
            .map_err(|e| EncryptionError::InvalidKey(format!("Invalid RSA public key: {e}")))?;
        Self::from_public(name.into(), public)
    }

    fn from_public(name: String, public: PublicEncryptingKey) -> Result<Self, EncryptionError> {
        let key = OaepPublicEncryptingKey::new(public)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        Ok(Self {
            name,
            key: Arc::new(key),
        })
    }

    /// Name advertised in `KeyInfo/KeyName`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wraps a content key for this recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if OAEP encryption fails.
    pub fn wrap_key(&self, content_key: &ContentKey) -> Result<Vec<u8>, EncryptionError> {
        let mut out = vec![0u8; self.key.ciphertext_size()];
        let wrapped = self
            .key
            .encrypt(&OAEP_SHA256_MGF1SHA256, content_key.as_bytes(), &mut out, None)
            .map_err(|e| EncryptionError::Encryption(e.to_string()))?;
        Ok(wrapped.to_vec())
    }
}

impl std::fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientKey").field("name", &self.name).finish_non_exhaustive()
    }
}

/// RSA-OAEP private key held by the hub to unwrap content keys.
pub struct DecryptionKey {
    key: OaepPrivateDecryptingKey,
    recipient: RecipientKey,
}

impl DecryptionKey {
    /// Generates a new RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(name: impl Into<String>, size: KeySize) -> Result<Self, EncryptionError> {
        let private = PrivateDecryptingKey::generate(size)
            .map_err(|e| EncryptionError::KeyGeneration(e.to_string()))?;
        Self::from_private(name.into(), private)
    }

    /// Loads a private key from a PKCS#8 DER document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an RSA private key.
    pub fn from_pkcs8(name: impl Into<String>, der: &[u8]) -> Result<Self, EncryptionError> {
        let private = PrivateDecryptingKey::from_pkcs8(der)
            .map_err(|e| EncryptionError::InvalidKey(format!("Invalid RSA PKCS#8 key: {e}")))?;
        Self::from_private(name.into(), private)
    }

    fn from_private(name: String, private: PrivateDecryptingKey) -> Result<Self, EncryptionError> {
        let recipient = RecipientKey::from_public(name, private.public_key())?;
        let key = OaepPrivateDecryptingKey::new(private)
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;
        Ok(Self { key, recipient })
    }

    /// Public half, to hand to peers that encrypt for us.
    #[must_use]
    pub fn recipient_key(&self) -> RecipientKey {
        self.recipient.clone()
    }

    /// Unwraps a content key wrapped for this key pair.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::Decryption`] if the wrapped key was not
    /// produced for this key pair.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<ContentKey, EncryptionError> {
        let mut out = vec![0u8; self.key.min_output_size()];
        let plaintext = self
            .key
            .decrypt(&OAEP_SHA256_MGF1SHA256, wrapped, &mut out, None)
            .map_err(|_| EncryptionError::Decryption)?;
        ContentKey::from_bytes(plaintext)
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("name", &self.recipient.name)
            .finish_non_exhaustive()
    }
}
