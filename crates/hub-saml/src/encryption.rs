//! Assertion encryption and decryption.
//!
//! An assertion is sealed under a fresh AES-256-GCM content key, and the
//! content key is wrapped with RSA-OAEP for the recipient. Both travel in
//! one `EncryptedAssertion`:
//!
//! ```text
//! EncryptedAssertion
//!   EncryptedData (aes256-gcm)
//!     KeyInfo/EncryptedKey (rsa-oaep, Recipient=<key name>)
//!     CipherData/CipherValue = base64(nonce || ciphertext || tag)
//! ```

use std::sync::Arc;

use base64::Engine;
use hub_crypto::algorithm::{CONTENT_ENCRYPTION_URI, KEY_TRANSPORT_URI};
use hub_crypto::{ContentKey, DecryptionKey, RecipientKey};

use crate::codec;
use crate::error::{SamlError, SamlResult};
use crate::types::{CipherData, EncryptedAssertion, EncryptedData, EncryptedKey, KeyInfo};
use crate::xml::{self, XmlNode};

/// Encrypts a signed assertion for one recipient.
pub trait AssertionEncrypter: Send + Sync {
    /// Returns the `EncryptedAssertion` element for `assertion`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::EncryptionFailed`] if key generation or
    /// wrapping fails.
    fn encrypt(&self, assertion: &XmlNode, recipient: &RecipientKey) -> SamlResult<XmlNode>;
}

/// Decrypts assertions addressed to the hub.
pub trait AssertionDecrypter: Send + Sync {
    /// Returns the `Assertion` element inside `encrypted`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptionFailed`] if the key cannot be
    /// unwrapped or the content does not authenticate.
    fn decrypt(&self, encrypted: &XmlNode) -> SamlResult<XmlNode>;

    /// Unwraps the content key of `encrypted` without opening the content.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptionFailed`] if the key was not wrapped
    /// for the hub.
    fn unwrap_key(&self, encrypted: &XmlNode) -> SamlResult<ContentKey>;
}

/// AES-256-GCM with an RSA-OAEP wrapped key.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridAssertionEncrypter;

impl AssertionEncrypter for HybridAssertionEncrypter {
    fn encrypt(&self, assertion: &XmlNode, recipient: &RecipientKey) -> SamlResult<XmlNode> {
        let content_key = ContentKey::generate()?;
        let sealed = content_key.seal(assertion.to_xml().as_bytes())?;
        let wrapped = recipient.wrap_key(&content_key)?;

        tracing::debug!(
            assertion_id = assertion.attr("ID").unwrap_or_default(),
            recipient = recipient.name(),
            "Encrypted assertion"
        );
        Ok(codec::encrypted_assertion_to_node(&encrypted_assertion(
            &sealed,
            &wrapped,
            recipient.name(),
        )))
    }
}

fn encrypted_assertion(sealed: &[u8], wrapped_key: &[u8], recipient: &str) -> EncryptedAssertion {
    let engine = base64::engine::general_purpose::STANDARD;
    EncryptedAssertion {
        encrypted_data: EncryptedData {
            encryption_method: Some(CONTENT_ENCRYPTION_URI.to_string()),
            key_info: Some(KeyInfo {
                encrypted_key: Some(EncryptedKey {
                    encryption_method: Some(KEY_TRANSPORT_URI.to_string()),
                    recipient: Some(recipient.to_string()),
                    cipher_data: CipherData {
                        cipher_value: engine.encode(wrapped_key),
                    },
                }),
            }),
            cipher_data: CipherData {
                cipher_value: engine.encode(sealed),
            },
        },
    }
}

/// Decrypts with the hub's RSA key pair.
#[derive(Debug, Clone)]
pub struct HybridAssertionDecrypter {
    key: Arc<DecryptionKey>,
}

impl HybridAssertionDecrypter {
    /// Creates a decrypter for `key`.
    #[must_use]
    pub fn new(key: Arc<DecryptionKey>) -> Self {
        Self { key }
    }
}

impl AssertionDecrypter for HybridAssertionDecrypter {
    fn decrypt(&self, encrypted: &XmlNode) -> SamlResult<XmlNode> {
        let parsed = codec::encrypted_assertion_from_node(encrypted)?;
        if parsed.encrypted_data.encryption_method.as_deref() != Some(CONTENT_ENCRYPTION_URI) {
            return Err(SamlError::DecryptionFailed(format!(
                "unsupported content encryption {:?}",
                parsed.encrypted_data.encryption_method
            )));
        }

        let content_key = self.unwrap_parsed(&parsed)?;
        let sealed = decode(&parsed.encrypted_data.cipher_data.cipher_value)?;
        let plaintext = content_key.open(&sealed)?;

        let document = String::from_utf8(plaintext)
            .map_err(|_| SamlError::DecryptionFailed("content is not UTF-8".to_string()))?;
        let assertion = xml::parse(&document)?;
        if assertion.local_name() != "Assertion" {
            return Err(SamlError::DecryptionFailed(format!(
                "encrypted content is {}, not an assertion",
                assertion.name
            )));
        }
        Ok(assertion)
    }

    fn unwrap_key(&self, encrypted: &XmlNode) -> SamlResult<ContentKey> {
        self.unwrap_parsed(&codec::encrypted_assertion_from_node(encrypted)?)
    }
}

impl HybridAssertionDecrypter {
    fn unwrap_parsed(&self, encrypted: &EncryptedAssertion) -> SamlResult<ContentKey> {
        let key = encrypted
            .encrypted_key()
            .ok_or_else(|| SamlError::DecryptionFailed("no EncryptedKey".to_string()))?;
        if key.encryption_method.as_deref() != Some(KEY_TRANSPORT_URI) {
            return Err(SamlError::DecryptionFailed(format!(
                "unsupported key transport {:?}",
                key.encryption_method
            )));
        }
        Ok(self.key.unwrap_key(&decode(&key.cipher_data.cipher_value)?)?)
    }
}

fn decode(value: &str) -> SamlResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| SamlError::DecryptionFailed(format!("invalid cipher value: {e}")))
}

/// Re-encrypts accepted assertions for the next hop.
///
/// The domain object handed onwards carries opaque blobs rather than
/// plaintext assertions.
pub trait AssertionBlobEncrypter: Send + Sync {
    /// Encrypts `assertion` and returns the blob.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::EncryptionFailed`] if encryption fails.
    fn encrypt_blob(&self, assertion: &XmlNode) -> SamlResult<String>;
}

/// Blob encrypter producing base64 of an `EncryptedAssertion` for a fixed
/// recipient.
#[derive(Debug, Clone)]
pub struct RecipientBlobEncrypter {
    recipient: RecipientKey,
}

impl RecipientBlobEncrypter {
    /// Creates a blob encrypter for `recipient`.
    #[must_use]
    pub fn new(recipient: RecipientKey) -> Self {
        Self { recipient }
    }
}

impl AssertionBlobEncrypter for RecipientBlobEncrypter {
    fn encrypt_blob(&self, assertion: &XmlNode) -> SamlResult<String> {
        let encrypted = HybridAssertionEncrypter.encrypt(assertion, &self.recipient)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(encrypted.to_xml()))
    }
}
