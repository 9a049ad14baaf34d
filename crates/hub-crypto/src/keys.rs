//! ECDSA P-384 signing and verifying keys.
//!
//! The hub signs every assertion and envelope it emits with a single
//! P-384 key. Peers are trusted through their raw public key bytes
//! (uncompressed SEC1 point), which is what the metadata layer hands us.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{
        EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P384_SHA384_ASN1,
        ECDSA_P384_SHA384_ASN1_SIGNING,
    },
};
use base64::Engine;

use crate::algorithm::SignatureAlgorithm;
use crate::signature::{SignatureError, SignatureProvider};

/// ECDSA P-384 key pair used to sign outbound SAML.
pub struct EcdsaSigningKey {
    key_pair: EcdsaKeyPair,
    key_id: String,
}

impl EcdsaSigningKey {
    /// Generates a fresh key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source fails.
    pub fn generate() -> Result<Self, SignatureError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, &rng)
            .map_err(|e| SignatureError::KeyGeneration(format!("ECDSA P-384: {e}")))?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Loads a key pair from a PKCS#8 DER document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a P-384 private key.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, pkcs8_der)
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid ECDSA PKCS#8 key: {e}")))?;
        let key_id = generate_key_id(key_pair.public_key().as_ref());

        Ok(Self { key_pair, key_id })
    }

    /// Returns the matching verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> EcdsaVerifyingKey {
        EcdsaVerifyingKey {
            public_key: self.key_pair.public_key().as_ref().to_vec(),
            key_id: self.key_id.clone(),
        }
    }
}

impl std::fmt::Debug for EcdsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaSigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SignatureProvider for EcdsaSigningKey {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let rng = SystemRandom::new();
        let signature = self
            .key_pair
            .sign(&rng, data)
            .map_err(|e| SignatureError::Signing(format!("ECDSA signing failed: {e}")))?;

        Ok(signature.as_ref().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        self.verifying_key().verify(data, signature)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Es384
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Public half of a P-384 key, used to check a peer's signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaVerifyingKey {
    public_key: Vec<u8>,
    key_id: String,
}

impl EcdsaVerifyingKey {
    /// Wraps an uncompressed SEC1 P-384 point.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be a P-384 point.
    pub fn from_bytes(public_key: &[u8]) -> Result<Self, SignatureError> {
        // 0x04 || x || y with 48-byte coordinates
        if public_key.len() != 97 || public_key[0] != 0x04 {
            return Err(SignatureError::InvalidKey(
                "expected an uncompressed P-384 point".to_string(),
            ));
        }
        Ok(Self {
            public_key: public_key.to_vec(),
            key_id: generate_key_id(public_key),
        })
    }

    /// Raw public key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.public_key
    }

    /// Key identifier derived from the public key.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Verifies an ASN.1 DER ECDSA signature over `data`.
    #[must_use]
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        UnparsedPublicKey::new(&ECDSA_P384_SHA384_ASN1, &self.public_key)
            .verify(data, signature)
            .is_ok()
    }
}

/// Generates a key ID from the public key bytes.
fn generate_key_id(public_key: &[u8]) -> String {
    let hash = crate::sha384(public_key);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&hash[..8])
}
