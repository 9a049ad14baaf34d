//! Digital signature errors and the provider seam.

use thiserror::Error;

use crate::algorithm::SignatureAlgorithm;

/// Error type for signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),
}

/// Anything that can produce and check signatures over raw bytes.
///
/// The XML signature layer is generic over this trait so a hardware-backed
/// key can replace the in-memory one without touching the SAML code.
pub trait SignatureProvider: Send + Sync {
    /// Signs the given data.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Verifies a signature, returning `false` for a well-formed but wrong signature.
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;

    /// Returns the signature algorithm.
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Returns a stable identifier for the verifying key.
    fn key_id(&self) -> &str;
}
