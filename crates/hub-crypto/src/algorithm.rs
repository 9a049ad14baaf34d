//! Algorithm identifiers.
//!
//! Each algorithm knows the URI it is advertised under in XML-DSig and
//! XML Encryption documents, so the SAML layer never hard-codes them.

use serde::{Deserialize, Serialize};

/// Digest algorithms used for XML signature references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-384 (CNSA 2.0 minimum).
    #[default]
    #[serde(rename = "SHA384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the XML-DSig digest method URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest method URI.
    #[must_use]
    pub fn from_xml_dsig_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Some(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Signature algorithms supported for SAML messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// ECDSA using P-384 curve and SHA-384 hash.
    #[default]
    #[serde(rename = "ES384")]
    Es384,
}

impl SignatureAlgorithm {
    /// Returns the JWA algorithm name.
    #[must_use]
    pub const fn jwa_name(self) -> &'static str {
        match self {
            Self::Es384 => "ES384",
        }
    }

    /// Returns the XML-DSig signature method URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Es384 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384",
        }
    }

    /// Parses a signature method URI.
    #[must_use]
    pub fn from_xml_dsig_uri(uri: &str) -> Option<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384" => Some(Self::Es384),
            _ => None,
        }
    }

    /// Returns the hash algorithm paired with this signature algorithm.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::Es384 => HashAlgorithm::Sha384,
        }
    }
}

/// XML Encryption block cipher for assertion content.
pub const CONTENT_ENCRYPTION_URI: &str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";

/// XML Encryption key transport for the content key.
pub const KEY_TRANSPORT_URI: &str = "http://www.w3.org/2009/xmlenc11#rsa-oaep";
