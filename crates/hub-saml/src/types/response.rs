//! SAML Response types.
//!
//! Response messages exchanged between the hub and its peers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, Issuer, Status, SAML_VERSION};
use crate::signature::XmlSignature;

/// SAML Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response. Empty when absent on the wire.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this response was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// The entity that issued this response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Issuer>,

    /// The ID of the request this response is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The enveloped signature, if one is present.
    #[serde(skip)]
    pub signature: Option<XmlSignature>,

    /// The status of the response.
    pub status: Status,

    /// Plaintext assertions in this response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,

    /// Encrypted assertions in this response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted_assertions: Vec<EncryptedAssertion>,
}

impl Response {
    /// Creates a new response with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>, status: Status) -> Self {
        Self {
            id: hub_crypto::generate_saml_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(Issuer::entity(issuer)),
            in_response_to: None,
            destination: None,
            signature: None,
            status,
            assertions: Vec::new(),
            encrypted_assertions: Vec::new(),
        }
    }

    /// Creates a new success response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self::new(issuer, Status::success())
    }

    /// Sets the request ID this response is for.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = Some(instant);
        self
    }

    /// Adds an assertion to this response.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Returns true if this response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Issuer entity id, if present.
    #[must_use]
    pub fn issuer_value(&self) -> Option<&str> {
        self.issuer.as_ref().map(|i| i.value.as_str())
    }

    /// Whether a signature element with a value is present.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature.as_ref().is_some_and(XmlSignature::is_signed)
    }
}

/// Encrypted assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAssertion {
    /// The encrypted data.
    pub encrypted_data: EncryptedData,
}

impl EncryptedAssertion {
    /// The wrapped content key, if present.
    #[must_use]
    pub fn encrypted_key(&self) -> Option<&EncryptedKey> {
        self.encrypted_data
            .key_info
            .as_ref()
            .and_then(|k| k.encrypted_key.as_ref())
    }
}

/// Encrypted data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// The content encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,

    /// Key info for decryption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,

    /// The cipher data.
    pub cipher_data: CipherData,
}

/// Key information for decryption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Encrypted key data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<EncryptedKey>,
}

/// Encrypted key data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// The key transport algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,

    /// Name of the recipient key the content key was wrapped for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// The cipher data containing the wrapped key.
    pub cipher_data: CipherData,
}

/// Cipher data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherData {
    /// The cipher value (base64 encoded).
    pub cipher_value: String,
}
