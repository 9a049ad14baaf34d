//! SAML error types.
//!
//! Every way an inbound or outbound message can be rejected is a distinct
//! [`SamlError`] variant with a stable code, a category and a log-severity
//! hint. The surrounding service maps these onto transport errors through
//! [`SamlError::to_failure`].

use chrono::{DateTime, Utc};
use hub_crypto::{EncryptionError, SignatureError};
use serde::Serialize;
use thiserror::Error;

use crate::replay::ReplayNamespace;
use crate::types::status_codes;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed message structure.
    Structural,
    /// Signature or encryption problems.
    Cryptographic,
    /// A validity window was violated.
    Temporal,
    /// Content that is well-formed but not acceptable.
    Semantic,
    /// A previously accepted assertion was presented again.
    Replay,
}

/// Log-severity hint attached to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Log at error level.
    Error,
    /// Log at warn level.
    Warn,
    /// Log at info level.
    Info,
}

/// Outward representation of a rejected message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    /// Stable snake_case code.
    pub code: &'static str,
    /// Failure class.
    pub category: ErrorCategory,
    /// Log-severity hint.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
}

/// SAML validation and transformation errors.
#[derive(Debug, Error)]
pub enum SamlError {
    // ------------------------------------------------------------------
    // Structural
    // ------------------------------------------------------------------
    /// Element has no `ID`.
    #[error("{element} is missing an ID")]
    MissingId {
        /// Local name of the element.
        element: &'static str,
    },

    /// Element has no `Version`.
    #[error("{id} is missing a Version")]
    MissingVersion {
        /// Element ID.
        id: String,
    },

    /// Version other than 2.0.
    #[error("{id} declares illegal version {version}")]
    IllegalVersion {
        /// Element ID.
        id: String,
        /// Declared version.
        version: String,
    },

    /// Element has no `IssueInstant`.
    #[error("{id} is missing an IssueInstant")]
    MissingIssueInstant {
        /// Element ID.
        id: String,
    },

    /// Element has no `Issuer`.
    #[error("{id} is missing an Issuer")]
    MissingIssuer {
        /// Element ID.
        id: String,
    },

    /// `Issuer` is present but empty.
    #[error("{id} has an empty Issuer")]
    EmptyIssuer {
        /// Element ID.
        id: String,
    },

    /// `Issuer` carries a format other than entity.
    #[error("{id} has an Issuer with illegal format {format}")]
    IllegalIssuerFormat {
        /// Element ID.
        id: String,
        /// Declared format.
        format: String,
    },

    /// Response has no `InResponseTo`.
    #[error("response {id} is missing InResponseTo")]
    MissingInResponseTo {
        /// Response ID.
        id: String,
    },

    /// Response has an empty `InResponseTo`.
    #[error("response {id} has an empty InResponseTo")]
    EmptyInResponseTo {
        /// Response ID.
        id: String,
    },

    /// Response has no `Destination` but one is expected.
    #[error("response {id} is missing a Destination")]
    MissingDestination {
        /// Response ID.
        id: String,
    },

    /// XML could not be parsed.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Missing required element.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Response carries no `Status`.
    #[error("response {id} is missing a Status")]
    MissingStatus {
        /// Response ID.
        id: String,
    },

    // ------------------------------------------------------------------
    // Cryptographic
    // ------------------------------------------------------------------
    /// Response carries no signature.
    #[error("response {id} is not signed")]
    MissingSignature {
        /// Response ID.
        id: String,
    },

    /// Response signature element has no value.
    #[error("response {id} has a signature element without a value")]
    SignatureNotSigned {
        /// Response ID.
        id: String,
    },

    /// Assertion carries no signature.
    #[error("assertion {id} is missing a signature")]
    AssertionSignatureMissing {
        /// Assertion ID.
        id: String,
    },

    /// Assertion signature element has no value.
    #[error("assertion {id} is not signed")]
    AssertionNotSigned {
        /// Assertion ID.
        id: String,
    },

    /// Signature did not verify.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// An encrypted assertion could not be decrypted.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// An assertion could not be encrypted.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// A signature could not be produced.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    // ------------------------------------------------------------------
    // Temporal
    // ------------------------------------------------------------------
    /// Bearer confirmation has expired.
    #[error("subject confirmation expired at {not_on_or_after}")]
    ExceededNotOnOrAfter {
        /// Expiry instant.
        not_on_or_after: DateTime<Utc>,
    },

    /// Bearer confirmation is not valid yet.
    #[error("subject confirmation is not valid before {not_before}")]
    NotYetValid {
        /// Start of validity.
        not_before: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // Semantic
    // ------------------------------------------------------------------
    /// Destination does not match the configured endpoint.
    #[error("invalid destination: expected {expected}, got {actual}")]
    InvalidDestination {
        /// The expected destination URL.
        expected: String,
        /// The actual destination URL.
        actual: String,
    },

    /// Assertion has no `Subject`.
    #[error("assertion {id} is missing a Subject")]
    MissingSubject {
        /// Assertion ID.
        id: String,
    },

    /// Bearer confirmation has no data.
    #[error("assertion {id} has a subject confirmation without data")]
    MissingSubjectConfirmationData {
        /// Assertion ID.
        id: String,
    },

    /// No bearer subject confirmation.
    #[error("assertion {id} has no bearer subject confirmation")]
    NoBearerSubjectConfirmation {
        /// Assertion ID.
        id: String,
    },

    /// Bearer confirmation lacks `InResponseTo`.
    #[error("assertion {id} bearer confirmation is missing InResponseTo")]
    MissingBearerInResponseTo {
        /// Assertion ID.
        id: String,
    },

    /// Bearer `InResponseTo` names another request.
    #[error("InResponseTo mismatch: expected {expected}, got {actual}")]
    MismatchedInResponseTo {
        /// The original request id.
        expected: String,
        /// The value on the wire.
        actual: String,
    },

    /// Bearer confirmation lacks `Recipient`.
    #[error("assertion {id} bearer confirmation is missing a Recipient")]
    MissingBearerRecipient {
        /// Assertion ID.
        id: String,
    },

    /// Bearer `Recipient` is not this endpoint.
    #[error("incorrect recipient: expected {expected}, got {actual}")]
    IncorrectRecipient {
        /// Expected endpoint.
        expected: String,
        /// The value on the wire.
        actual: String,
    },

    /// Bearer confirmation lacks `NotOnOrAfter`.
    #[error("assertion {id} bearer confirmation is missing NotOnOrAfter")]
    MissingNotOnOrAfter {
        /// Assertion ID.
        id: String,
    },

    /// Attribute statement holds no attributes.
    #[error("assertion {id} has an empty attribute statement")]
    AttributeStatementEmpty {
        /// Assertion ID.
        id: String,
    },

    /// Attribute name is not in the dictionary.
    #[error("attribute {name} is not recognised")]
    AttributeNotRecognised {
        /// Attribute name.
        name: String,
    },

    /// Attribute value has the wrong declared type.
    #[error("attribute {name} must be of type {expected}, got {actual}")]
    AttributeWrongType {
        /// Attribute name.
        name: String,
        /// Required type.
        expected: &'static str,
        /// Declared type.
        actual: String,
    },

    /// Recognised attribute with no value.
    #[error("attribute {name} has no value")]
    EmptyAttributeValue {
        /// Attribute name.
        name: String,
    },

    /// Matching dataset assertion without an attribute statement.
    #[error("matching dataset assertion {id} has no attribute statement")]
    MdsStatementMissing {
        /// Assertion ID.
        id: String,
    },

    /// Matching dataset assertion with several attribute statements.
    #[error("matching dataset assertion {id} has more than one attribute statement")]
    MdsMultipleStatements {
        /// Assertion ID.
        id: String,
    },

    /// Person name value in a language other than en-GB.
    #[error("attribute {name} has unsupported language {language}")]
    InvalidAttributeLanguage {
        /// Attribute name.
        name: String,
        /// Declared language.
        language: String,
    },

    /// Authn assertion without an IP address attribute.
    #[error("authn assertion {id} is missing the IP address attribute")]
    MissingIpAddress {
        /// Assertion ID.
        id: String,
    },

    /// IP address attribute without a value.
    #[error("authn assertion {id} has an empty IP address attribute")]
    EmptyIpAddress {
        /// Assertion ID.
        id: String,
    },

    /// Fraud event attributes are malformed.
    #[error("invalid fraud attribute: {0}")]
    InvalidFraudAttribute(String),

    /// Status code nests deeper than two levels.
    #[error("status code is nested too deeply")]
    NestedStatusTooDeep,

    /// No table entry matches the wire status.
    #[error("unrecognized status: {0}")]
    UnrecognizedStatus(String),

    /// Matching service status without a sub-code.
    #[error("status {0} requires a sub-status")]
    MissingSubStatus(String),

    /// Matching service sub-code outside the allowed set.
    #[error("sub-status {actual} must be one of {allowed}")]
    SubStatusMustBeOneOf {
        /// Received sub-code.
        actual: String,
        /// Allowed sub-codes.
        allowed: String,
    },

    /// Response carries a plaintext assertion.
    #[error("response {id} contains an unencrypted assertion")]
    UnencryptedAssertion {
        /// Response ID.
        id: String,
    },

    /// Success response without assertions.
    #[error("successful response {id} carries no assertions")]
    MissingSuccessAssertions {
        /// Response ID.
        id: String,
    },

    /// Non-success response with assertions.
    #[error("non-success response {id} must not carry assertions")]
    NonSuccessHasAssertions {
        /// Response ID.
        id: String,
    },

    /// Success response with the wrong number of assertions.
    #[error("expected {expected} assertions, got {actual}")]
    UnexpectedNumberOfAssertions {
        /// Expected count.
        expected: usize,
        /// Actual count.
        actual: usize,
    },

    /// No (or more than one) authn statement assertion.
    #[error("expected exactly one authn statement assertion, got {0}")]
    MissingAuthnAssertion(usize),

    /// No (or more than one) matching dataset assertion.
    #[error("expected exactly one matching dataset assertion, got {0}")]
    MissingMatchingDatasetAssertion(usize),

    /// Authn assertion with several authn statements.
    #[error("authn assertion {id} has more than one AuthnStatement")]
    MultipleAuthnStatements {
        /// Assertion ID.
        id: String,
    },

    /// Authn and matching dataset assertions name different subjects.
    #[error("persistent identifiers differ: {authn} and {matching_dataset}")]
    MismatchedPersistentIdentifiers {
        /// Authn assertion subject.
        authn: String,
        /// Matching dataset assertion subject.
        matching_dataset: String,
    },

    /// Authn and matching dataset assertions come from different issuers.
    #[error("issuers differ: {authn} and {matching_dataset}")]
    MismatchedIssuers {
        /// Authn assertion issuer.
        authn: String,
        /// Matching dataset assertion issuer.
        matching_dataset: String,
    },

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------
    /// Assertion id seen before within its validity window.
    #[error("{namespace} assertion {id} has already been received{}", .issuer.as_ref().map(|i| format!(" from {i}")).unwrap_or_default())]
    DuplicateAssertion {
        /// Assertion ID.
        id: String,
        /// Replay namespace.
        namespace: ReplayNamespace,
        /// Issuer, for the matching dataset namespace.
        issuer: Option<String>,
    },
}

impl SamlError {
    /// Stable snake_case code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingId { .. } => "missing_id",
            Self::MissingVersion { .. } => "missing_version",
            Self::IllegalVersion { .. } => "illegal_version",
            Self::MissingIssueInstant { .. } => "missing_issue_instant",
            Self::MissingIssuer { .. } => "missing_issuer",
            Self::EmptyIssuer { .. } => "empty_issuer",
            Self::IllegalIssuerFormat { .. } => "illegal_issuer_format",
            Self::MissingInResponseTo { .. } => "missing_in_response_to",
            Self::EmptyInResponseTo { .. } => "empty_in_response_to",
            Self::MissingDestination { .. } => "missing_destination",
            Self::XmlParse(_) => "malformed_xml",
            Self::Base64Decode(_) => "base64_decode",
            Self::MissingElement(_) => "missing_element",
            Self::MissingStatus { .. } => "missing_status",
            Self::MissingSignature { .. } => "missing_signature",
            Self::SignatureNotSigned { .. } => "signature_not_signed",
            Self::AssertionSignatureMissing { .. } => "assertion_signature_missing",
            Self::AssertionNotSigned { .. } => "assertion_not_signed",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::DecryptionFailed(_) => "decryption_failed",
            Self::EncryptionFailed(_) => "encryption_failed",
            Self::SignatureCreation(_) => "signing_failed",
            Self::ExceededNotOnOrAfter { .. } => "exceeded_not_on_or_after",
            Self::NotYetValid { .. } => "not_yet_valid",
            Self::InvalidDestination { .. } => "invalid_destination",
            Self::MissingSubject { .. } => "missing_subject",
            Self::MissingSubjectConfirmationData { .. } => "missing_subject_confirmation_data",
            Self::NoBearerSubjectConfirmation { .. } => "no_bearer_subject_confirmation",
            Self::MissingBearerInResponseTo { .. } => "missing_bearer_in_response_to",
            Self::MismatchedInResponseTo { .. } => "mismatched_in_response_to",
            Self::MissingBearerRecipient { .. } => "missing_bearer_recipient",
            Self::IncorrectRecipient { .. } => "incorrect_recipient",
            Self::MissingNotOnOrAfter { .. } => "missing_not_on_or_after",
            Self::AttributeStatementEmpty { .. } => "attribute_statement_empty",
            Self::AttributeNotRecognised { .. } => "attribute_not_recognised",
            Self::AttributeWrongType { .. } => "attribute_wrong_type",
            Self::EmptyAttributeValue { .. } => "empty_attribute_value",
            Self::MdsStatementMissing { .. } => "mds_statement_missing",
            Self::MdsMultipleStatements { .. } => "mds_multiple_statements",
            Self::InvalidAttributeLanguage { .. } => "invalid_attribute_language",
            Self::MissingIpAddress { .. } => "missing_ip_address",
            Self::EmptyIpAddress { .. } => "empty_ip_address",
            Self::InvalidFraudAttribute(_) => "invalid_fraud_attribute",
            Self::NestedStatusTooDeep => "nested_status_too_deep",
            Self::UnrecognizedStatus(_) => "unrecognized_status",
            Self::MissingSubStatus(_) => "missing_sub_status",
            Self::SubStatusMustBeOneOf { .. } => "sub_status_must_be_one_of",
            Self::UnencryptedAssertion { .. } => "unencrypted_assertion",
            Self::MissingSuccessAssertions { .. } => "missing_success_assertions",
            Self::NonSuccessHasAssertions { .. } => "non_success_has_assertions",
            Self::UnexpectedNumberOfAssertions { .. } => "unexpected_number_of_assertions",
            Self::MissingAuthnAssertion(_) => "missing_authn_assertion",
            Self::MissingMatchingDatasetAssertion(_) => "missing_matching_dataset_assertion",
            Self::MultipleAuthnStatements { .. } => "multiple_authn_statements",
            Self::MismatchedPersistentIdentifiers { .. } => "mismatched_persistent_identifiers",
            Self::MismatchedIssuers { .. } => "mismatched_issuers",
            Self::DuplicateAssertion { .. } => "duplicate_assertion",
        }
    }

    /// Failure class.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingId { .. }
            | Self::MissingVersion { .. }
            | Self::IllegalVersion { .. }
            | Self::MissingIssueInstant { .. }
            | Self::MissingIssuer { .. }
            | Self::EmptyIssuer { .. }
            | Self::IllegalIssuerFormat { .. }
            | Self::MissingInResponseTo { .. }
            | Self::EmptyInResponseTo { .. }
            | Self::MissingDestination { .. }
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::MissingElement(_)
            | Self::MissingStatus { .. } => ErrorCategory::Structural,
            Self::MissingSignature { .. }
            | Self::SignatureNotSigned { .. }
            | Self::AssertionSignatureMissing { .. }
            | Self::AssertionNotSigned { .. }
            | Self::SignatureInvalid(_)
            | Self::DecryptionFailed(_)
            | Self::EncryptionFailed(_)
            | Self::SignatureCreation(_) => ErrorCategory::Cryptographic,
            Self::ExceededNotOnOrAfter { .. } | Self::NotYetValid { .. } => {
                ErrorCategory::Temporal
            }
            Self::DuplicateAssertion { .. } => ErrorCategory::Replay,
            _ => ErrorCategory::Semantic,
        }
    }

    /// Log-severity hint.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self.category() {
            ErrorCategory::Replay | ErrorCategory::Cryptographic => Severity::Error,
            ErrorCategory::Temporal => Severity::Info,
            ErrorCategory::Structural | ErrorCategory::Semantic => match self {
                Self::UnencryptedAssertion { .. }
                | Self::MismatchedPersistentIdentifiers { .. }
                | Self::MismatchedIssuers { .. } => Severity::Error,
                _ => Severity::Warn,
            },
        }
    }

    /// Top-level SAML status the caller should answer with.
    #[must_use]
    pub const fn saml_status_code(&self) -> &'static str {
        match self {
            Self::EncryptionFailed(_) | Self::SignatureCreation(_) => status_codes::RESPONDER,
            _ => status_codes::REQUESTER,
        }
    }

    /// Converts the error into its outward representation.
    #[must_use]
    pub fn to_failure(&self) -> ValidationFailure {
        ValidationFailure {
            code: self.code(),
            category: self.category(),
            severity: self.severity(),
            message: self.to_string(),
        }
    }

    /// Emits the error at its severity.
    pub fn log(&self) {
        match self.severity() {
            Severity::Error => {
                tracing::error!(code = self.code(), category = ?self.category(), "{self}");
            }
            Severity::Warn => {
                tracing::warn!(code = self.code(), category = ?self.category(), "{self}");
            }
            Severity::Info => {
                tracing::info!(code = self.code(), category = ?self.category(), "{self}");
            }
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<SignatureError> for SamlError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Verification => Self::SignatureInvalid(err.to_string()),
            other => Self::SignatureCreation(other.to_string()),
        }
    }
}

impl From<EncryptionError> for SamlError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::Decryption => Self::DecryptionFailed(err.to_string()),
            other => Self::EncryptionFailed(other.to_string()),
        }
    }
}
