//! Single assertion validation.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{
    validate_attribute_language, validate_fraud_event, validate_ip_address, validate_issuer,
    validate_matching_dataset_statement, validate_subject, RequestContext,
};
use crate::error::{SamlError, SamlResult};
use crate::replay::{ReplayGuard, ReplayNamespace};
use crate::types::{Assertion, SAML_VERSION};

/// Validates decrypted assertions.
///
/// Stateless apart from the shared [`ReplayGuard`]; clone freely.
#[derive(Debug, Clone)]
pub struct AssertionValidator {
    replay_guard: Arc<ReplayGuard>,
}

impl AssertionValidator {
    /// Creates a validator recording accepted ids in `replay_guard`.
    #[must_use]
    pub fn new(replay_guard: Arc<ReplayGuard>) -> Self {
        Self { replay_guard }
    }

    /// The replay guard this validator records into.
    #[must_use]
    pub fn replay_guard(&self) -> &Arc<ReplayGuard> {
        &self.replay_guard
    }

    /// Runs every check that applies to any assertion, short of replay
    /// recording: structure, signature presence, issuer, person name
    /// language, subject and fraud event.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate(
        &self,
        assertion: &Assertion,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        self.validate_structure(assertion)?;
        self.validate_signature(assertion)?;
        validate_issuer(&assertion.id, assertion.issuer.as_ref())?;
        validate_attribute_language(assertion)?;
        self.validate_subject(assertion, context, now)?;
        self.validate_fraud_event(assertion)
    }

    /// ID, then version, then issue instant.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingId`], [`SamlError::MissingVersion`],
    /// [`SamlError::IllegalVersion`] or [`SamlError::MissingIssueInstant`].
    pub fn validate_structure(&self, assertion: &Assertion) -> SamlResult<()> {
        let id = assertion.id.as_str();
        if id.is_empty() {
            return Err(SamlError::MissingId { element: "Assertion" });
        }
        if assertion.version.is_empty() {
            return Err(SamlError::MissingVersion { id: id.to_string() });
        }
        if assertion.version != SAML_VERSION {
            return Err(SamlError::IllegalVersion {
                id: id.to_string(),
                version: assertion.version.clone(),
            });
        }
        if assertion.issue_instant.is_none() {
            return Err(SamlError::MissingIssueInstant { id: id.to_string() });
        }
        Ok(())
    }

    /// A signature must be present and carry a value. Cryptographic
    /// verification is the signature verifier's job.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::AssertionSignatureMissing`] or
    /// [`SamlError::AssertionNotSigned`].
    pub fn validate_signature(&self, assertion: &Assertion) -> SamlResult<()> {
        match &assertion.signature {
            None => Err(SamlError::AssertionSignatureMissing {
                id: assertion.id.clone(),
            }),
            Some(signature) if !signature.is_signed() => Err(SamlError::AssertionNotSigned {
                id: assertion.id.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// See [`validate_subject`].
    ///
    /// # Errors
    ///
    /// Returns the first failing subject check.
    pub fn validate_subject(
        &self,
        assertion: &Assertion,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        validate_subject(assertion, context, now)
    }

    /// See [`validate_matching_dataset_statement`].
    ///
    /// # Errors
    ///
    /// Returns the first failing attribute check.
    pub fn validate_attribute_statement(&self, assertion: &Assertion) -> SamlResult<()> {
        validate_matching_dataset_statement(assertion)
    }

    /// See [`validate_fraud_event`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidFraudAttribute`].
    pub fn validate_fraud_event(&self, assertion: &Assertion) -> SamlResult<()> {
        validate_fraud_event(assertion)
    }

    /// See [`validate_ip_address`].
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingIpAddress`] or [`SamlError::EmptyIpAddress`].
    pub fn validate_ip_address(&self, assertion: &Assertion) -> SamlResult<()> {
        validate_ip_address(assertion)
    }

    /// Records the assertion id in `namespace` until its bearer
    /// `NotOnOrAfter`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DuplicateAssertion`] for a live id, or
    /// [`SamlError::MissingNotOnOrAfter`] if there is no expiry to record.
    pub fn validate_for_duplicates(
        &self,
        assertion: &Assertion,
        namespace: ReplayNamespace,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let expiry = replay_expiry(assertion).ok_or_else(|| SamlError::MissingNotOnOrAfter {
            id: assertion.id.clone(),
        })?;

        self.replay_guard.check_and_record(
            &assertion.id,
            namespace,
            expiry,
            now,
            assertion.issuer_value(),
        )?;
        tracing::debug!(assertion_id = %assertion.id, %namespace, %expiry, "Recorded assertion");
        Ok(())
    }

    /// Undoes [`validate_for_duplicates`](Self::validate_for_duplicates)
    /// for an assertion whose response was refused after it was recorded.
    pub fn release_duplicate_record(&self, assertion: &Assertion, namespace: ReplayNamespace) {
        if let Some(expiry) = replay_expiry(assertion) {
            self.replay_guard.release(&assertion.id, namespace, expiry);
        }
    }
}

/// The first bearer `NotOnOrAfter`, which bounds the replay record.
fn replay_expiry(assertion: &Assertion) -> Option<DateTime<Utc>> {
    assertion
        .bearer_confirmations()
        .filter_map(|c| c.subject_confirmation_data.as_ref())
        .find_map(|d| d.not_on_or_after)
}
