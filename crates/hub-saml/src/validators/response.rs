//! Envelope validation and per-assertion routing.

use chrono::{DateTime, Utc};

use super::{validate_issuer, AssertionValidator, RequestContext};
use crate::error::{SamlError, SamlResult};
use crate::replay::ReplayNamespace;
use crate::status_codec::{DecodedStatus, MessageKind, StatusCodec};
use crate::types::{hub_status_codes, status_codes, Assertion, Response};

const MATCHING_SERVICE_RESPONDER_SUB_CODES: &[&str] = &[
    hub_status_codes::NO_MATCH,
    hub_status_codes::MULTI_MATCH,
    hub_status_codes::CREATE_FAILURE,
];

const MATCHING_SERVICE_SUCCESS_SUB_CODES: &[&str] = &[
    hub_status_codes::MATCH,
    hub_status_codes::NO_MATCH,
    hub_status_codes::CREATED,
];

/// The two assertions of a successful identity provider response.
///
/// `A` is whatever the caller routed: a bare [`Assertion`] or one paired
/// with the element it was decoded from.
#[derive(Debug, Clone, Copy)]
pub struct IdentityProviderAssertions<'a, A = Assertion> {
    /// The assertion carrying the authentication statement.
    pub authn: &'a A,
    /// The assertion carrying the matching dataset.
    pub matching_dataset: &'a A,
}

/// Validates inbound response envelopes of one message kind.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    codec: StatusCodec,
    expected_assertions: usize,
    assertion_validator: AssertionValidator,
}

impl ResponseValidator {
    /// Creates a validator for `kind` responses that carry
    /// `expected_assertions` encrypted assertions on success.
    #[must_use]
    pub fn new(
        kind: MessageKind,
        expected_assertions: usize,
        assertion_validator: AssertionValidator,
    ) -> Self {
        Self {
            codec: StatusCodec::new(kind),
            expected_assertions,
            assertion_validator,
        }
    }

    /// The message kind validated.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.codec.kind()
    }

    /// The assertion validator responses are routed to.
    #[must_use]
    pub const fn assertion_validator(&self) -> &AssertionValidator {
        &self.assertion_validator
    }

    /// Validates the envelope and decodes its status.
    ///
    /// The order is: ID, issuer, issue instant, signature presence,
    /// `InResponseTo`, destination, status, then assertion presence and
    /// count. Cryptographic verification of the signature is left to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate(&self, response: &Response, context: &RequestContext) -> SamlResult<DecodedStatus> {
        let id = response.id.as_str();
        if id.is_empty() {
            return Err(SamlError::MissingId { element: "Response" });
        }
        validate_issuer(id, response.issuer.as_ref())?;
        if response.issue_instant.is_none() {
            return Err(SamlError::MissingIssueInstant { id: id.to_string() });
        }

        // Signature
        match &response.signature {
            None => return Err(SamlError::MissingSignature { id: id.to_string() }),
            Some(signature) if !signature.is_signed() => {
                return Err(SamlError::SignatureNotSigned { id: id.to_string() });
            }
            Some(_) => {}
        }

        // InResponseTo
        match response.in_response_to.as_deref() {
            None => return Err(SamlError::MissingInResponseTo { id: id.to_string() }),
            Some(value) if value.trim().is_empty() => {
                return Err(SamlError::EmptyInResponseTo { id: id.to_string() });
            }
            Some(_) => {}
        }

        self.validate_destination(response, context)?;

        // Status
        if self.kind() == MessageKind::MatchingService {
            validate_matching_service_sub_status(response)?;
        }
        let status = self.codec.decode(&response.status)?;

        self.validate_assertion_presence(response)?;

        tracing::debug!(
            response_id = id,
            issuer = response.issuer_value().unwrap_or_default(),
            kind = %self.kind(),
            status = ?status.status,
            "Response envelope validated"
        );
        Ok(status)
    }

    fn validate_destination(&self, response: &Response, context: &RequestContext) -> SamlResult<()> {
        let Some(expected) = context.expected_destination.as_deref() else {
            return Ok(());
        };
        match response.destination.as_deref() {
            None => Err(SamlError::MissingDestination {
                id: response.id.clone(),
            }),
            Some(actual) if actual != expected => Err(SamlError::InvalidDestination {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn validate_assertion_presence(&self, response: &Response) -> SamlResult<()> {
        let id = || response.id.clone();
        if !response.assertions.is_empty() {
            return Err(SamlError::UnencryptedAssertion { id: id() });
        }

        let count = response.encrypted_assertions.len();
        match (response.is_success(), count) {
            (true, 0) => Err(SamlError::MissingSuccessAssertions { id: id() }),
            (false, n) if n > 0 => Err(SamlError::NonSuccessHasAssertions { id: id() }),
            (true, n) if n != self.expected_assertions => Err(SamlError::UnexpectedNumberOfAssertions {
                expected: self.expected_assertions,
                actual: n,
            }),
            _ => Ok(()),
        }
    }

    /// Validates the decrypted assertions of a successful identity
    /// provider response and records them against replay.
    ///
    /// Exactly one authn assertion and one matching dataset assertion are
    /// required. Both must pass [`AssertionValidator::validate`] and agree
    /// on persistent identifier and issuer; the authn assertion must carry
    /// the principal IP address. Replay recording comes last, matching
    /// dataset first; if the authn assertion is then refused as a replay,
    /// the matching dataset record is released again.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate_identity_provider_assertions<'a, A: AsRef<Assertion>>(
        &self,
        assertions: &'a [A],
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> SamlResult<IdentityProviderAssertions<'a, A>> {
        let (authn, matching_dataset): (Vec<&A>, Vec<&A>) =
            assertions.iter().partition(|a| a.as_ref().is_authn_assertion());

        let [authn] = authn.as_slice() else {
            return Err(SamlError::MissingAuthnAssertion(authn.len()));
        };
        let [matching_dataset] = matching_dataset.as_slice() else {
            return Err(SamlError::MissingMatchingDatasetAssertion(matching_dataset.len()));
        };
        let routed = IdentityProviderAssertions {
            authn: *authn,
            matching_dataset: *matching_dataset,
        };
        let (authn, matching_dataset) = ((*authn).as_ref(), (*matching_dataset).as_ref());

        if authn.authn_statements.len() > 1 {
            return Err(SamlError::MultipleAuthnStatements {
                id: authn.id.clone(),
            });
        }

        let validator = &self.assertion_validator;
        validator.validate(matching_dataset, context, now)?;
        validator.validate_attribute_statement(matching_dataset)?;
        validator.validate(authn, context, now)?;

        // Consistency
        let authn_pid = authn.persistent_id().unwrap_or_default();
        let mds_pid = matching_dataset.persistent_id().unwrap_or_default();
        if authn_pid != mds_pid {
            return Err(SamlError::MismatchedPersistentIdentifiers {
                authn: authn_pid.to_string(),
                matching_dataset: mds_pid.to_string(),
            });
        }
        let authn_issuer = authn.issuer_value().unwrap_or_default();
        let mds_issuer = matching_dataset.issuer_value().unwrap_or_default();
        if authn_issuer != mds_issuer {
            return Err(SamlError::MismatchedIssuers {
                authn: authn_issuer.to_string(),
                matching_dataset: mds_issuer.to_string(),
            });
        }

        validator.validate_ip_address(authn)?;

        validator.validate_for_duplicates(matching_dataset, ReplayNamespace::MatchingDataset, now)?;
        if let Err(err) = validator.validate_for_duplicates(authn, ReplayNamespace::Authn, now) {
            validator.release_duplicate_record(matching_dataset, ReplayNamespace::MatchingDataset);
            return Err(err);
        }

        Ok(routed)
    }

    /// Validates the single decrypted assertion of a matching service
    /// response and records it against replay.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate_matching_service_assertion(
        &self,
        assertion: &Assertion,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        self.assertion_validator.validate(assertion, context, now)?;
        self.assertion_validator
            .validate_for_duplicates(assertion, ReplayNamespace::MatchingService, now)
    }

    /// Validates a matching service health check response: a signed
    /// envelope whose status is Success with the healthy sub-code.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate_health_check(&self, response: &Response) -> SamlResult<()> {
        let id = response.id.as_str();
        if id.is_empty() {
            return Err(SamlError::MissingId { element: "Response" });
        }
        validate_issuer(id, response.issuer.as_ref())?;
        match &response.signature {
            None => return Err(SamlError::MissingSignature { id: id.to_string() }),
            Some(signature) if !signature.is_signed() => {
                return Err(SamlError::SignatureNotSigned { id: id.to_string() });
            }
            Some(_) => {}
        }

        let code = &response.status.status_code;
        if code.value == status_codes::REQUESTER {
            return Ok(());
        }
        let sub = code
            .sub_status_value()
            .ok_or_else(|| SamlError::MissingSubStatus(code.value.clone()))?;
        if code.value != status_codes::SUCCESS {
            return Err(SamlError::UnrecognizedStatus(format!(
                "health check status {}",
                code.value
            )));
        }
        if sub != hub_status_codes::HEALTHY {
            return Err(SamlError::SubStatusMustBeOneOf {
                actual: sub.to_string(),
                allowed: hub_status_codes::HEALTHY.to_string(),
            });
        }
        Ok(())
    }
}

/// Matching service statuses other than Requester must carry a sub-code
/// from the vocabulary of their top code.
fn validate_matching_service_sub_status(response: &Response) -> SamlResult<()> {
    let code = &response.status.status_code;
    if code.value == status_codes::REQUESTER {
        return Ok(());
    }
    let sub = code
        .sub_status_value()
        .ok_or_else(|| SamlError::MissingSubStatus(code.value.clone()))?;

    let allowed = match code.value.as_str() {
        status_codes::RESPONDER => MATCHING_SERVICE_RESPONDER_SUB_CODES,
        status_codes::SUCCESS => MATCHING_SERVICE_SUCCESS_SUB_CODES,
        _ => return Ok(()),
    };
    if allowed.contains(&sub) {
        Ok(())
    } else {
        Err(SamlError::SubStatusMustBeOneOf {
            actual: sub.to_string(),
            allowed: allowed.join(", "),
        })
    }
}
