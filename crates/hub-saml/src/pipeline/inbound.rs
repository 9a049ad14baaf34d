//! Decrypt-then-validate pipeline for messages the hub receives.
//!
//! Every inbound flow runs the same steps in order: deserialize, validate
//! the envelope, verify its signature, decrypt every assertion, check and
//! verify each assertion's signature, validate the assertions, and only
//! then assemble the domain object. Any failure aborts the whole
//! response; there is no partial result.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use hub_core::HubConfig;
use hub_crypto::RecipientKey;

use crate::bindings::post;
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::domain::{
    CarrierAssertion, CountryOutcome, CountrySignedResponseContainer, FraudDetails,
    InboundResponseFromCountry, InboundResponseFromIdp, InboundResponseFromMatchingService,
};
use crate::eidas::{CarrierSubject, CrossBorderAdapter};
use crate::encryption::{AssertionBlobEncrypter, AssertionDecrypter};
use crate::error::{SamlError, SamlResult};
use crate::replay::{ReplayGuard, ReplayNamespace};
use crate::signature::SignatureVerifier;
use crate::status_codec::{DecodedStatus, MessageKind, StatusCodec};
use crate::types::{Assertion, Response};
use crate::validators::{AssertionValidator, RequestContext, ResponseValidator};
use crate::xml::XmlNode;

/// Encrypted assertions expected in a successful identity provider
/// response: one authn, one matching dataset.
const IDENTITY_PROVIDER_ASSERTION_COUNT: usize = 2;
/// Encrypted assertions expected in a successful matching service response.
const MATCHING_SERVICE_ASSERTION_COUNT: usize = 1;
/// Encrypted assertions expected in a successful country response.
const COUNTRY_ASSERTION_COUNT: usize = 1;

/// A deserialized response whose envelope passed validation.
struct Opened {
    node: XmlNode,
    response: Response,
    status: DecodedStatus,
}

/// A decrypted assertion, as received and as typed.
///
/// The received node is what gets forwarded, so content the typed model
/// does not carry survives and the issuer's signature still verifies.
struct Decrypted {
    node: XmlNode,
    assertion: Assertion,
}

impl AsRef<Assertion> for Decrypted {
    fn as_ref(&self) -> &Assertion {
        &self.assertion
    }
}

#[derive(Debug, Clone)]
struct CrossBorder {
    adapter: CrossBorderAdapter,
    recipients: Vec<RecipientKey>,
}

/// Turns inbound wire messages into validated domain objects.
///
/// Shares one [`ReplayGuard`] across all message kinds.
#[derive(Clone)]
pub struct DecryptValidationPipeline {
    identity_provider: ResponseValidator,
    matching_service: ResponseValidator,
    country: ResponseValidator,
    replay_guard: Arc<ReplayGuard>,
    verifier: Arc<dyn SignatureVerifier>,
    decrypter: Arc<dyn AssertionDecrypter>,
    blob_encrypter: Arc<dyn AssertionBlobEncrypter>,
    clock: Arc<dyn Clock>,
    cross_border: Option<CrossBorder>,
    assertion_consumer_endpoint: String,
    response_destination: Option<String>,
}

impl DecryptValidationPipeline {
    /// Creates a pipeline using the endpoints of `config`.
    #[must_use]
    pub fn new(
        config: &HubConfig,
        replay_guard: Arc<ReplayGuard>,
        verifier: Arc<dyn SignatureVerifier>,
        decrypter: Arc<dyn AssertionDecrypter>,
        blob_encrypter: Arc<dyn AssertionBlobEncrypter>,
    ) -> Self {
        let assertions = AssertionValidator::new(Arc::clone(&replay_guard));
        Self {
            identity_provider: ResponseValidator::new(
                MessageKind::IdentityProvider,
                IDENTITY_PROVIDER_ASSERTION_COUNT,
                assertions.clone(),
            ),
            matching_service: ResponseValidator::new(
                MessageKind::MatchingService,
                MATCHING_SERVICE_ASSERTION_COUNT,
                assertions.clone(),
            ),
            country: ResponseValidator::new(MessageKind::Country, COUNTRY_ASSERTION_COUNT, assertions),
            replay_guard,
            verifier,
            decrypter,
            blob_encrypter,
            clock: Arc::new(SystemClock),
            cross_border: None,
            assertion_consumer_endpoint: config.endpoints.assertion_consumer_endpoint.clone(),
            response_destination: config.endpoints.response_destination.clone(),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enables carrier wrapping of unsigned country assertions, with
    /// content keys re-wrapped for each of `recipients`.
    #[must_use]
    pub fn with_cross_border(mut self, adapter: CrossBorderAdapter, recipients: Vec<RecipientKey>) -> Self {
        self.cross_border = Some(CrossBorder { adapter, recipients });
        self
    }

    /// The request context for a response to `request_id`, using the
    /// configured consumer endpoint and destination.
    #[must_use]
    pub fn request_context(&self, request_id: impl Into<String>) -> RequestContext {
        let context = RequestContext::new(request_id, &self.assertion_consumer_endpoint);
        match &self.response_destination {
            Some(destination) => context.with_destination(destination),
            None => context,
        }
    }

    /// Whether `id` is currently recorded in `namespace`. Never records.
    #[must_use]
    pub fn is_duplicate(&self, id: &str, namespace: ReplayNamespace) -> bool {
        self.replay_guard.is_duplicate(id, namespace, self.clock.now())
    }

    // ========================================================================
    // Identity provider
    // ========================================================================

    /// Validates an identity provider response.
    ///
    /// A successful response must carry one authn and one matching dataset
    /// assertion; both are recorded against replay and handed on as blobs.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any step.
    pub fn process_idp_response(
        &self,
        bytes: &[u8],
        context: &RequestContext,
    ) -> SamlResult<InboundResponseFromIdp> {
        let now = self.clock.now();
        let Opened { node, response, status } = self.open(bytes, &self.identity_provider, context)?;

        let mut inbound = InboundResponseFromIdp {
            response_id: response.id.clone(),
            issuer: response.issuer_value().unwrap_or_default().to_string(),
            status,
            persistent_id: None,
            level_of_assurance: None,
            fraud: None,
            principal_ip_address: None,
            encrypted_authn_assertion: None,
            encrypted_matching_dataset_assertion: None,
        };
        if response.encrypted_assertions.is_empty() {
            return Ok(inbound);
        }

        let assertions = self.decrypt_and_verify(&node, self.identity_provider.assertion_validator())?;
        let routed = self
            .identity_provider
            .validate_identity_provider_assertions(&assertions, context, now)?;
        tracing::debug!(response_id = %response.id, "Identity provider assertions validated");

        let authn = &routed.authn.assertion;
        inbound.persistent_id = authn.persistent_id().map(str::to_string);
        inbound.level_of_assurance = authn.level_of_assurance();
        inbound.fraud = FraudDetails::from_assertion(authn);
        inbound.principal_ip_address = authn.principal_ip_address().map(str::to_string);
        inbound.encrypted_authn_assertion = Some(self.reencrypt(routed.authn)?);
        inbound.encrypted_matching_dataset_assertion = Some(self.reencrypt(routed.matching_dataset)?);
        Ok(inbound)
    }

    // ========================================================================
    // Matching service
    // ========================================================================

    /// Validates a matching service response.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any step.
    pub fn process_matching_service_response(
        &self,
        bytes: &[u8],
        context: &RequestContext,
    ) -> SamlResult<InboundResponseFromMatchingService> {
        let now = self.clock.now();
        let Opened { node, response, status } = self.open(bytes, &self.matching_service, context)?;

        let mut inbound = InboundResponseFromMatchingService {
            response_id: response.id.clone(),
            issuer: response.issuer_value().unwrap_or_default().to_string(),
            status,
            level_of_assurance: None,
            encrypted_matching_service_assertion: None,
        };

        let assertions = self.decrypt_and_verify(&node, self.matching_service.assertion_validator())?;
        if let Some(decrypted) = assertions.first() {
            self.matching_service
                .validate_matching_service_assertion(&decrypted.assertion, context, now)?;
            inbound.level_of_assurance = decrypted.assertion.level_of_assurance();
            inbound.encrypted_matching_service_assertion = Some(self.reencrypt(decrypted)?);
        }
        Ok(inbound)
    }

    /// Validates a matching service health check response.
    ///
    /// # Errors
    ///
    /// Returns the first failing check, or
    /// [`SamlError::SignatureInvalid`] if the signature does not verify.
    pub fn process_health_check_response(&self, bytes: &[u8]) -> SamlResult<DecodedStatus> {
        let node = post::deserialize(bytes)?;
        let response = codec::response_from_node(&node)?;
        self.matching_service.validate_health_check(&response)?;
        self.verify_envelope(&node, &response)?;
        StatusCodec::new(MessageKind::MatchingService).decode(&response.status)
    }

    // ========================================================================
    // Country
    // ========================================================================

    /// Validates an eIDAS country response.
    ///
    /// Signed country assertions are validated and recorded like any
    /// other. If any assertion is unsigned and cross-border wrapping is
    /// enabled, the response is wrapped in a carrier assertion instead.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any step. Unsigned assertions without
    /// cross-border wrapping fail with their signature error.
    pub fn process_country_response(
        &self,
        bytes: &[u8],
        context: &RequestContext,
    ) -> SamlResult<CountryOutcome> {
        let now = self.clock.now();
        let Opened { node, response, status } = self.open(bytes, &self.country, context)?;

        let mut inbound = InboundResponseFromCountry {
            response_id: response.id.clone(),
            issuer: response.issuer_value().unwrap_or_default().to_string(),
            status,
            persistent_id: None,
            level_of_assurance: None,
            encrypted_identity_assertion: None,
        };
        if response.encrypted_assertions.is_empty() {
            return Ok(CountryOutcome::Validated(inbound));
        }

        let validator = self.country.assertion_validator();
        let decrypted = self.decrypt_all(&node)?;
        let unsigned = decrypted
            .iter()
            .find_map(|d| validator.validate_signature(&d.assertion).err());
        if let Some(err) = unsigned {
            let Some(cross_border) = &self.cross_border else {
                return Err(err);
            };
            tracing::debug!(
                response_id = %response.id,
                country = %inbound.issuer,
                "Country assertions are unsigned, wrapping in carrier"
            );
            return self
                .wrap_country_response(cross_border, &node, inbound.issuer, &decrypted, context, now)
                .map(CountryOutcome::Carrier);
        }

        for d in &decrypted {
            self.verify_assertion(validator, d)?;
        }
        for d in &decrypted {
            validator.validate(&d.assertion, context, now)?;
        }
        for d in &decrypted {
            validator.validate_for_duplicates(&d.assertion, ReplayNamespace::Authn, now)?;
        }

        if let Some(identity) = decrypted.first() {
            inbound.persistent_id = identity.assertion.persistent_id().map(str::to_string);
            inbound.level_of_assurance = identity.assertion.level_of_assurance();
            inbound.encrypted_identity_assertion = Some(self.reencrypt(identity)?);
        }
        Ok(CountryOutcome::Validated(inbound))
    }

    fn wrap_country_response(
        &self,
        cross_border: &CrossBorder,
        node: &XmlNode,
        country_entity_id: String,
        decrypted: &[Decrypted],
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> SamlResult<CarrierAssertion> {
        let identity = decrypted
            .first()
            .map(|d| &d.assertion)
            .ok_or_else(|| SamlError::MissingElement("Assertion".to_string()))?;
        let persistent_id = identity
            .persistent_id()
            .ok_or_else(|| SamlError::MissingSubject {
                id: identity.id.clone(),
            })?;
        let level_of_assurance = identity
            .level_of_assurance()
            .ok_or_else(|| SamlError::MissingElement("AuthnContextClassRef".to_string()))?;

        let content_keys = node
            .children_named("EncryptedAssertion")
            .map(|encrypted| self.decrypter.unwrap_key(encrypted))
            .collect::<SamlResult<Vec<_>>>()?;
        let container = CountrySignedResponseContainer {
            country_entity_id,
            base64_saml_response: base64::engine::general_purpose::STANDARD.encode(node.to_xml()),
            base64_encrypted_keys: cross_border
                .adapter
                .reencrypt_keys(&content_keys, &cross_border.recipients)?,
        };
        let subject = CarrierSubject {
            request_id: context.request_id.clone(),
            persistent_id: persistent_id.to_string(),
            level_of_assurance,
        };
        cross_border
            .adapter
            .wrap_unsigned_country_response(container, &subject, now)
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    fn open(
        &self,
        bytes: &[u8],
        validator: &ResponseValidator,
        context: &RequestContext,
    ) -> SamlResult<Opened> {
        let node = post::deserialize(bytes)?;
        let response = codec::response_from_node(&node)?;
        tracing::debug!(response_id = %response.id, kind = %validator.kind(), "Deserialized response");

        let status = validator.validate(&response, context)?;
        self.verify_envelope(&node, &response)?;
        Ok(Opened { node, response, status })
    }

    fn verify_envelope(&self, node: &XmlNode, response: &Response) -> SamlResult<()> {
        if self.verifier.verify(node) {
            Ok(())
        } else {
            Err(SamlError::SignatureInvalid(format!(
                "response {} signature did not verify",
                response.id
            )))
        }
    }

    fn decrypt_all(&self, node: &XmlNode) -> SamlResult<Vec<Decrypted>> {
        let decrypted = node
            .children_named("EncryptedAssertion")
            .map(|encrypted| {
                let node = self.decrypter.decrypt(encrypted)?;
                let assertion = codec::assertion_from_node(&node)?;
                Ok(Decrypted { node, assertion })
            })
            .collect::<SamlResult<Vec<_>>>()?;
        tracing::debug!(count = decrypted.len(), "Decrypted assertions");
        Ok(decrypted)
    }

    fn verify_assertion(&self, validator: &AssertionValidator, decrypted: &Decrypted) -> SamlResult<()> {
        validator.validate_structure(&decrypted.assertion)?;
        validator.validate_signature(&decrypted.assertion)?;
        if self.verifier.verify(&decrypted.node) {
            Ok(())
        } else {
            Err(SamlError::SignatureInvalid(format!(
                "assertion {} signature did not verify",
                decrypted.assertion.id
            )))
        }
    }

    fn decrypt_and_verify(&self, node: &XmlNode, validator: &AssertionValidator) -> SamlResult<Vec<Decrypted>> {
        let decrypted = self.decrypt_all(node)?;
        for d in &decrypted {
            self.verify_assertion(validator, d)?;
        }
        Ok(decrypted)
    }

    /// Encrypts the assertion exactly as it was received and verified.
    fn reencrypt(&self, decrypted: &Decrypted) -> SamlResult<String> {
        self.blob_encrypter.encrypt_blob(&decrypted.node)
    }
}

impl std::fmt::Debug for DecryptValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptValidationPipeline")
            .field("clock", &self.clock)
            .field("cross_border", &self.cross_border.is_some())
            .field("assertion_consumer_endpoint", &self.assertion_consumer_endpoint)
            .finish_non_exhaustive()
    }
}
