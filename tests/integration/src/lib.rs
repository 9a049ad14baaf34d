//! Test harness for end-to-end hub scenarios.
//!
//! [`TestHub`] wires a [`DecryptValidationPipeline`] the way a deployment
//! would, with freshly generated keys for the hub and each of its peers.
//! Peers build their wire messages with the hub's own outbound pipeline,
//! so every scenario exercises both directions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hub_core::HubConfig;
use hub_crypto::encryption::KeySize;
use hub_crypto::{DecryptionKey, EcdsaSigningKey, EcdsaVerifyingKey};
use hub_saml::bindings::post;
use hub_saml::codec;
use hub_saml::encryption::{
    AssertionDecrypter, AssertionEncrypter, HybridAssertionDecrypter, HybridAssertionEncrypter,
    RecipientBlobEncrypter,
};
use hub_saml::signature::{EnvelopedSigner, XmlSignatureValidator, XmlSigner};
use hub_saml::xml::XmlNode;
use hub_saml::{
    attribute_names, attribute_types, Assertion, Attribute, AttributeStatement, AttributeValue,
    AuthnStatement, CrossBorderAdapter, DecryptValidationPipeline, FixedClock, LevelOfAssurance,
    NameId, ReplayGuard, RequestContext, Response, SigningEncryptionPipeline, Status, Subject,
    SubjectConfirmation, SubjectConfirmationData,
};

/// ID of the hub request every scenario answers.
pub const REQUEST_ID: &str = "req-1";
/// Hub assertion consumer endpoint.
pub const ACS: &str = "https://hub.test/acs";
/// Identity provider entity id.
pub const IDP: &str = "https://idp.test";
/// Matching service entity id.
pub const MSA: &str = "https://msa.test";
/// Country node entity id.
pub const COUNTRY: &str = "https://country.test";
/// Persistent identifier of the test principal.
pub const PID: &str = "pid-1";

/// The instant every scenario runs at.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()
}

/// A peer that signs the messages it sends to the hub.
pub struct Peer {
    /// Entity id used as issuer.
    pub entity_id: &'static str,
    signer: Arc<EnvelopedSigner>,
}

impl Peer {
    fn generate(entity_id: &'static str) -> anyhow::Result<(Self, EcdsaVerifyingKey)> {
        let key = EcdsaSigningKey::generate()?;
        let verifying_key = key.verifying_key();
        let signer = Arc::new(EnvelopedSigner::new(Arc::new(key)));
        Ok((Self { entity_id, signer }, verifying_key))
    }
}

/// A hub with trusted peers and a relying party.
pub struct TestHub {
    /// Configuration the pipeline was built from.
    pub config: HubConfig,
    /// The pipeline under test.
    pub pipeline: DecryptValidationPipeline,
    /// Verifies messages and carriers the hub signs.
    pub hub_verifier: XmlSignatureValidator,
    /// Verifies what the hub's peers sign.
    pub peer_verifier: XmlSignatureValidator,
    /// Signs outbound hub messages.
    pub hub_signer: Arc<EnvelopedSigner>,
    /// Receives re-encrypted assertion blobs.
    pub next_hop: Arc<DecryptionKey>,
    /// Receives outbound hub responses and carrier keys.
    pub relying_party: Arc<DecryptionKey>,
    /// Identity provider.
    pub idp: Peer,
    /// Matching service.
    pub msa: Peer,
    /// eIDAS country node.
    pub country: Peer,
    hub_key: Arc<DecryptionKey>,
    replay_guard: Arc<ReplayGuard>,
}

impl TestHub {
    /// Builds a hub from environment-style settings on top of the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or key generation
    /// fails.
    pub fn with_settings(settings: &[(&str, &str)]) -> anyhow::Result<Self> {
        let _ = hub_core::telemetry::init_tracing("hub_saml=debug");

        let mut vars: HashMap<String, String> = settings
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        vars.entry("HUB_ASSERTION_CONSUMER_ENDPOINT".to_string())
            .or_insert_with(|| ACS.to_string());
        let config = HubConfig::from_lookup(|key| vars.get(key).cloned())?;

        let (idp, idp_key) = Peer::generate(IDP)?;
        let (msa, msa_key) = Peer::generate(MSA)?;
        let (country, country_key) = Peer::generate(COUNTRY)?;
        let hub_signing_key = EcdsaSigningKey::generate()?;
        let hub_verifier = XmlSignatureValidator::new(vec![hub_signing_key.verifying_key()]);
        let peer_verifier = XmlSignatureValidator::new(vec![idp_key, msa_key, country_key]);

        let hub_key = Arc::new(DecryptionKey::generate("hub", KeySize::Rsa2048)?);
        let next_hop = Arc::new(DecryptionKey::generate("policy", KeySize::Rsa2048)?);
        let relying_party = Arc::new(DecryptionKey::generate("relying-party", KeySize::Rsa2048)?);
        let replay_guard = Arc::new(ReplayGuard::new());

        let pipeline = DecryptValidationPipeline::new(
            &config,
            Arc::clone(&replay_guard),
            Arc::new(peer_verifier.clone()),
            Arc::new(HybridAssertionDecrypter::new(Arc::clone(&hub_key))),
            Arc::new(RecipientBlobEncrypter::new(next_hop.recipient_key())),
        )
        .with_clock(Arc::new(FixedClock(now())));

        Ok(Self {
            config,
            pipeline,
            hub_verifier,
            peer_verifier,
            hub_signer: Arc::new(EnvelopedSigner::new(Arc::new(hub_signing_key))),
            next_hop,
            relying_party,
            idp,
            msa,
            country,
            hub_key,
            replay_guard,
        })
    }

    /// Builds a hub with default settings.
    ///
    /// # Errors
    ///
    /// See [`TestHub::with_settings`].
    pub fn new() -> anyhow::Result<Self> {
        Self::with_settings(&[])
    }

    /// Enables carrier wrapping of unsigned country assertions, with keys
    /// re-wrapped for the relying party.
    #[must_use]
    pub fn with_cross_border(mut self) -> Self {
        let adapter = CrossBorderAdapter::from_config(&self.config, self.hub_signer.clone());
        self.pipeline = self
            .pipeline
            .with_cross_border(adapter, vec![self.relying_party.recipient_key()]);
        self
    }

    /// Context for a response to [`REQUEST_ID`].
    #[must_use]
    pub fn context(&self) -> RequestContext {
        self.pipeline.request_context(REQUEST_ID)
    }

    /// Number of ids recorded against replay.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.replay_guard.len()
    }

    /// A response from `peer` with its assertions signed by the peer and
    /// encrypted for the hub.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or encryption fails.
    pub fn respond(&self, peer: &Peer, status: Status, assertions: Vec<Assertion>) -> anyhow::Result<Vec<u8>> {
        self.send(peer, envelope(peer, status, assertions))
    }

    /// Signs and encrypts an envelope built by hand, as `peer` would.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or encryption fails.
    pub fn send(&self, peer: &Peer, envelope: XmlNode) -> anyhow::Result<Vec<u8>> {
        let pipeline = SigningEncryptionPipeline::new(peer.signer.clone(), Arc::new(HybridAssertionEncrypter));
        Ok(pipeline.transform(envelope, &self.hub_key.recipient_key())?)
    }

    /// A response from `peer` whose assertions are encrypted for the hub
    /// but left unsigned. Only the envelope is signed.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or encryption fails.
    pub fn respond_unsigned(
        &self,
        peer: &Peer,
        status: Status,
        assertions: Vec<Assertion>,
    ) -> anyhow::Result<Vec<u8>> {
        let hub = self.hub_key.recipient_key();
        let mut node = envelope(peer, status, Vec::new());
        for mut assertion in assertions {
            assertion.signature = None;
            let encrypted = HybridAssertionEncrypter.encrypt(&codec::assertion_to_node(&assertion), &hub)?;
            node.children.push(encrypted);
        }
        Ok(post::serialize(&peer.signer.sign(node)?))
    }

    /// A response signed by a key the hub does not trust.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or encryption fails.
    pub fn respond_as_stranger(
        &self,
        entity_id: &'static str,
        status: Status,
        assertions: Vec<Assertion>,
    ) -> anyhow::Result<Vec<u8>> {
        let (stranger, _) = Peer::generate(entity_id)?;
        self.respond(&stranger, status, assertions)
    }

    /// Opens a re-encrypted assertion blob as the next hop.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob does not decrypt or parse.
    pub fn open_blob(&self, blob: &str) -> anyhow::Result<Assertion> {
        Ok(codec::assertion_from_node(&self.open_blob_node(blob)?)?)
    }

    /// Decrypts an assertion blob as the next hop would, keeping the
    /// element exactly as forwarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be decrypted.
    pub fn open_blob_node(&self, blob: &str) -> anyhow::Result<XmlNode> {
        let encrypted = post::deserialize(blob.as_bytes())?;
        Ok(HybridAssertionDecrypter::new(Arc::clone(&self.next_hop)).decrypt(&encrypted)?)
    }
}

/// An unsigned response envelope from `peer` answering [`REQUEST_ID`].
#[must_use]
pub fn envelope(peer: &Peer, status: Status, assertions: Vec<Assertion>) -> XmlNode {
    let mut response = Response::new(peer.entity_id, status)
        .in_response_to(REQUEST_ID)
        .with_issue_instant(now());
    response.assertions = assertions;
    codec::response_to_node(&response)
}

// ============================================================================
// Assertions
// ============================================================================

fn subject() -> Subject {
    Subject::new(NameId::persistent(PID)).with_confirmation(SubjectConfirmation::bearer().with_data(
        SubjectConfirmationData::for_request(REQUEST_ID, ACS, now(), Duration::minutes(5)),
    ))
}

/// Identity provider authn assertion at level 2, with the principal's IP.
#[must_use]
pub fn authn_assertion() -> Assertion {
    Assertion::with_id("_authn", IDP)
        .with_issue_instant(now())
        .with_subject(subject())
        .with_authn_statement(AuthnStatement::new(LevelOfAssurance::Level2, now()))
        .with_attribute_statement(AttributeStatement::new().with_attribute(Attribute::single(
            attribute_names::IP_ADDRESS,
            AttributeValue::typed("192.0.2.10", attribute_types::IP_ADDRESS),
        )))
}

/// Identity provider matching dataset assertion.
#[must_use]
pub fn matching_dataset_assertion() -> Assertion {
    Assertion::with_id("_mds", IDP)
        .with_issue_instant(now())
        .with_subject(subject())
        .with_attribute_statement(
            AttributeStatement::new()
                .with_attribute(Attribute::single(
                    attribute_names::FIRSTNAME,
                    AttributeValue::typed("Jane", attribute_types::PERSON_NAME).with_language("en-GB"),
                ))
                .with_attribute(Attribute::single(
                    attribute_names::SURNAME,
                    AttributeValue::typed("Doe", attribute_types::PERSON_NAME),
                ))
                .with_attribute(Attribute::single(
                    attribute_names::DATE_OF_BIRTH,
                    AttributeValue::typed("1980-01-01", attribute_types::DATE),
                )),
        )
}

/// Matching service assertion at level 2.
#[must_use]
pub fn matching_service_assertion() -> Assertion {
    Assertion::with_id("_msa", MSA)
        .with_issue_instant(now())
        .with_subject(subject())
        .with_authn_statement(AuthnStatement::new(LevelOfAssurance::Level2, now()))
}

/// Country identity assertion at eIDAS substantial.
#[must_use]
pub fn country_assertion() -> Assertion {
    Assertion::with_id("_country", COUNTRY)
        .with_issue_instant(now())
        .with_subject(subject())
        .with_authn_statement(AuthnStatement::new(LevelOfAssurance::EidasSubstantial, now()))
}
