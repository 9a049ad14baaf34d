//! Cross-border carrier assertions.
//!
//! Some country nodes encrypt their identity assertions without signing
//! them. The hub cannot vouch for such assertions, so it forwards the
//! country's signed response untouched, together with the assertions'
//! content keys re-wrapped for each downstream recipient, inside an
//! assertion the hub itself issues and signs. Validating the country
//! assertions is left to whoever holds those keys.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hub_core::HubConfig;
use hub_crypto::{ContentKey, RecipientKey};
use uuid::Uuid;

use crate::codec;
use crate::domain::{CarrierAssertion, CountrySignedResponseContainer};
use crate::error::SamlResult;
use crate::signature::XmlSigner;
use crate::types::{
    attribute_names, attribute_name_formats, attribute_types, Assertion, Attribute,
    AttributeStatement, AttributeValue, AuthnStatement, Conditions, LevelOfAssurance, NameId,
    Subject, SubjectConfirmation, SubjectConfirmationData,
};

/// Who the carrier is about and which request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierSubject {
    /// ID of the hub request the country responded to.
    pub request_id: String,
    /// Persistent identifier of the principal.
    pub persistent_id: String,
    /// Level of assurance the country asserted.
    pub level_of_assurance: LevelOfAssurance,
}

/// Builds hub-signed carrier assertions around unsigned country responses.
#[derive(Clone)]
pub struct CrossBorderAdapter {
    hub_eidas_entity_id: String,
    conditions_validity: Duration,
    confirmation_validity: Duration,
    signer: Arc<dyn XmlSigner>,
}

impl CrossBorderAdapter {
    /// Creates an adapter issuing as `hub_eidas_entity_id`.
    #[must_use]
    pub fn new(
        hub_eidas_entity_id: impl Into<String>,
        conditions_validity: Duration,
        confirmation_validity: Duration,
        signer: Arc<dyn XmlSigner>,
    ) -> Self {
        Self {
            hub_eidas_entity_id: hub_eidas_entity_id.into(),
            conditions_validity,
            confirmation_validity,
            signer,
        }
    }

    /// Creates an adapter from the hub configuration.
    #[must_use]
    pub fn from_config(config: &HubConfig, signer: Arc<dyn XmlSigner>) -> Self {
        Self::new(
            config.entities.hub_eidas_entity_id.clone(),
            Duration::seconds(config.eidas.carrier_conditions_validity_secs),
            Duration::seconds(config.eidas.carrier_confirmation_validity_secs),
            signer,
        )
    }

    /// Wraps each content key for every recipient, base64 encoded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SamlError::EncryptionFailed`] if wrapping fails.
    pub fn reencrypt_keys(
        &self,
        content_keys: &[ContentKey],
        recipients: &[RecipientKey],
    ) -> SamlResult<Vec<String>> {
        let mut wrapped = Vec::with_capacity(content_keys.len() * recipients.len());
        for recipient in recipients {
            for key in content_keys {
                let bytes = recipient.wrap_key(key)?;
                wrapped.push(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
        }
        Ok(wrapped)
    }

    /// Builds and signs the carrier assertion for `container`.
    ///
    /// The subject confirmation answers `subject.request_id` from `now`
    /// for the confirmation window; the conditions restrict the audience
    /// to the hub's eIDAS entity for the shorter conditions window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SamlError::SignatureCreation`] if signing fails.
    pub fn wrap_unsigned_country_response(
        &self,
        container: CountrySignedResponseContainer,
        subject: &CarrierSubject,
        now: DateTime<Utc>,
    ) -> SamlResult<CarrierAssertion> {
        let id = format!("_{}", Uuid::new_v4());
        let not_on_or_after = now + self.confirmation_validity;

        let confirmation = SubjectConfirmation::bearer().with_data(SubjectConfirmationData {
            in_response_to: Some(subject.request_id.clone()),
            not_on_or_after: Some(not_on_or_after),
            not_before: Some(now),
            recipient: None,
        });

        let response_attribute = Attribute::single(
            attribute_names::EIDAS_SAML_RESPONSE,
            AttributeValue::typed(&container.base64_saml_response, attribute_types::COUNTRY_SAML_RESPONSE),
        )
        .with_friendly_name("Eidas SAML Response")
        .with_format(attribute_name_formats::URI);
        let keys_attribute = Attribute::multi(
            attribute_names::ENCRYPTED_SECRET_KEYS,
            container
                .base64_encrypted_keys
                .iter()
                .map(|key| AttributeValue::typed(key, attribute_types::ENCRYPTED_ASSERTION_KEYS))
                .collect(),
        )
        .with_friendly_name("Encrypted Secret Keys")
        .with_format(attribute_name_formats::URI);

        let assertion = Assertion::with_id(&id, &self.hub_eidas_entity_id)
            .with_issue_instant(now)
            .with_subject(Subject::new(NameId::persistent(&subject.persistent_id)).with_confirmation(confirmation))
            .with_conditions(
                Conditions::valid_for(now, self.conditions_validity).with_audience(&self.hub_eidas_entity_id),
            )
            .with_authn_statement(AuthnStatement::new(subject.level_of_assurance, now))
            .with_attribute_statement(
                AttributeStatement::new()
                    .with_attribute(response_attribute)
                    .with_attribute(keys_attribute),
            );

        let node = self.signer.sign(codec::assertion_to_node(&assertion))?;
        tracing::debug!(
            assertion_id = %id,
            country = %container.country_entity_id,
            keys = container.base64_encrypted_keys.len(),
            "Built carrier assertion"
        );

        Ok(CarrierAssertion {
            id,
            container,
            not_on_or_after,
            node,
        })
    }
}

impl std::fmt::Debug for CrossBorderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossBorderAdapter")
            .field("hub_eidas_entity_id", &self.hub_eidas_entity_id)
            .field("conditions_validity", &self.conditions_validity)
            .field("confirmation_validity", &self.confirmation_validity)
            .finish_non_exhaustive()
    }
}
