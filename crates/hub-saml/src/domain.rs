//! Domain objects produced by the inbound pipeline and consumed by the
//! outbound one.
//!
//! Accepted assertions never leave the core in plaintext: the inbound
//! objects carry them as base64 blobs re-encrypted for the next hop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status_codec::{DecodedStatus, InternalStatus, MessageKind};
use crate::types::{attribute_names, Assertion, LevelOfAssurance};
use crate::xml::XmlNode;

/// Fraud indicators reported by an identity provider at level X.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudDetails {
    /// The IdP's fraud event id.
    pub event_id: String,
    /// GPG45 status code, if supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpg45_status: Option<String>,
}

impl FraudDetails {
    /// Extracts fraud details from a level X authn assertion.
    #[must_use]
    pub fn from_assertion(assertion: &Assertion) -> Option<Self> {
        if assertion.level_of_assurance() != Some(LevelOfAssurance::LevelX) {
            return None;
        }
        let first_value = |name: &str| {
            assertion
                .attribute(name)
                .and_then(|a| a.values.first())
                .map(|v| v.value.clone())
        };
        Some(Self {
            event_id: first_value(attribute_names::FRAUD_EVENT_ID)?,
            gpg45_status: first_value(attribute_names::GPG45_STATUS),
        })
    }
}

/// A validated identity provider response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundResponseFromIdp {
    /// Response ID.
    pub response_id: String,
    /// Identity provider entity id.
    pub issuer: String,
    /// Decoded status.
    pub status: DecodedStatus,
    /// Persistent identifier of the principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_id: Option<String>,
    /// Level of assurance of the authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_of_assurance: Option<LevelOfAssurance>,
    /// Fraud indicators, for level X responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud: Option<FraudDetails>,
    /// Principal IP address as seen by the IdP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_ip_address: Option<String>,
    /// Authn assertion, re-encrypted for the next hop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_authn_assertion: Option<String>,
    /// Matching dataset assertion, re-encrypted for the next hop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_matching_dataset_assertion: Option<String>,
}

/// A validated matching service response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundResponseFromMatchingService {
    /// Response ID.
    pub response_id: String,
    /// Matching service entity id.
    pub issuer: String,
    /// Decoded status.
    pub status: DecodedStatus,
    /// Level of assurance, when the assertion states one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_of_assurance: Option<LevelOfAssurance>,
    /// The matching service assertion, re-encrypted for the next hop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_matching_service_assertion: Option<String>,
}

/// A country response whose assertions were signed and validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundResponseFromCountry {
    /// Response ID.
    pub response_id: String,
    /// Country node entity id.
    pub issuer: String,
    /// Decoded status.
    pub status: DecodedStatus,
    /// Persistent identifier of the principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_id: Option<String>,
    /// eIDAS level of assurance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_of_assurance: Option<LevelOfAssurance>,
    /// The identity assertion, re-encrypted for the next hop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_identity_assertion: Option<String>,
}

/// Opaque signed country response handed through the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySignedResponseContainer {
    /// Country node entity id.
    pub country_entity_id: String,
    /// The country's response, base64 encoded. Not re-verified by the hub.
    pub base64_saml_response: String,
    /// Content keys of the country assertions, wrapped per downstream
    /// recipient and base64 encoded.
    pub base64_encrypted_keys: Vec<String>,
}

/// Hub-signed assertion wrapping an unsigned country response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierAssertion {
    /// Assertion ID.
    pub id: String,
    /// The wrapped country response.
    pub container: CountrySignedResponseContainer,
    /// Not valid at or after this instant.
    pub not_on_or_after: DateTime<Utc>,
    /// The signed `Assertion` element.
    pub node: XmlNode,
}

/// Result of processing a country response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryOutcome {
    /// The assertions were signed and validated by the hub.
    Validated(InboundResponseFromCountry),
    /// The assertions were unsigned and have been wrapped for the final
    /// consumer to validate.
    Carrier(CarrierAssertion),
}

/// A response the hub sends to a relying party or peer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponseFromHub {
    /// Response ID.
    pub response_id: String,
    /// ID of the request being answered.
    pub in_response_to: String,
    /// Hub entity id.
    pub issuer: String,
    /// Where the response is posted.
    pub destination: String,
    /// Vocabulary the status is encoded in.
    pub kind: MessageKind,
    /// Status to encode.
    pub status: InternalStatus,
    /// Optional free text for `StatusMessage`.
    pub status_message: Option<String>,
    /// Assertions to sign and encrypt for the recipient.
    pub assertions: Vec<Assertion>,
    /// Issue instant.
    pub issue_instant: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        attribute_types, AttributeStatement, AttributeValue, Attribute, AuthnStatement,
    };
    use crate::validators::fixtures::{authn_assertion, now, IDP};

    #[test]
    fn fraud_details_only_at_level_x() {
        assert!(FraudDetails::from_assertion(&authn_assertion()).is_none());

        let fraud = Assertion::with_id("_fraud", IDP)
            .with_authn_statement(AuthnStatement::new(LevelOfAssurance::LevelX, now()))
            .with_attribute_statement(
                AttributeStatement::new()
                    .with_attribute(Attribute::single(
                        attribute_names::FRAUD_EVENT_ID,
                        AttributeValue::typed("fraud-1", attribute_types::FRAUD_EVENT_ID),
                    ))
                    .with_attribute(Attribute::single(
                        attribute_names::GPG45_STATUS,
                        AttributeValue::typed("IT01", attribute_types::GPG45_STATUS),
                    )),
            );
        let details = FraudDetails::from_assertion(&fraud).unwrap();
        assert_eq!(details.event_id, "fraud-1");
        assert_eq!(details.gpg45_status.as_deref(), Some("IT01"));
    }

    #[test]
    fn inbound_response_serializes_without_empty_fields() {
        let response = InboundResponseFromIdp {
            response_id: "_r1".to_string(),
            issuer: IDP.to_string(),
            status: DecodedStatus {
                status: InternalStatus::AuthenticationFailed,
                message: None,
            },
            persistent_id: None,
            level_of_assurance: None,
            fraud: None,
            principal_ip_address: None,
            encrypted_authn_assertion: None,
            encrypted_matching_dataset_assertion: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("encrypted_authn_assertion").is_none());
        assert_eq!(json["issuer"], IDP);
    }
}
