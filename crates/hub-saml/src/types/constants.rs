//! SAML 2.0 constants and URIs used by the hub.
//!
//! Contains namespace URIs, name ID formats, levels of assurance, status
//! vocabularies and the attribute dictionary shared by the hub's peers.

use serde::{Deserialize, Serialize};

/// SAML 2.0 namespace URI.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace URI.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// XML Digital Signature namespace URI.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace URI.
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// XSI namespace URI.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML Schema namespace URI, for `xs:string` values.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Namespace of the hub's attribute value types.
pub const IDA_NS: &str = "http://www.cabinetoffice.gov.uk/resource-library/ida/attributes";

/// The only SAML version the hub accepts.
pub const SAML_VERSION: &str = "2.0";

/// Subject confirmation method required on inbound assertions.
pub const SUBJECT_CONFIRMATION_BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// `xenc:EncryptedData/@Type` for an encrypted element.
pub const ENCRYPTED_ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";

/// Language person name values must be in, when one is given.
pub const PERSON_NAME_LANGUAGE: &str = "en-GB";

// ============================================================================
// Name ID Formats
// ============================================================================

/// SAML Name ID formats the hub deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NameIdFormat {
    /// Unspecified name ID format.
    #[default]
    Unspecified,
    /// Entity identifier format.
    Entity,
    /// Persistent identifier format.
    Persistent,
    /// Transient identifier format.
    Transient,
}

impl NameIdFormat {
    /// Returns the URI for this name ID format.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
            Self::Entity => "urn:oasis:names:tc:SAML:2.0:nameid-format:entity",
            Self::Persistent => "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
            Self::Transient => "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
        }
    }

    /// Parses a name ID format from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified" => Some(Self::Unspecified),
            "urn:oasis:names:tc:SAML:2.0:nameid-format:entity" => Some(Self::Entity),
            "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent" => Some(Self::Persistent),
            "urn:oasis:names:tc:SAML:2.0:nameid-format:transient" => Some(Self::Transient),
            _ => None,
        }
    }
}

// ============================================================================
// Levels of Assurance
// ============================================================================

/// Level of assurance asserted in an `AuthnContextClassRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelOfAssurance {
    /// Level X, used to report fraud events.
    LevelX,
    /// Level 1.
    Level1,
    /// Level 2.
    Level2,
    /// Level 3.
    Level3,
    /// Level 4.
    Level4,
    /// eIDAS low.
    EidasLow,
    /// eIDAS substantial.
    EidasSubstantial,
    /// eIDAS high.
    EidasHigh,
}

impl LevelOfAssurance {
    /// Returns the authn context class URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::LevelX => "urn:uk:gov:cabinet-office:tc:saml:authn-context:levelx",
            Self::Level1 => "urn:uk:gov:cabinet-office:tc:saml:authn-context:level1",
            Self::Level2 => "urn:uk:gov:cabinet-office:tc:saml:authn-context:level2",
            Self::Level3 => "urn:uk:gov:cabinet-office:tc:saml:authn-context:level3",
            Self::Level4 => "urn:uk:gov:cabinet-office:tc:saml:authn-context:level4",
            Self::EidasLow => "http://eidas.europa.eu/LoA/low",
            Self::EidasSubstantial => "http://eidas.europa.eu/LoA/substantial",
            Self::EidasHigh => "http://eidas.europa.eu/LoA/high",
        }
    }

    /// Parses a level of assurance from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::LevelX,
            Self::Level1,
            Self::Level2,
            Self::Level3,
            Self::Level4,
            Self::EidasLow,
            Self::EidasSubstantial,
            Self::EidasHigh,
        ]
        .into_iter()
        .find(|loa| loa.uri() == uri)
    }

    /// True for the eIDAS levels.
    #[must_use]
    pub const fn is_eidas(&self) -> bool {
        matches!(self, Self::EidasLow | Self::EidasSubstantial | Self::EidasHigh)
    }
}

// ============================================================================
// Status Codes
// ============================================================================

/// Top-level SAML status codes.
pub mod status_codes {
    /// Success status code.
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

    /// Requester error status code.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";

    /// Responder error status code.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
}

/// Second-level SAML status codes.
pub mod sub_status_codes {
    /// Authentication failed.
    pub const AUTHN_FAILED: &str = "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed";

    /// No authn context.
    pub const NO_AUTHN_CONTEXT: &str = "urn:oasis:names:tc:SAML:2.0:status:NoAuthnContext";

    /// Request denied.
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";

    /// Unknown principal.
    pub const UNKNOWN_PRINCIPAL: &str = "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal";
}

/// Second-level status codes defined by the hub.
pub mod hub_status_codes {
    /// Matching service found a match.
    pub const MATCH: &str = "urn:uk:gov:cabinet-office:tc:saml:statuscode:match";

    /// No match.
    pub const NO_MATCH: &str = "urn:uk:gov:cabinet-office:tc:saml:statuscode:no-match";

    /// More than one record matched.
    pub const MULTI_MATCH: &str = "urn:uk:gov:cabinet-office:tc:saml:statuscode:multi-match";

    /// Health check response.
    pub const HEALTHY: &str = "urn:uk:gov:cabinet-office:tc:saml:statuscode:healthy";

    /// A user account was created.
    pub const CREATED: &str = "urn:uk:gov:cabinet-office:tc:saml:statuscode:created";

    /// User account creation failed.
    pub const CREATE_FAILURE: &str = "urn:uk:gov:cabinet-office:tc:saml:statuscode:create-failure";
}

/// `StatusDetail` tokens that refine a status code.
pub mod status_details {
    /// The user cancelled at the IdP.
    pub const AUTHN_CANCEL: &str = "authn-cancel";

    /// Authentication is pending a higher level of assurance.
    pub const LOA_PENDING: &str = "LOA-pending";

    /// Uplift to the requested level failed.
    pub const UPLIFT_FAILED: &str = "uplift-failed";
}

// ============================================================================
// Attributes
// ============================================================================

/// Attribute name formats.
pub mod attribute_name_formats {
    /// Unspecified name format.
    pub const UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:unspecified";

    /// URI name format.
    pub const URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

    /// Basic name format.
    pub const BASIC: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";
}

/// Attribute names exchanged with IdPs, matching services and country nodes.
pub mod attribute_names {
    /// First name.
    pub const FIRSTNAME: &str = "Firstname";
    /// Middle names.
    pub const MIDDLENAME: &str = "Middlename";
    /// Surname.
    pub const SURNAME: &str = "Surname";
    /// Gender.
    pub const GENDER: &str = "Gender";
    /// Date of birth.
    pub const DATE_OF_BIRTH: &str = "DateOfBirth";
    /// Current address.
    pub const CURRENT_ADDRESS: &str = "CurrentAddress";
    /// Previous address.
    pub const PREVIOUS_ADDRESS: &str = "PreviousAddress";
    /// Principal's IP address as seen by the IdP.
    pub const IP_ADDRESS: &str = "TXN_IPaddress";
    /// Fraud event identifier.
    pub const FRAUD_EVENT_ID: &str = "IdpFraudEventId";
    /// GPG45 fraud indicator.
    pub const GPG45_STATUS: &str = "IdpGpg45Status";
    /// Opaque signed country response carried by the hub.
    pub const EIDAS_SAML_RESPONSE: &str = "EidasSamlResponse";
    /// Re-encrypted content keys for the country assertions.
    pub const ENCRYPTED_SECRET_KEYS: &str = "EncryptedSecretKeys";
}

/// Local names of the declared `xsi:type` of attribute values.
pub mod attribute_types {
    /// Plain string.
    pub const STRING: &str = "string";
    /// Person name.
    pub const PERSON_NAME: &str = "PersonNameType";
    /// Gender.
    pub const GENDER: &str = "GenderType";
    /// Date.
    pub const DATE: &str = "DateType";
    /// Postal address.
    pub const ADDRESS: &str = "AddressType";
    /// IP address.
    pub const IP_ADDRESS: &str = "IPAddressType";
    /// Fraud event id.
    pub const FRAUD_EVENT_ID: &str = "IdpFraudEventIdType";
    /// GPG45 status.
    pub const GPG45_STATUS: &str = "Gpg45StatusType";
    /// Base64 country response inside a carrier assertion.
    pub const COUNTRY_SAML_RESPONSE: &str = "CountrySamlResponse";
    /// Base64 wrapped content key inside a carrier assertion.
    pub const ENCRYPTED_ASSERTION_KEYS: &str = "EncryptedAssertionKeys";
}

// ============================================================================
// Signature and Encryption Algorithms
// ============================================================================

/// Canonicalization algorithms.
pub mod canonicalization_algorithms {
    /// Exclusive C14N without comments.
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
}

/// Signature transforms.
pub mod transform_algorithms {
    /// Enveloped signature transform.
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_id_format_uri_roundtrip() {
        for format in [
            NameIdFormat::Unspecified,
            NameIdFormat::Entity,
            NameIdFormat::Persistent,
            NameIdFormat::Transient,
        ] {
            assert_eq!(NameIdFormat::from_uri(format.uri()), Some(format));
        }
    }

    #[test]
    fn level_of_assurance_parses_both_schemes() {
        assert_eq!(
            LevelOfAssurance::from_uri("urn:uk:gov:cabinet-office:tc:saml:authn-context:level2"),
            Some(LevelOfAssurance::Level2)
        );
        assert_eq!(
            LevelOfAssurance::from_uri("http://eidas.europa.eu/LoA/substantial"),
            Some(LevelOfAssurance::EidasSubstantial)
        );
        assert!(LevelOfAssurance::EidasHigh.is_eidas());
        assert!(!LevelOfAssurance::Level1.is_eidas());
        assert_eq!(LevelOfAssurance::from_uri("urn:unknown"), None);
    }

    #[test]
    fn hub_codes_share_a_prefix() {
        for code in [
            hub_status_codes::MATCH,
            hub_status_codes::NO_MATCH,
            hub_status_codes::MULTI_MATCH,
            hub_status_codes::HEALTHY,
            hub_status_codes::CREATED,
            hub_status_codes::CREATE_FAILURE,
        ] {
            assert!(code.starts_with("urn:uk:gov:cabinet-office:tc:saml:statuscode:"));
        }
    }
}
