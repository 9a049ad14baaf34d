//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer. The
//! hub receives two kinds from identity providers: one carrying an
//! authentication statement and one carrying the matching dataset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{
    attribute_names, Issuer, LevelOfAssurance, NameId, SAML_VERSION, SUBJECT_CONFIRMATION_BEARER,
};
use crate::signature::XmlSignature;

/// SAML Assertion.
///
/// Optional fields model what may be absent on the wire; the validators
/// decide which absences are acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion. Empty when absent on the wire.
    pub id: String,

    /// Version of the SAML protocol. Empty when absent on the wire.
    pub version: String,

    /// Timestamp when this assertion was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// The entity that issued this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Issuer>,

    /// The enveloped signature, if one is present.
    #[serde(skip)]
    pub signature: Option<XmlSignature>,

    /// The subject of this assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Authentication statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authn_statements: Vec<AuthnStatement>,

    /// Attribute statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_statements: Vec<AttributeStatement>,
}

impl Assertion {
    /// Creates a new assertion with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self::with_id(hub_crypto::generate_saml_id(), issuer)
    }

    /// Creates a new assertion with a custom ID.
    #[must_use]
    pub fn with_id(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(Issuer::entity(issuer)),
            signature: None,
            subject: None,
            conditions: None,
            authn_statements: Vec::new(),
            attribute_statements: Vec::new(),
        }
    }

    /// Sets the issue instant.
    #[must_use]
    pub fn with_issue_instant(mut self, instant: DateTime<Utc>) -> Self {
        self.issue_instant = Some(instant);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Adds an authentication statement.
    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statements.push(statement);
        self
    }

    /// Adds an attribute statement.
    #[must_use]
    pub fn with_attribute_statement(mut self, statement: AttributeStatement) -> Self {
        self.attribute_statements.push(statement);
        self
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

    /// True if the assertion carries an authentication statement.
    #[must_use]
    pub fn is_authn_assertion(&self) -> bool {
        !self.authn_statements.is_empty()
    }

    /// The subject's name identifier value.
    #[must_use]
    pub fn persistent_id(&self) -> Option<&str> {
        self.subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.as_str())
    }

    /// Bearer subject confirmations.
    pub fn bearer_confirmations(&self) -> impl Iterator<Item = &SubjectConfirmation> {
        self.subject
            .iter()
            .flat_map(|s| s.subject_confirmations.iter())
            .filter(|c| c.is_bearer())
    }

    /// Level of assurance from the first authentication statement.
    #[must_use]
    pub fn level_of_assurance(&self) -> Option<LevelOfAssurance> {
        self.authn_statements
            .first()
            .and_then(|s| s.authn_context.authn_context_class_ref.as_deref())
            .and_then(LevelOfAssurance::from_uri)
    }

    /// First attribute with the given name across all statements.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes_named(name).next()
    }

    /// Every attribute with the given name, in statement order.
    pub fn attributes_named<'a: 'n, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Attribute> + 'n {
        self.attribute_statements
            .iter()
            .flat_map(|s| s.attributes.iter())
            .filter(move |a| a.name == name)
    }

    /// First non-blank value of any `TXN_IPaddress` attribute.
    #[must_use]
    pub fn principal_ip_address(&self) -> Option<&str> {
        self.attributes_named(attribute_names::IP_ADDRESS)
            .flat_map(|a| a.values.iter())
            .map(|v| v.value.trim())
            .find(|v| !v.is_empty())
    }
}

impl AsRef<Self> for Assertion {
    fn as_ref(&self) -> &Self {
        self
    }
}

/// Subject of an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier for the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Subject confirmations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a new subject with a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            subject_confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.subject_confirmations.push(confirmation);
        self
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method.
    pub method: String,

    /// Additional confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer() -> Self {
        Self {
            method: SUBJECT_CONFIRMATION_BEARER.to_string(),
            subject_confirmation_data: None,
        }
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.subject_confirmation_data = Some(data);
        self
    }

    /// True for the bearer method.
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.method == SUBJECT_CONFIRMATION_BEARER
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// The request ID that this assertion responds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Time after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Time before which the subject cannot be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// The location to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl SubjectConfirmationData {
    /// Confirmation data answering `request_id` at `recipient`, valid for
    /// `validity` from `now`.
    #[must_use]
    pub fn for_request(
        request_id: impl Into<String>,
        recipient: impl Into<String>,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        Self {
            in_response_to: Some(request_id.into()),
            not_on_or_after: Some(now + validity),
            not_before: None,
            recipient: Some(recipient.into()),
        }
    }
}

/// Conditions for assertion validity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at or after which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,
}

impl Conditions {
    /// Conditions valid from `now` for `validity`.
    #[must_use]
    pub fn valid_for(now: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            not_before: Some(now),
            not_on_or_after: Some(now + validity),
            audience_restrictions: Vec::new(),
        }
    }

    /// Adds an audience restriction.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience_restrictions.push(AudienceRestriction {
            audiences: vec![audience.into()],
        });
        self
    }
}

/// Audience restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// List of valid audiences.
    pub audiences: Vec<String>,
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// The time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// The authentication context.
    pub authn_context: AuthnContext,
}

impl AuthnStatement {
    /// Creates an authentication statement at the given level.
    #[must_use]
    pub fn new(level: LevelOfAssurance, authn_instant: DateTime<Utc>) -> Self {
        Self {
            authn_instant,
            authn_context: AuthnContext {
                authn_context_class_ref: Some(level.uri().to_string()),
            },
        }
    }
}

/// Authentication context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnContext {
    /// Authentication context class reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
}

/// Attribute statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// List of attributes.
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    /// Creates a new empty attribute statement.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,

    /// The format of the attribute name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// A human-readable name for the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// The attribute values.
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    /// Creates a new attribute with a single value.
    #[must_use]
    pub fn single(name: impl Into<String>, value: AttributeValue) -> Self {
        Self::multi(name, vec![value])
    }

    /// Creates a new attribute with multiple values.
    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            values,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// The value text.
    pub value: String,

    /// Declared `xsi:type`, prefixed as on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsi_type: Option<String>,

    /// Declared `xml:lang`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AttributeValue {
    /// An untyped value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            xsi_type: None,
            language: None,
        }
    }

    /// A value of a hub attribute type, e.g. `PersonNameType`.
    #[must_use]
    pub fn typed(value: impl Into<String>, type_local_name: &str) -> Self {
        Self {
            xsi_type: Some(format!("ida:{type_local_name}")),
            ..Self::new(value)
        }
    }

    /// A plain `xs:string` value.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            xsi_type: Some("xs:string".to_string()),
            ..Self::new(value)
        }
    }

    /// Sets the language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Declared type without its namespace prefix.
    #[must_use]
    pub fn type_local_name(&self) -> Option<&str> {
        self.xsi_type
            .as_deref()
            .map(|t| t.rsplit_once(':').map_or(t, |(_, local)| local))
    }
}
