//! Mapping between the typed SAML model and XML nodes.
//!
//! Marshalling always produces the same node for the same value, so
//! signatures computed over marshalled nodes stay valid after a parse and
//! re-serialize. Unmarshalling ignores elements it does not know and
//! leaves required-but-absent identifiers empty, so that the validators
//! can report them with their specific failure.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSignature;
use crate::status_codec::MAX_STATUS_DEPTH;
use crate::types::{
    Assertion, Attribute, AttributeStatement, AttributeValue, AudienceRestriction, AuthnContext,
    AuthnStatement, CipherData, Conditions, EncryptedAssertion, EncryptedData, EncryptedKey,
    KeyInfo, NameId, Response, Status, StatusCode, Subject, SubjectConfirmation,
    SubjectConfirmationData, ENCRYPTED_ELEMENT_TYPE, IDA_NS, SAMLP_NS, SAML_NS, XMLDSIG_NS,
    XMLENC_NS, XSI_NS, XS_NS,
};
use crate::xml::XmlNode;

// ============================================================================
// Response
// ============================================================================

/// Marshals a response, including any plaintext and encrypted assertions.
#[must_use]
pub fn response_to_node(response: &Response) -> XmlNode {
    let mut node = XmlNode::new("samlp:Response")
        .with_attr("xmlns:samlp", SAMLP_NS)
        .with_attr("xmlns:saml", SAML_NS)
        .with_attr("ID", &response.id)
        .with_attr("Version", &response.version)
        .with_opt_attr("IssueInstant", response.issue_instant.map(format_instant))
        .with_opt_attr("InResponseTo", response.in_response_to.as_deref())
        .with_opt_attr("Destination", response.destination.as_deref());

    if let Some(issuer) = &response.issuer {
        node = node.with_child(name_id_to_node("saml:Issuer", issuer));
    }
    if let Some(signature) = &response.signature {
        node = node.with_child(signature.to_node());
    }
    node.with_child(status_to_node(&response.status))
        .with_children(response.assertions.iter().map(assertion_to_node))
        .with_children(response.encrypted_assertions.iter().map(encrypted_assertion_to_node))
}

/// Unmarshals a response.
///
/// # Errors
///
/// Fails if the node is not a `Response`, has no `Status`, or holds a
/// malformed timestamp or encrypted assertion.
pub fn response_from_node(node: &XmlNode) -> SamlResult<Response> {
    expect_element(node, "Response")?;
    let id = node.attr("ID").unwrap_or_default().to_string();

    let status = node
        .child("Status")
        .ok_or_else(|| SamlError::MissingStatus { id: id.clone() })
        .and_then(status_from_node)?;

    Ok(Response {
        version: node.attr("Version").unwrap_or_default().to_string(),
        issue_instant: instant_attr(node, "IssueInstant")?,
        issuer: node.child("Issuer").map(name_id_from_node),
        in_response_to: node.attr("InResponseTo").map(str::to_string),
        destination: node.attr("Destination").map(str::to_string),
        signature: node.child("Signature").map(XmlSignature::from_node),
        status,
        assertions: node
            .children_named("Assertion")
            .map(assertion_from_node)
            .collect::<SamlResult<_>>()?,
        encrypted_assertions: node
            .children_named("EncryptedAssertion")
            .map(encrypted_assertion_from_node)
            .collect::<SamlResult<_>>()?,
        id,
    })
}

// ============================================================================
// Status
// ============================================================================

/// Marshals a status.
#[must_use]
pub fn status_to_node(status: &Status) -> XmlNode {
    let mut node = XmlNode::new("samlp:Status").with_child(status_code_to_node(&status.status_code));
    if let Some(message) = &status.status_message {
        node = node.with_child(XmlNode::new("samlp:StatusMessage").with_text(message));
    }
    if let Some(detail) = &status.status_detail {
        node = node.with_child(
            XmlNode::new("samlp:StatusDetail").with_child(XmlNode::new("DetailValue").with_text(detail)),
        );
    }
    node
}

fn status_code_to_node(code: &StatusCode) -> XmlNode {
    let node = XmlNode::new("samlp:StatusCode").with_attr("Value", &code.value);
    match &code.status_code {
        Some(sub) => node.with_child(status_code_to_node(sub)),
        None => node,
    }
}

/// Unmarshals a status, keeping every level of nesting.
///
/// # Errors
///
/// Fails if there is no `StatusCode` or a code has no `Value`.
pub fn status_from_node(node: &XmlNode) -> SamlResult<Status> {
    let code = node
        .child("StatusCode")
        .ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))?;

    let status_detail = node.child("StatusDetail").and_then(|detail| {
        detail
            .children
            .first()
            .and_then(|value| value.text.clone())
            .or_else(|| detail.text.clone())
    });

    Ok(Status {
        status_code: status_code_from_node(code)?,
        status_message: node.child_text("StatusMessage").map(str::to_string),
        status_detail,
    })
}

/// Reads at most one level beyond [`MAX_STATUS_DEPTH`], so the status
/// codec can still name an over-deep chain without walking all of it.
fn status_code_from_node(node: &XmlNode) -> SamlResult<StatusCode> {
    let mut values = Vec::new();
    let mut current = Some(node);
    while let Some(code) = current {
        if values.len() > MAX_STATUS_DEPTH {
            return Err(SamlError::NestedStatusTooDeep);
        }
        let value = code
            .attr("Value")
            .ok_or_else(|| SamlError::MissingElement("StatusCode/@Value".to_string()))?;
        values.push(value);
        current = code.child("StatusCode");
    }

    let mut status_code = None;
    for value in values.into_iter().rev() {
        status_code = Some(StatusCode {
            value: value.to_string(),
            status_code: status_code.map(Box::new),
        });
    }
    status_code.ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))
}

// ============================================================================
// Assertion
// ============================================================================

/// Marshals an assertion with its own namespace declarations.
#[must_use]
pub fn assertion_to_node(assertion: &Assertion) -> XmlNode {
    let mut node = XmlNode::new("saml:Assertion")
        .with_attr("xmlns:saml", SAML_NS)
        .with_attr("xmlns:xsi", XSI_NS)
        .with_attr("xmlns:xs", XS_NS)
        .with_attr("xmlns:ida", IDA_NS)
        .with_attr("ID", &assertion.id)
        .with_attr("Version", &assertion.version)
        .with_opt_attr("IssueInstant", assertion.issue_instant.map(format_instant));

    if let Some(issuer) = &assertion.issuer {
        node = node.with_child(name_id_to_node("saml:Issuer", issuer));
    }
    if let Some(signature) = &assertion.signature {
        node = node.with_child(signature.to_node());
    }
    if let Some(subject) = &assertion.subject {
        node = node.with_child(subject_to_node(subject));
    }
    if let Some(conditions) = &assertion.conditions {
        node = node.with_child(conditions_to_node(conditions));
    }
    node.with_children(assertion.authn_statements.iter().map(authn_statement_to_node))
        .with_children(assertion.attribute_statements.iter().map(attribute_statement_to_node))
}

/// Unmarshals an assertion.
///
/// # Errors
///
/// Fails if the node is not an `Assertion` or holds a malformed timestamp.
pub fn assertion_from_node(node: &XmlNode) -> SamlResult<Assertion> {
    expect_element(node, "Assertion")?;

    Ok(Assertion {
        id: node.attr("ID").unwrap_or_default().to_string(),
        version: node.attr("Version").unwrap_or_default().to_string(),
        issue_instant: instant_attr(node, "IssueInstant")?,
        issuer: node.child("Issuer").map(name_id_from_node),
        signature: node.child("Signature").map(XmlSignature::from_node),
        subject: node.child("Subject").map(subject_from_node).transpose()?,
        conditions: node.child("Conditions").map(conditions_from_node).transpose()?,
        authn_statements: node
            .children_named("AuthnStatement")
            .map(authn_statement_from_node)
            .collect::<SamlResult<_>>()?,
        attribute_statements: node
            .children_named("AttributeStatement")
            .map(attribute_statement_from_node)
            .collect(),
    })
}

fn name_id_to_node(name: &str, name_id: &NameId) -> XmlNode {
    XmlNode::new(name)
        .with_opt_attr("Format", name_id.format.as_deref())
        .with_text(&name_id.value)
}

fn name_id_from_node(node: &XmlNode) -> NameId {
    NameId {
        value: node.text.clone().unwrap_or_default(),
        format: node.attr("Format").map(str::to_string),
    }
}

fn subject_to_node(subject: &Subject) -> XmlNode {
    let mut node = XmlNode::new("saml:Subject");
    if let Some(name_id) = &subject.name_id {
        node = node.with_child(name_id_to_node("saml:NameID", name_id));
    }
    node.with_children(subject.subject_confirmations.iter().map(|confirmation| {
        let mut c = XmlNode::new("saml:SubjectConfirmation").with_attr("Method", &confirmation.method);
        if let Some(data) = &confirmation.subject_confirmation_data {
            c = c.with_child(
                XmlNode::new("saml:SubjectConfirmationData")
                    .with_opt_attr("NotBefore", data.not_before.map(format_instant))
                    .with_opt_attr("NotOnOrAfter", data.not_on_or_after.map(format_instant))
                    .with_opt_attr("Recipient", data.recipient.as_deref())
                    .with_opt_attr("InResponseTo", data.in_response_to.as_deref()),
            );
        }
        c
    }))
}

fn subject_from_node(node: &XmlNode) -> SamlResult<Subject> {
    let subject_confirmations = node
        .children_named("SubjectConfirmation")
        .map(|c| {
            let data = c
                .child("SubjectConfirmationData")
                .map(|d| -> SamlResult<_> {
                    Ok(SubjectConfirmationData {
                        in_response_to: d.attr("InResponseTo").map(str::to_string),
                        not_on_or_after: instant_attr(d, "NotOnOrAfter")?,
                        not_before: instant_attr(d, "NotBefore")?,
                        recipient: d.attr("Recipient").map(str::to_string),
                    })
                })
                .transpose()?;
            Ok(SubjectConfirmation {
                method: c.attr("Method").unwrap_or_default().to_string(),
                subject_confirmation_data: data,
            })
        })
        .collect::<SamlResult<_>>()?;

    Ok(Subject {
        name_id: node.child("NameID").map(name_id_from_node),
        subject_confirmations,
    })
}

fn conditions_to_node(conditions: &Conditions) -> XmlNode {
    XmlNode::new("saml:Conditions")
        .with_opt_attr("NotBefore", conditions.not_before.map(format_instant))
        .with_opt_attr("NotOnOrAfter", conditions.not_on_or_after.map(format_instant))
        .with_children(conditions.audience_restrictions.iter().map(|restriction| {
            XmlNode::new("saml:AudienceRestriction").with_children(
                restriction
                    .audiences
                    .iter()
                    .map(|a| XmlNode::new("saml:Audience").with_text(a)),
            )
        }))
}

fn conditions_from_node(node: &XmlNode) -> SamlResult<Conditions> {
    Ok(Conditions {
        not_before: instant_attr(node, "NotBefore")?,
        not_on_or_after: instant_attr(node, "NotOnOrAfter")?,
        audience_restrictions: node
            .children_named("AudienceRestriction")
            .map(|r| AudienceRestriction {
                audiences: r
                    .children_named("Audience")
                    .filter_map(|a| a.text.clone())
                    .collect(),
            })
            .collect(),
    })
}

fn authn_statement_to_node(statement: &AuthnStatement) -> XmlNode {
    let mut context = XmlNode::new("saml:AuthnContext");
    if let Some(class_ref) = &statement.authn_context.authn_context_class_ref {
        context = context.with_child(XmlNode::new("saml:AuthnContextClassRef").with_text(class_ref));
    }
    XmlNode::new("saml:AuthnStatement")
        .with_attr("AuthnInstant", format_instant(statement.authn_instant))
        .with_child(context)
}

fn authn_statement_from_node(node: &XmlNode) -> SamlResult<AuthnStatement> {
    let authn_instant = instant_attr(node, "AuthnInstant")?
        .ok_or_else(|| SamlError::MissingElement("AuthnStatement/@AuthnInstant".to_string()))?;
    Ok(AuthnStatement {
        authn_instant,
        authn_context: AuthnContext {
            authn_context_class_ref: node
                .child("AuthnContext")
                .and_then(|c| c.child_text("AuthnContextClassRef"))
                .map(str::to_string),
        },
    })
}

fn attribute_statement_to_node(statement: &AttributeStatement) -> XmlNode {
    XmlNode::new("saml:AttributeStatement").with_children(statement.attributes.iter().map(|attribute| {
        XmlNode::new("saml:Attribute")
            .with_attr("Name", &attribute.name)
            .with_opt_attr("NameFormat", attribute.name_format.as_deref())
            .with_opt_attr("FriendlyName", attribute.friendly_name.as_deref())
            .with_children(attribute.values.iter().map(|value| {
                XmlNode::new("saml:AttributeValue")
                    .with_opt_attr("xsi:type", value.xsi_type.as_deref())
                    .with_opt_attr("xml:lang", value.language.as_deref())
                    .with_text(&value.value)
            }))
    }))
}

fn attribute_statement_from_node(node: &XmlNode) -> AttributeStatement {
    AttributeStatement {
        attributes: node
            .children_named("Attribute")
            .map(|a| Attribute {
                name: a.attr("Name").unwrap_or_default().to_string(),
                name_format: a.attr("NameFormat").map(str::to_string),
                friendly_name: a.attr("FriendlyName").map(str::to_string),
                values: a
                    .children_named("AttributeValue")
                    .map(|v| AttributeValue {
                        value: v.text.clone().unwrap_or_default(),
                        xsi_type: v.attr("xsi:type").map(str::to_string),
                        language: v.attr("xml:lang").map(str::to_string),
                    })
                    .collect(),
            })
            .collect(),
    }
}

// ============================================================================
// Encrypted assertion
// ============================================================================

/// Marshals an encrypted assertion.
#[must_use]
pub fn encrypted_assertion_to_node(encrypted: &EncryptedAssertion) -> XmlNode {
    let data = &encrypted.encrypted_data;
    let mut encrypted_data = XmlNode::new("xenc:EncryptedData")
        .with_attr("xmlns:xenc", XMLENC_NS)
        .with_attr("Type", ENCRYPTED_ELEMENT_TYPE);
    if let Some(method) = &data.encryption_method {
        encrypted_data = encrypted_data
            .with_child(XmlNode::new("xenc:EncryptionMethod").with_attr("Algorithm", method));
    }
    if let Some(key) = data.key_info.as_ref().and_then(|k| k.encrypted_key.as_ref()) {
        let mut encrypted_key =
            XmlNode::new("xenc:EncryptedKey").with_opt_attr("Recipient", key.recipient.as_deref());
        if let Some(method) = &key.encryption_method {
            encrypted_key = encrypted_key
                .with_child(XmlNode::new("xenc:EncryptionMethod").with_attr("Algorithm", method));
        }
        encrypted_data = encrypted_data.with_child(
            XmlNode::new("ds:KeyInfo")
                .with_attr("xmlns:ds", XMLDSIG_NS)
                .with_child(encrypted_key.with_child(cipher_data_to_node(&key.cipher_data))),
        );
    }

    XmlNode::new("saml:EncryptedAssertion")
        .with_attr("xmlns:saml", SAML_NS)
        .with_child(encrypted_data.with_child(cipher_data_to_node(&data.cipher_data)))
}

/// Unmarshals an encrypted assertion.
///
/// # Errors
///
/// Fails if `EncryptedData` or a `CipherValue` is missing.
pub fn encrypted_assertion_from_node(node: &XmlNode) -> SamlResult<EncryptedAssertion> {
    expect_element(node, "EncryptedAssertion")?;
    let data = node
        .child("EncryptedData")
        .ok_or_else(|| SamlError::MissingElement("EncryptedData".to_string()))?;

    let encrypted_key = data
        .child("KeyInfo")
        .and_then(|k| k.child("EncryptedKey"))
        .map(|key| -> SamlResult<_> {
            Ok(EncryptedKey {
                encryption_method: algorithm_of(key),
                recipient: key.attr("Recipient").map(str::to_string),
                cipher_data: cipher_data_from_node(key)?,
            })
        })
        .transpose()?;

    Ok(EncryptedAssertion {
        encrypted_data: EncryptedData {
            encryption_method: algorithm_of(data),
            key_info: encrypted_key.map(|k| KeyInfo { encrypted_key: Some(k) }),
            cipher_data: cipher_data_from_node(data)?,
        },
    })
}

fn algorithm_of(node: &XmlNode) -> Option<String> {
    node.child("EncryptionMethod")
        .and_then(|m| m.attr("Algorithm"))
        .map(str::to_string)
}

fn cipher_data_to_node(cipher: &CipherData) -> XmlNode {
    XmlNode::new("xenc:CipherData")
        .with_child(XmlNode::new("xenc:CipherValue").with_text(&cipher.cipher_value))
}

fn cipher_data_from_node(parent: &XmlNode) -> SamlResult<CipherData> {
    parent
        .child("CipherData")
        .and_then(|c| c.child_text("CipherValue"))
        .map(|v| CipherData {
            cipher_value: v.to_string(),
        })
        .ok_or_else(|| SamlError::MissingElement("CipherData/CipherValue".to_string()))
}

// ============================================================================
// Helpers
// ============================================================================

/// Wire format of SAML timestamps.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn instant_attr(node: &XmlNode, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    node.attr(name)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SamlError::XmlParse(format!("invalid {name} {raw:?}: {e}")))
        })
        .transpose()
}

fn expect_element(node: &XmlNode, local_name: &str) -> SamlResult<()> {
    if node.local_name() == local_name {
        Ok(())
    } else {
        Err(SamlError::MissingElement(format!(
            "expected {local_name}, found {}",
            node.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::{
        attribute_names, attribute_types, hub_status_codes, status_codes, LevelOfAssurance,
    };
    use crate::xml;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn assertion() -> Assertion {
        Assertion::with_id("_a1", "https://idp.test")
            .with_issue_instant(instant())
            .with_subject(
                Subject::new(NameId::persistent("pid-1")).with_confirmation(
                    SubjectConfirmation::bearer().with_data(SubjectConfirmationData::for_request(
                        "req-1",
                        "https://hub.test/acs",
                        instant(),
                        Duration::minutes(5),
                    )),
                ),
            )
            .with_conditions(Conditions::valid_for(instant(), Duration::minutes(5)).with_audience("https://hub.test"))
            .with_authn_statement(AuthnStatement::new(LevelOfAssurance::Level2, instant()))
            .with_attribute_statement(AttributeStatement::new().with_attribute(Attribute::single(
                attribute_names::FIRSTNAME,
                AttributeValue::typed("Jane", attribute_types::PERSON_NAME).with_language("en-GB"),
            )))
    }

    #[test]
    fn assertion_survives_serialization() {
        let node = assertion_to_node(&assertion());
        let parsed = xml::parse(&node.to_xml()).unwrap();

        assert_eq!(parsed, node);
        assert_eq!(assertion_from_node(&parsed).unwrap(), assertion());
    }

    #[test]
    fn response_keeps_nested_status_and_detail() {
        let mut response = Response::success("https://idp.test")
            .in_response_to("req-1")
            .with_issue_instant(instant());
        response.status = Status::new(
            StatusCode::responder().with_sub_status(StatusCode::new(hub_status_codes::NO_MATCH)),
        )
        .with_message("no record")
        .with_detail("LOA-pending");

        let parsed = response_from_node(&xml::parse(&response_to_node(&response).to_xml()).unwrap()).unwrap();

        assert_eq!(parsed.status, response.status);
        assert_eq!(parsed.in_response_to.as_deref(), Some("req-1"));
        assert_eq!(parsed.issue_instant, Some(instant()));
    }

    #[test]
    fn three_level_status_is_preserved() {
        let node = xml::parse(
            r#"<samlp:Status><samlp:StatusCode Value="a"><samlp:StatusCode Value="b"><samlp:StatusCode Value="c"/></samlp:StatusCode></samlp:StatusCode></samlp:Status>"#,
        )
        .unwrap();
        assert_eq!(status_from_node(&node).unwrap().status_code.depth(), 3);
    }

    #[test]
    fn status_nesting_stops_one_level_past_the_limit() {
        let depth = 40;
        let xml = format!(
            r#"<samlp:Status>{}{}</samlp:Status>"#,
            r#"<samlp:StatusCode Value="a">"#.repeat(depth),
            "</samlp:StatusCode>".repeat(depth)
        );
        let node = xml::parse(&xml).unwrap();
        assert!(matches!(status_from_node(&node), Err(SamlError::NestedStatusTooDeep)));

        let four = xml::parse(
            r#"<samlp:Status><samlp:StatusCode Value="a"><samlp:StatusCode Value="b"><samlp:StatusCode Value="c"><samlp:StatusCode Value="d"/></samlp:StatusCode></samlp:StatusCode></samlp:StatusCode></samlp:Status>"#,
        )
        .unwrap();
        assert!(matches!(status_from_node(&four), Err(SamlError::NestedStatusTooDeep)));
    }

    #[test]
    fn missing_id_is_left_for_the_validators() {
        let node = xml::parse(&format!(
            r#"<saml:Assertion Version="2.0"><saml:Issuer>idp</saml:Issuer></saml:Assertion>"#
        ))
        .unwrap();
        let parsed = assertion_from_node(&node).unwrap();
        assert!(parsed.id.is_empty());
        assert!(parsed.issue_instant.is_none());
    }

    #[test]
    fn response_without_status_is_rejected() {
        let node = xml::parse(r#"<samlp:Response ID="_r"/>"#).unwrap();
        assert!(matches!(
            response_from_node(&node),
            Err(SamlError::MissingStatus { .. })
        ));
    }

    #[test]
    fn malformed_instant_is_rejected() {
        let node = xml::parse(r#"<saml:Assertion ID="_a" IssueInstant="yesterday"/>"#).unwrap();
        assert!(matches!(assertion_from_node(&node), Err(SamlError::XmlParse(_))));
    }

    #[test]
    fn wrong_root_element_is_rejected() {
        let node = xml::parse("<samlp:AuthnRequest/>").unwrap();
        assert!(response_from_node(&node).is_err());
    }

    #[test]
    fn timestamps_use_millisecond_utc() {
        assert_eq!(format_instant(instant()), "2026-03-01T12:00:00.000Z");
        let status = Status::new(StatusCode::new(status_codes::SUCCESS));
        assert_eq!(
            status_to_node(&status).to_xml(),
            format!(r#"<samlp:Status><samlp:StatusCode Value="{}"></samlp:StatusCode></samlp:Status>"#, status_codes::SUCCESS)
        );
    }
}
