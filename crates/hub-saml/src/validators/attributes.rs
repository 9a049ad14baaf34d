//! Attribute statement checks: the matching dataset dictionary, person
//! name language, the principal IP address and fraud events.

use std::net::IpAddr;

use crate::error::{SamlError, SamlResult};
use crate::types::{
    attribute_name_formats, attribute_names, attribute_types, Assertion, Attribute,
    LevelOfAssurance, PERSON_NAME_LANGUAGE,
};

/// Matching dataset attributes and the value type each must declare.
pub const MATCHING_DATASET_ATTRIBUTES: &[(&str, &str)] = &[
    (attribute_names::FIRSTNAME, attribute_types::PERSON_NAME),
    (attribute_names::MIDDLENAME, attribute_types::PERSON_NAME),
    (attribute_names::SURNAME, attribute_types::PERSON_NAME),
    (attribute_names::GENDER, attribute_types::GENDER),
    (attribute_names::DATE_OF_BIRTH, attribute_types::DATE),
    (attribute_names::CURRENT_ADDRESS, attribute_types::ADDRESS),
    (attribute_names::PREVIOUS_ADDRESS, attribute_types::ADDRESS),
];

fn expected_type(name: &str) -> Option<&'static str> {
    MATCHING_DATASET_ATTRIBUTES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, value_type)| *value_type)
}

/// Validates the single attribute statement of a matching dataset
/// assertion against [`MATCHING_DATASET_ATTRIBUTES`].
///
/// Types must match exactly; a recognised name with a different but
/// otherwise valid type is still a failure.
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_matching_dataset_statement(assertion: &Assertion) -> SamlResult<()> {
    let id = || assertion.id.clone();
    let statement = match assertion.attribute_statements.as_slice() {
        [] => return Err(SamlError::MdsStatementMissing { id: id() }),
        [statement] => statement,
        _ => return Err(SamlError::MdsMultipleStatements { id: id() }),
    };
    if statement.attributes.is_empty() {
        return Err(SamlError::AttributeStatementEmpty { id: id() });
    }

    statement.attributes.iter().try_for_each(validate_matching_dataset_attribute)
}

fn validate_matching_dataset_attribute(attribute: &Attribute) -> SamlResult<()> {
    let expected = expected_type(&attribute.name).ok_or_else(|| SamlError::AttributeNotRecognised {
        name: attribute.name.clone(),
    })?;

    if let Some(format) = attribute
        .name_format
        .as_deref()
        .filter(|f| *f != attribute_name_formats::UNSPECIFIED)
    {
        tracing::warn!(attribute = %attribute.name, name_format = format, "Unexpected attribute name format");
    }

    if attribute.values.is_empty() {
        return Err(SamlError::EmptyAttributeValue {
            name: attribute.name.clone(),
        });
    }
    for value in &attribute.values {
        let actual = value.type_local_name().unwrap_or_default();
        if actual != expected {
            return Err(SamlError::AttributeWrongType {
                name: attribute.name.clone(),
                expected,
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}

/// Person name values that declare a language must declare `en-GB`.
///
/// # Errors
///
/// Returns [`SamlError::InvalidAttributeLanguage`] for the first offending
/// value.
pub fn validate_attribute_language(assertion: &Assertion) -> SamlResult<()> {
    let person_names = assertion
        .attribute_statements
        .iter()
        .flat_map(|s| s.attributes.iter())
        .filter(|a| expected_type(&a.name) == Some(attribute_types::PERSON_NAME));

    for attribute in person_names {
        if let Some(language) = attribute
            .values
            .iter()
            .filter_map(|v| v.language.as_deref())
            .find(|l| *l != PERSON_NAME_LANGUAGE)
        {
            return Err(SamlError::InvalidAttributeLanguage {
                name: attribute.name.clone(),
                language: language.to_string(),
            });
        }
    }
    Ok(())
}

/// The authn assertion must carry a non-empty principal IP address.
///
/// The address format is not enforced; an unparseable value is logged and
/// accepted.
///
/// # Errors
///
/// Returns [`SamlError::MissingIpAddress`] or [`SamlError::EmptyIpAddress`].
pub fn validate_ip_address(assertion: &Assertion) -> SamlResult<()> {
    if assertion.attribute(attribute_names::IP_ADDRESS).is_none() {
        return Err(SamlError::MissingIpAddress {
            id: assertion.id.clone(),
        });
    }
    let value = assertion
        .principal_ip_address()
        .ok_or_else(|| SamlError::EmptyIpAddress {
            id: assertion.id.clone(),
        })?;

    if value.parse::<IpAddr>().is_err() {
        tracing::warn!(assertion_id = %assertion.id, ip_address = value, "Principal IP address is not a valid address");
    }
    Ok(())
}

/// Validates the fraud event carried by a `LEVEL_X` assertion.
///
/// Such an assertion must have exactly one attribute statement holding an
/// `IdpFraudEventId` attribute of the fraud event type. Outside `LEVEL_X`,
/// a fraud event attribute that is present must still have that type.
///
/// # Errors
///
/// Returns [`SamlError::InvalidFraudAttribute`] naming the violated part.
pub fn validate_fraud_event(assertion: &Assertion) -> SamlResult<()> {
    let is_fraud_response = assertion.level_of_assurance() == Some(LevelOfAssurance::LevelX);

    if is_fraud_response && assertion.attribute_statements.len() != 1 {
        return Err(SamlError::InvalidFraudAttribute(
            "Invalid number of fraud event attribute statements".to_string(),
        ));
    }

    let Some(fraud_event) = assertion.attribute(attribute_names::FRAUD_EVENT_ID) else {
        return if is_fraud_response {
            Err(SamlError::InvalidFraudAttribute("Invalid fraud event name".to_string()))
        } else {
            Ok(())
        };
    };

    let well_typed = !fraud_event.values.is_empty()
        && fraud_event
            .values
            .iter()
            .all(|v| v.type_local_name() == Some(attribute_types::FRAUD_EVENT_ID));
    if well_typed {
        Ok(())
    } else {
        Err(SamlError::InvalidFraudAttribute("Invalid fraud event type".to_string()))
    }
}
