//! Validation of inbound responses and the assertions they carry.
//!
//! [`ResponseValidator`] checks the envelope and then routes decrypted
//! assertions to [`AssertionValidator`], which owns the replay checks.
//! Each check fails with the most specific [`SamlError`] variant.

mod assertion;
mod attributes;
mod response;
mod subject;

pub use assertion::*;
pub use attributes::*;
pub use response::*;
pub use subject::*;

use crate::error::{SamlError, SamlResult};
use crate::types::{Issuer, NameIdFormat};

/// What an inbound response must answer, taken from the hub's own request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// ID of the request the response answers.
    pub request_id: String,
    /// Expected bearer confirmation recipient (the hub's consumer endpoint).
    pub expected_recipient: String,
    /// Expected `Destination`, when one is enforced.
    pub expected_destination: Option<String>,
}

impl RequestContext {
    /// Context for a response to `request_id` delivered at `expected_recipient`.
    #[must_use]
    pub fn new(request_id: impl Into<String>, expected_recipient: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            expected_recipient: expected_recipient.into(),
            expected_destination: None,
        }
    }

    /// Also requires the response `Destination` to equal `destination`.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.expected_destination = Some(destination.into());
        self
    }
}

/// Checks an issuer is present, non-empty and, if it declares a format,
/// uses the entity format.
pub(crate) fn validate_issuer(id: &str, issuer: Option<&Issuer>) -> SamlResult<()> {
    let issuer = issuer.ok_or_else(|| SamlError::MissingIssuer { id: id.to_string() })?;
    if issuer.value.trim().is_empty() {
        return Err(SamlError::EmptyIssuer { id: id.to_string() });
    }
    match issuer.format.as_deref() {
        Some(format) if format != NameIdFormat::Entity.uri() => Err(SamlError::IllegalIssuerFormat {
            id: id.to_string(),
            format: format.to_string(),
        }),
        _ => Ok(()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_checks() {
        assert!(matches!(validate_issuer("_r", None), Err(SamlError::MissingIssuer { .. })));
        assert!(matches!(
            validate_issuer("_r", Some(&Issuer::new(" "))),
            Err(SamlError::EmptyIssuer { .. })
        ));
        assert!(matches!(
            validate_issuer("_r", Some(&Issuer::persistent("idp"))),
            Err(SamlError::IllegalIssuerFormat { .. })
        ));
        assert!(validate_issuer("_r", Some(&Issuer::new("idp"))).is_ok());
        assert!(validate_issuer("_r", Some(&Issuer::entity("idp"))).is_ok());
    }

    #[test]
    fn destination_is_optional() {
        let context = RequestContext::new("req", "https://hub/acs");
        assert!(context.expected_destination.is_none());
        assert_eq!(
            context.with_destination("https://hub/sso").expected_destination.as_deref(),
            Some("https://hub/sso")
        );
    }
}
