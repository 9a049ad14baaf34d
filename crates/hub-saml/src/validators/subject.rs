//! Subject and bearer subject-confirmation checks.

use chrono::{DateTime, Utc};

use super::RequestContext;
use crate::error::{SamlError, SamlResult};
use crate::types::{Assertion, SubjectConfirmation};

/// Validates the subject of `assertion`.
///
/// A subject must exist and carry at least one bearer confirmation; every
/// bearer confirmation must then pass
/// [`validate_bearer_confirmation`].
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_subject(
    assertion: &Assertion,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> SamlResult<()> {
    let id = assertion.id.as_str();
    if assertion.subject.is_none() {
        return Err(SamlError::MissingSubject { id: id.to_string() });
    }

    let mut bearers = assertion.bearer_confirmations().peekable();
    if bearers.peek().is_none() {
        return Err(SamlError::NoBearerSubjectConfirmation { id: id.to_string() });
    }
    bearers.try_for_each(|confirmation| validate_bearer_confirmation(id, confirmation, context, now))
}

/// Validates one bearer confirmation against the request context.
///
/// The confirmation window is `[NotBefore, NotOnOrAfter)`.
///
/// # Errors
///
/// Returns the first failing check, in the order: data present,
/// `InResponseTo`, `Recipient`, `NotOnOrAfter`, `NotBefore`.
pub fn validate_bearer_confirmation(
    assertion_id: &str,
    confirmation: &SubjectConfirmation,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> SamlResult<()> {
    let id = || assertion_id.to_string();
    let data = confirmation
        .subject_confirmation_data
        .as_ref()
        .ok_or_else(|| SamlError::MissingSubjectConfirmationData { id: id() })?;

    // InResponseTo
    let in_response_to = data
        .in_response_to
        .as_deref()
        .ok_or_else(|| SamlError::MissingBearerInResponseTo { id: id() })?;
    if in_response_to != context.request_id {
        return Err(SamlError::MismatchedInResponseTo {
            expected: context.request_id.clone(),
            actual: in_response_to.to_string(),
        });
    }

    // Recipient
    let recipient = data
        .recipient
        .as_deref()
        .ok_or_else(|| SamlError::MissingBearerRecipient { id: id() })?;
    if recipient != context.expected_recipient {
        return Err(SamlError::IncorrectRecipient {
            expected: context.expected_recipient.clone(),
            actual: recipient.to_string(),
        });
    }

    // Validity window
    let not_on_or_after = data
        .not_on_or_after
        .ok_or_else(|| SamlError::MissingNotOnOrAfter { id: id() })?;
    if now >= not_on_or_after {
        return Err(SamlError::ExceededNotOnOrAfter { not_on_or_after });
    }
    if let Some(not_before) = data.not_before {
        if now < not_before {
            return Err(SamlError::NotYetValid { not_before });
        }
    }

    Ok(())
}
