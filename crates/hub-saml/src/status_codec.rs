//! Mapping between internal statuses and the wire status tree.
//!
//! Each message kind has its own vocabulary, held as a static table of
//! `(status, top code, sub code, detail)` rows. The codec logic is shared;
//! only the table differs. Rows marked decode-only are wire shapes the hub
//! accepts but never emits, for example the several ways a peer can say
//! "requester error".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::status_codes::{REQUESTER, RESPONDER, SUCCESS};
use crate::types::{hub_status_codes, status_details, sub_status_codes, Status, StatusCode};

/// Deepest status code tree the hub accepts: a top code and one sub-code.
pub const MAX_STATUS_DEPTH: usize = 2;

/// The kind of message a status belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Identity provider authentication response.
    IdentityProvider,
    /// Hub response to a relying party.
    Transaction,
    /// Matching service response.
    MatchingService,
    /// eIDAS country node response.
    Country,
    /// Response restricted to standard SAML codes.
    SimpleProfile,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IdentityProvider => "identity provider",
            Self::Transaction => "transaction",
            Self::MatchingService => "matching service",
            Self::Country => "country",
            Self::SimpleProfile => "simple profile",
        })
    }
}

/// Internal status vocabulary, the union over all message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalStatus {
    /// Plain success.
    Success,
    /// The peer could not authenticate at the requested level.
    NoAuthenticationContext,
    /// The user cancelled at the identity provider.
    AuthenticationCancelled,
    /// The identity provider has not yet reached the requested level.
    AuthenticationPending,
    /// Authentication failed.
    AuthenticationFailed,
    /// Uplift to a higher level of assurance failed.
    UpliftFailed,
    /// The peer rejected the request.
    RequesterError,
    /// The hub found no match.
    NoMatchingServiceMatchFromHub,
    /// The matching service matched the user.
    MatchingServiceMatch,
    /// The matching service found no match.
    NoMatchingServiceMatchFromMatchingService,
    /// The matching service found more than one match.
    MultiMatch,
    /// The matching service answered a health check.
    Healthy,
    /// The matching service created a user account.
    UserAccountCreated,
    /// The matching service failed to create a user account.
    UserAccountCreationFailed,
    /// The country node reported a failure.
    Failure,
}

/// A decoded status, with the peer's free text carried through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedStatus {
    /// The internal status.
    pub status: InternalStatus,
    /// The wire `StatusMessage`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One row of a status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMapping {
    /// Internal status.
    pub status: InternalStatus,
    /// Top-level code.
    pub top: &'static str,
    /// Nested code.
    pub sub: Option<&'static str>,
    /// `StatusDetail` token.
    pub detail: Option<&'static str>,
    /// Accepted on decode, never produced on encode.
    pub decode_only: bool,
}

const fn row(
    status: InternalStatus,
    top: &'static str,
    sub: Option<&'static str>,
    detail: Option<&'static str>,
) -> StatusMapping {
    StatusMapping {
        status,
        top,
        sub,
        detail,
        decode_only: false,
    }
}

const fn alias(status: InternalStatus, top: &'static str, sub: Option<&'static str>) -> StatusMapping {
    StatusMapping {
        status,
        top,
        sub,
        detail: None,
        decode_only: true,
    }
}

// ============================================================================
// Status tables
// ============================================================================

use InternalStatus as S;

static IDENTITY_PROVIDER: &[StatusMapping] = &[
    row(S::Success, SUCCESS, None, None),
    row(S::NoAuthenticationContext, RESPONDER, Some(sub_status_codes::NO_AUTHN_CONTEXT), None),
    row(
        S::AuthenticationCancelled,
        RESPONDER,
        Some(sub_status_codes::NO_AUTHN_CONTEXT),
        Some(status_details::AUTHN_CANCEL),
    ),
    row(
        S::AuthenticationPending,
        RESPONDER,
        Some(sub_status_codes::NO_AUTHN_CONTEXT),
        Some(status_details::LOA_PENDING),
    ),
    row(S::AuthenticationFailed, RESPONDER, Some(sub_status_codes::AUTHN_FAILED), None),
    row(
        S::UpliftFailed,
        RESPONDER,
        Some(sub_status_codes::AUTHN_FAILED),
        Some(status_details::UPLIFT_FAILED),
    ),
    row(S::RequesterError, REQUESTER, None, None),
    alias(S::RequesterError, REQUESTER, Some(REQUESTER)),
    alias(S::RequesterError, REQUESTER, Some(sub_status_codes::REQUEST_DENIED)),
];

static TRANSACTION: &[StatusMapping] = &[
    row(S::Success, SUCCESS, None, None),
    row(S::NoAuthenticationContext, RESPONDER, Some(sub_status_codes::NO_AUTHN_CONTEXT), None),
    row(S::NoMatchingServiceMatchFromHub, SUCCESS, Some(hub_status_codes::NO_MATCH), None),
    row(S::AuthenticationFailed, RESPONDER, Some(sub_status_codes::AUTHN_FAILED), None),
    row(S::RequesterError, REQUESTER, None, None),
    alias(S::RequesterError, REQUESTER, Some(REQUESTER)),
    alias(S::RequesterError, REQUESTER, Some(sub_status_codes::REQUEST_DENIED)),
    alias(S::RequesterError, RESPONDER, Some(REQUESTER)),
];

static MATCHING_SERVICE: &[StatusMapping] = &[
    row(S::MatchingServiceMatch, SUCCESS, Some(hub_status_codes::MATCH), None),
    row(
        S::NoMatchingServiceMatchFromMatchingService,
        RESPONDER,
        Some(hub_status_codes::NO_MATCH),
        None,
    ),
    row(S::MultiMatch, RESPONDER, Some(hub_status_codes::MULTI_MATCH), None),
    row(S::Healthy, SUCCESS, Some(hub_status_codes::HEALTHY), None),
    row(S::UserAccountCreated, SUCCESS, Some(hub_status_codes::CREATED), None),
    row(S::UserAccountCreationFailed, RESPONDER, Some(hub_status_codes::CREATE_FAILURE), None),
    row(S::RequesterError, REQUESTER, None, None),
    alias(S::RequesterError, REQUESTER, Some(REQUESTER)),
    alias(S::RequesterError, REQUESTER, Some(sub_status_codes::REQUEST_DENIED)),
];

static COUNTRY: &[StatusMapping] = &[
    row(S::Success, SUCCESS, None, None),
    row(S::Failure, RESPONDER, Some(sub_status_codes::AUTHN_FAILED), None),
    alias(S::Failure, RESPONDER, Some(sub_status_codes::NO_AUTHN_CONTEXT)),
    alias(S::Failure, RESPONDER, Some(REQUESTER)),
    alias(S::Failure, RESPONDER, Some(sub_status_codes::REQUEST_DENIED)),
    alias(S::Failure, REQUESTER, None),
];

static SIMPLE_PROFILE: &[StatusMapping] = &[
    row(S::Success, SUCCESS, None, None),
    row(S::NoAuthenticationContext, RESPONDER, Some(sub_status_codes::NO_AUTHN_CONTEXT), None),
    row(S::AuthenticationFailed, RESPONDER, Some(sub_status_codes::AUTHN_FAILED), None),
    row(
        S::NoMatchingServiceMatchFromHub,
        RESPONDER,
        Some(sub_status_codes::UNKNOWN_PRINCIPAL),
        None,
    ),
    row(S::RequesterError, REQUESTER, None, None),
    alias(S::RequesterError, REQUESTER, Some(REQUESTER)),
    alias(S::RequesterError, REQUESTER, Some(sub_status_codes::REQUEST_DENIED)),
];

impl MessageKind {
    /// The status table for this kind.
    #[must_use]
    pub const fn table(self) -> &'static [StatusMapping] {
        match self {
            Self::IdentityProvider => IDENTITY_PROVIDER,
            Self::Transaction => TRANSACTION,
            Self::MatchingService => MATCHING_SERVICE,
            Self::Country => COUNTRY,
            Self::SimpleProfile => SIMPLE_PROFILE,
        }
    }

    /// Statuses this kind can encode.
    pub fn vocabulary(self) -> impl Iterator<Item = InternalStatus> {
        self.table()
            .iter()
            .filter(|m| !m.decode_only)
            .map(|m| m.status)
    }
}

/// Status codec for one message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCodec {
    kind: MessageKind,
}

impl StatusCodec {
    /// Codec for `kind`.
    #[must_use]
    pub const fn new(kind: MessageKind) -> Self {
        Self { kind }
    }

    /// The message kind this codec serves.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Encodes `status` with an optional free-text message.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnrecognizedStatus`] if `status` is not in this
    /// kind's vocabulary.
    pub fn encode(&self, status: InternalStatus, message: Option<&str>) -> SamlResult<Status> {
        let mapping = self
            .kind
            .table()
            .iter()
            .find(|m| m.status == status && !m.decode_only)
            .ok_or_else(|| {
                SamlError::UnrecognizedStatus(format!("{status:?} is not a {} status", self.kind))
            })?;

        let mut code = StatusCode::new(mapping.top);
        if let Some(sub) = mapping.sub {
            code = code.with_sub_status(StatusCode::new(sub));
        }

        Ok(Status {
            status_code: code,
            status_message: message.map(str::to_string),
            status_detail: mapping.detail.map(str::to_string),
        })
    }

    /// Decodes a wire status.
    ///
    /// An unrecognised detail token falls back to the row without a detail
    /// for the same codes, with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NestedStatusTooDeep`] for a tree deeper than
    /// [`MAX_STATUS_DEPTH`] and [`SamlError::UnrecognizedStatus`] when no
    /// row matches.
    pub fn decode(&self, status: &Status) -> SamlResult<DecodedStatus> {
        let code = &status.status_code;
        if code.depth() > MAX_STATUS_DEPTH {
            return Err(SamlError::NestedStatusTooDeep);
        }

        let top = code.value.as_str();
        if ![SUCCESS, REQUESTER, RESPONDER].contains(&top) {
            return Err(self.unrecognized(status));
        }

        let sub = code.sub_status_value();
        let detail = status.status_detail.as_deref();
        let table = self.kind.table();
        let lookup = |detail: Option<&str>| {
            table
                .iter()
                .find(|m| m.top == top && m.sub == sub && m.detail == detail)
        };

        let mapping = match (lookup(detail), detail) {
            (Some(mapping), _) => mapping,
            (None, Some(unknown)) => {
                let fallback = lookup(None).ok_or_else(|| self.unrecognized(status))?;
                tracing::warn!(
                    kind = %self.kind,
                    detail = unknown,
                    status = ?fallback.status,
                    "Unrecognised status detail, using generic status"
                );
                fallback
            }
            (None, None) => return Err(self.unrecognized(status)),
        };

        Ok(DecodedStatus {
            status: mapping.status,
            message: status.status_message.clone(),
        })
    }

    fn unrecognized(&self, status: &Status) -> SamlError {
        SamlError::UnrecognizedStatus(format!(
            "{} status {}{}{}",
            self.kind,
            status.status_code.value,
            status
                .status_code
                .sub_status_value()
                .map(|s| format!(" / {s}"))
                .unwrap_or_default(),
            status
                .status_detail
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default(),
        ))
    }
}
