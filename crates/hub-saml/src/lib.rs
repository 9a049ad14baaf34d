//! SAML validation and transformation core of the federation hub.
//!
//! The hub brokers SAML 2.0 messages between relying parties, identity
//! providers, a matching service and eIDAS country nodes. This crate holds
//! everything between the wire bytes and the hub's domain objects:
//!
//! - **Status codec** - internal status vocabularies per message kind and
//!   their nested wire encoding
//! - **Validators** - envelope and assertion checks, ending in replay
//!   protection
//! - **Pipelines** - decrypt-then-validate for inbound messages,
//!   sign-then-encrypt-then-sign for outbound ones
//! - **Cross-border** - hub-signed carrier assertions for unsigned
//!   country responses
//!
//! # Architecture
//!
//! - [`types`] - Typed SAML model
//! - [`xml`] and [`codec`] - XML node tree and the mapping to and from it
//! - [`signature`] and [`encryption`] - XML-DSig and XML-Enc collaborators
//! - [`status_codec`] - [`StatusCodec`] over per-kind status tables
//! - [`replay`] - [`ReplayGuard`]
//! - [`validators`] - [`ResponseValidator`] and [`AssertionValidator`]
//! - [`pipeline`] - [`DecryptValidationPipeline`] and
//!   [`SigningEncryptionPipeline`]
//! - [`eidas`] - [`CrossBorderAdapter`]
//! - [`error`] - Failure catalog with codes, categories and severities
//!
//! # Example
//!
//! ```rust,ignore
//! use hub_saml::{DecryptValidationPipeline, ReplayGuard};
//!
//! let pipeline = DecryptValidationPipeline::new(&config, replay_guard, verifier, decrypter, blobs);
//! let context = pipeline.request_context("req-1");
//! let inbound = pipeline.process_idp_response(&saml_response, &context)?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod clock;
pub mod codec;
pub mod domain;
pub mod eidas;
pub mod encryption;
pub mod error;
pub mod pipeline;
pub mod replay;
pub mod signature;
pub mod status_codec;
pub mod types;
pub mod validators;
pub mod xml;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::*;
pub use eidas::{CarrierSubject, CrossBorderAdapter};
pub use error::{ErrorCategory, SamlError, SamlResult, Severity, ValidationFailure};
pub use pipeline::{DecryptValidationPipeline, SigningEncryptionPipeline};
pub use replay::{ReplayGuard, ReplayNamespace};
pub use status_codec::{DecodedStatus, InternalStatus, MessageKind, StatusCodec};
pub use types::*;
pub use validators::{AssertionValidator, RequestContext, ResponseValidator};
