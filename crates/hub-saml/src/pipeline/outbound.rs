//! Sign-then-encrypt pipeline for messages the hub sends.
//!
//! Stage order:
//!
//! 1. attach an unsigned signature placeholder to the envelope
//! 2. sign each embedded assertion
//! 3. encrypt each signed assertion for the recipient
//! 4. sign the envelope, over the assertion ciphertext
//! 5. serialize for the HTTP-POST binding
//!
//! Each stage's output is a distinct type that only the next stage
//! accepts.

use std::sync::Arc;

use hub_crypto::RecipientKey;

use super::Stage;
use crate::bindings::post;
use crate::codec;
use crate::domain::OutboundResponseFromHub;
use crate::encryption::AssertionEncrypter;
use crate::error::SamlResult;
use crate::signature::{attach_placeholder, XmlSigner};
use crate::status_codec::StatusCodec;
use crate::types::Response;
use crate::xml::XmlNode;

// ============================================================================
// Stage inputs and outputs
// ============================================================================

/// An unsigned envelope with plaintext assertions, and who it is for.
#[derive(Debug, Clone)]
pub struct OutboundEnvelope<'r> {
    node: XmlNode,
    recipient: &'r RecipientKey,
}

impl<'r> OutboundEnvelope<'r> {
    /// Wraps a marshalled message for `recipient`.
    #[must_use]
    pub fn new(node: XmlNode, recipient: &'r RecipientKey) -> Self {
        Self { node, recipient }
    }

    /// The envelope element.
    #[must_use]
    pub fn node(&self) -> &XmlNode {
        &self.node
    }
}

/// Envelope carrying its signature placeholder.
#[derive(Debug, Clone)]
pub struct PlaceholderAttached<'r>(OutboundEnvelope<'r>);

/// Envelope whose assertions are signed.
#[derive(Debug, Clone)]
pub struct AssertionsSigned<'r>(OutboundEnvelope<'r>);

/// Envelope whose assertions are encrypted.
#[derive(Debug, Clone)]
pub struct AssertionsEncrypted(XmlNode);

/// Signed envelope, ready to serialize.
#[derive(Debug, Clone)]
pub struct EnvelopeSigned(XmlNode);

impl EnvelopeSigned {
    /// The signed envelope element.
    #[must_use]
    pub fn node(&self) -> &XmlNode {
        &self.0
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Stage 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachSignaturePlaceholder;

impl<'r> Stage<OutboundEnvelope<'r>> for AttachSignaturePlaceholder {
    type Out = PlaceholderAttached<'r>;

    fn name(&self) -> &'static str {
        "attach_signature_placeholder"
    }

    fn apply(&self, mut envelope: OutboundEnvelope<'r>) -> SamlResult<Self::Out> {
        attach_placeholder(&mut envelope.node);
        Ok(PlaceholderAttached(envelope))
    }
}

/// Stage 2.
pub struct SignAssertions<'s> {
    signer: &'s dyn XmlSigner,
}

impl<'s> SignAssertions<'s> {
    /// Signs with `signer`.
    #[must_use]
    pub fn new(signer: &'s dyn XmlSigner) -> Self {
        Self { signer }
    }
}

impl<'r> Stage<PlaceholderAttached<'r>> for SignAssertions<'_> {
    type Out = AssertionsSigned<'r>;

    fn name(&self) -> &'static str {
        "sign_assertions"
    }

    fn apply(&self, PlaceholderAttached(mut envelope): PlaceholderAttached<'r>) -> SamlResult<Self::Out> {
        map_assertions(&mut envelope.node, |assertion| self.signer.sign(assertion))?;
        Ok(AssertionsSigned(envelope))
    }
}

/// Stage 3.
pub struct EncryptAssertions<'e> {
    encrypter: &'e dyn AssertionEncrypter,
}

impl<'e> EncryptAssertions<'e> {
    /// Encrypts with `encrypter`.
    #[must_use]
    pub fn new(encrypter: &'e dyn AssertionEncrypter) -> Self {
        Self { encrypter }
    }
}

impl<'r> Stage<AssertionsSigned<'r>> for EncryptAssertions<'_> {
    type Out = AssertionsEncrypted;

    fn name(&self) -> &'static str {
        "encrypt_assertions"
    }

    fn apply(&self, AssertionsSigned(mut envelope): AssertionsSigned<'r>) -> SamlResult<Self::Out> {
        let recipient = envelope.recipient;
        map_assertions(&mut envelope.node, |assertion| {
            self.encrypter.encrypt(&assertion, recipient)
        })?;
        Ok(AssertionsEncrypted(envelope.node))
    }
}

/// Stage 4.
pub struct SignEnvelope<'s> {
    signer: &'s dyn XmlSigner,
}

impl<'s> SignEnvelope<'s> {
    /// Signs with `signer`.
    #[must_use]
    pub fn new(signer: &'s dyn XmlSigner) -> Self {
        Self { signer }
    }
}

impl Stage<AssertionsEncrypted> for SignEnvelope<'_> {
    type Out = EnvelopeSigned;

    fn name(&self) -> &'static str {
        "sign_envelope"
    }

    fn apply(&self, AssertionsEncrypted(node): AssertionsEncrypted) -> SamlResult<Self::Out> {
        Ok(EnvelopeSigned(self.signer.sign(node)?))
    }
}

/// Stage 5.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeForPost;

impl Stage<EnvelopeSigned> for SerializeForPost {
    type Out = Vec<u8>;

    fn name(&self) -> &'static str {
        "serialize"
    }

    fn apply(&self, EnvelopeSigned(node): EnvelopeSigned) -> SamlResult<Self::Out> {
        Ok(post::serialize(&node))
    }
}

/// Replaces every direct `Assertion` child of `node` with `f(child)`.
fn map_assertions<F>(node: &mut XmlNode, mut f: F) -> SamlResult<()>
where
    F: FnMut(XmlNode) -> SamlResult<XmlNode>,
{
    let children = std::mem::take(&mut node.children);
    node.children = children
        .into_iter()
        .map(|child| if child.local_name() == "Assertion" { f(child) } else { Ok(child) })
        .collect::<SamlResult<_>>()?;
    Ok(())
}

// ============================================================================
// Pipeline
// ============================================================================

/// Builds wire messages from hub domain objects.
#[derive(Clone)]
pub struct SigningEncryptionPipeline {
    signer: Arc<dyn XmlSigner>,
    encrypter: Arc<dyn AssertionEncrypter>,
}

impl SigningEncryptionPipeline {
    /// Creates a pipeline signing with `signer` and encrypting with
    /// `encrypter`.
    #[must_use]
    pub fn new(signer: Arc<dyn XmlSigner>, encrypter: Arc<dyn AssertionEncrypter>) -> Self {
        Self { signer, encrypter }
    }

    /// Runs the five stages over a marshalled envelope.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure.
    pub fn transform(&self, envelope: XmlNode, recipient: &RecipientKey) -> SamlResult<Vec<u8>> {
        let id = envelope.attr("ID").unwrap_or_default().to_string();
        let pipeline = AttachSignaturePlaceholder
            .then(SignAssertions::new(self.signer.as_ref()))
            .then(EncryptAssertions::new(self.encrypter.as_ref()))
            .then(SignEnvelope::new(self.signer.as_ref()))
            .then(SerializeForPost);

        let bytes = pipeline.apply(OutboundEnvelope::new(envelope, recipient))?;
        tracing::debug!(message_id = %id, recipient = recipient.name(), "Outbound message built");
        Ok(bytes)
    }

    /// Encodes the status, marshals the response and runs
    /// [`Self::transform`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::SamlError::UnrecognizedStatus`] if the status is
    /// outside the response kind's vocabulary, or the first stage failure.
    pub fn build_outbound_message(
        &self,
        response: &OutboundResponseFromHub,
        recipient: &RecipientKey,
    ) -> SamlResult<Vec<u8>> {
        let status = StatusCodec::new(response.kind)
            .encode(response.status, response.status_message.as_deref())?;

        let mut wire = Response::new(&response.issuer, status)
            .in_response_to(&response.in_response_to)
            .with_destination(&response.destination)
            .with_issue_instant(response.issue_instant);
        wire.id.clone_from(&response.response_id);
        wire.assertions.clone_from(&response.assertions);

        self.transform(codec::response_to_node(&wire), recipient)
    }
}

impl std::fmt::Debug for SigningEncryptionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningEncryptionPipeline").finish_non_exhaustive()
    }
}
