//! XML Signature creation.

use std::sync::Arc;

use base64::Engine;
use hub_crypto::{hash::hash, SignatureProvider};

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlNode;

use super::{digest_input, insert_after_issuer, XmlSignature};

/// Signs an element in place of (or in addition to) its signature placeholder.
pub trait XmlSigner: Send + Sync {
    /// Signs `node`, referencing its `ID` attribute.
    ///
    /// An existing `Signature` child is replaced where it stands; otherwise
    /// the signature is inserted after `Issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if the element has no ID or
    /// the key fails to sign.
    fn sign(&self, node: XmlNode) -> SamlResult<XmlNode>;
}

/// Enveloped XML-DSig signer backed by a [`SignatureProvider`].
#[derive(Clone)]
pub struct EnvelopedSigner {
    provider: Arc<dyn SignatureProvider>,
}

impl EnvelopedSigner {
    /// Creates a signer for the given key.
    pub fn new(provider: Arc<dyn SignatureProvider>) -> Self {
        Self { provider }
    }
}

impl std::fmt::Debug for EnvelopedSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopedSigner")
            .field("key_id", &self.provider.key_id())
            .finish()
    }
}

impl XmlSigner for EnvelopedSigner {
    fn sign(&self, mut node: XmlNode) -> SamlResult<XmlNode> {
        let reference_id = node
            .attr("ID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SamlError::SignatureCreation(format!("{} has no ID to reference", node.local_name()))
            })?
            .to_string();

        let algorithm = self.provider.algorithm();
        let digest = hash(algorithm.hash_algorithm(), digest_input(&node).as_bytes());

        let mut signature = XmlSignature::placeholder(&reference_id);
        signature.algorithm = Some(algorithm.xml_dsig_uri().to_string());
        signature.digest_algorithm = Some(algorithm.hash_algorithm().xml_dsig_uri().to_string());
        signature.digest_value = Some(base64::engine::general_purpose::STANDARD.encode(&digest));
        signature.key_name = Some(self.provider.key_id().to_string());

        let signed_info = signature.signed_info_node().to_xml();
        let value = self.provider.sign(signed_info.as_bytes())?;
        signature.signature_value = Some(base64::engine::general_purpose::STANDARD.encode(&value));

        let signature_node = signature.to_node();
        match node.position("Signature") {
            Some(index) => node.children[index] = signature_node,
            None => insert_after_issuer(&mut node, signature_node),
        }

        tracing::debug!(reference_id = %reference_id, element = node.local_name(), "Signed element");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::attach_placeholder;
    use hub_crypto::EcdsaSigningKey;

    fn signer() -> EnvelopedSigner {
        EnvelopedSigner::new(Arc::new(EcdsaSigningKey::generate().unwrap()))
    }

    fn element() -> XmlNode {
        XmlNode::new("samlp:Response")
            .with_attr("ID", "_r1")
            .with_child(XmlNode::new("saml:Issuer").with_text("https://hub.test"))
            .with_child(XmlNode::new("samlp:Status"))
    }

    #[test]
    fn signature_is_inserted_after_issuer() {
        let signed = signer().sign(element()).unwrap();

        assert_eq!(signed.children[1].local_name(), "Signature");
        let signature = XmlSignature::from_node(&signed.children[1]);
        assert!(signature.is_signed());
        assert_eq!(signature.reference_id(), Some("_r1"));
        assert!(signature.key_name.is_some());
    }

    #[test]
    fn placeholder_is_replaced_in_place() {
        let mut node = element();
        attach_placeholder(&mut node);

        let signed = signer().sign(node).unwrap();
        assert_eq!(signed.children.len(), 3);
        assert!(XmlSignature::from_node(&signed.children[1]).is_signed());
    }

    #[test]
    fn element_without_id_cannot_be_signed() {
        let result = signer().sign(XmlNode::new("saml:Assertion"));
        assert!(matches!(result, Err(SamlError::SignatureCreation(_))));
    }
}
