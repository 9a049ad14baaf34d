//! XML Signature validation.

use base64::Engine;
use hub_crypto::{hash::hash, EcdsaVerifyingKey, HashAlgorithm, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlNode;

use super::{digest_input, XmlSignature};

/// Checks the enveloped signature of an element.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `true` only if `node` carries a signature that references
    /// it, whose digest matches, and that verifies under a trusted key.
    fn verify(&self, node: &XmlNode) -> bool;
}

/// XML signature validator.
///
/// Validates enveloped signatures against a set of trusted peer keys.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    trusted_keys: Vec<EcdsaVerifyingKey>,
}

impl XmlSignatureValidator {
    /// Creates a new validator with the given trusted keys.
    #[must_use]
    pub fn new(trusted_keys: Vec<EcdsaVerifyingKey>) -> Self {
        Self { trusted_keys }
    }

    /// Validates the signature of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] describing the first check
    /// that failed.
    pub fn validate(&self, node: &XmlNode) -> SamlResult<XmlSignature> {
        let signature_node = node
            .child("Signature")
            .ok_or_else(|| SamlError::SignatureInvalid("element is not signed".to_string()))?;
        let signature = XmlSignature::from_node(signature_node);

        if !signature.is_signed() {
            return Err(SamlError::SignatureInvalid(
                "signature element has no value".to_string(),
            ));
        }

        // The reference must point at this element, not at some other
        // element smuggled into the document.
        let element_id = node.attr("ID").unwrap_or_default();
        if element_id.is_empty() || signature.reference_id() != Some(element_id) {
            return Err(SamlError::SignatureInvalid(format!(
                "signature reference {:?} does not match element {element_id:?}",
                signature.reference_uri
            )));
        }

        let algorithm = signature
            .algorithm
            .as_deref()
            .and_then(SignatureAlgorithm::from_xml_dsig_uri)
            .ok_or_else(|| {
                SamlError::SignatureInvalid(format!(
                    "unsupported signature method {:?}",
                    signature.algorithm
                ))
            })?;

        self.verify_digest(node, &signature)?;

        let signed_info = signature_node
            .child("SignedInfo")
            .ok_or_else(|| SamlError::SignatureInvalid("missing SignedInfo".to_string()))?
            .to_xml();
        let value = base64::engine::general_purpose::STANDARD
            .decode(signature.signature_value.as_deref().unwrap_or_default().trim())
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid signature encoding: {e}")))?;

        if self.verify_with_trusted_keys(signature.key_name.as_deref(), signed_info.as_bytes(), &value) {
            tracing::debug!(
                reference_id = element_id,
                algorithm = algorithm.jwa_name(),
                "Signature verified"
            );
            Ok(signature)
        } else {
            Err(SamlError::SignatureInvalid(
                "signature verification failed with all trusted keys".to_string(),
            ))
        }
    }

    fn verify_digest(&self, node: &XmlNode, signature: &XmlSignature) -> SamlResult<()> {
        let digest_algorithm = signature
            .digest_algorithm
            .as_deref()
            .and_then(HashAlgorithm::from_xml_dsig_uri)
            .ok_or_else(|| {
                SamlError::SignatureInvalid(format!(
                    "unsupported digest method {:?}",
                    signature.digest_algorithm
                ))
            })?;

        let expected = base64::engine::general_purpose::STANDARD
            .decode(signature.digest_value.as_deref().unwrap_or_default().trim())
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid digest encoding: {e}")))?;
        let actual = hash(digest_algorithm, digest_input(node).as_bytes());

        if expected == actual {
            Ok(())
        } else {
            Err(SamlError::SignatureInvalid("digest mismatch".to_string()))
        }
    }

    /// Tries the key named in `KeyInfo` first, then every trusted key.
    fn verify_with_trusted_keys(&self, key_name: Option<&str>, data: &[u8], signature: &[u8]) -> bool {
        if let Some(key) = key_name.and_then(|name| self.trusted_keys.iter().find(|k| k.key_id() == name)) {
            if key.verify(data, signature) {
                return true;
            }
        }
        self.trusted_keys.iter().any(|k| k.verify(data, signature))
    }
}

impl SignatureVerifier for XmlSignatureValidator {
    fn verify(&self, node: &XmlNode) -> bool {
        match self.validate(node) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(element = node.local_name(), error = %e, "Signature rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::signature::{attach_placeholder, EnvelopedSigner, XmlSigner};
    use hub_crypto::EcdsaSigningKey;

    fn element() -> XmlNode {
        XmlNode::new("saml:Assertion")
            .with_attr("ID", "_a1")
            .with_child(XmlNode::new("saml:Issuer").with_text("https://idp.test"))
            .with_child(XmlNode::new("saml:Subject").with_text("pid-1"))
    }

    fn sign(key: EcdsaSigningKey, node: XmlNode) -> XmlNode {
        EnvelopedSigner::new(Arc::new(key)).sign(node).unwrap()
    }

    #[test]
    fn valid_signature_verifies() {
        let key = EcdsaSigningKey::generate().unwrap();
        let validator = XmlSignatureValidator::new(vec![key.verifying_key()]);
        let signed = sign(key, element());

        assert!(validator.verify(&signed));
        assert!(validator.validate(&signed).is_ok());
    }

    #[test]
    fn signature_survives_serialization() {
        let key = EcdsaSigningKey::generate().unwrap();
        let validator = XmlSignatureValidator::new(vec![key.verifying_key()]);
        let signed = sign(key, element());

        let reparsed = crate::xml::parse(&signed.to_xml()).unwrap();
        assert!(validator.verify(&reparsed));
    }

    #[test]
    fn tampered_content_fails_digest() {
        let key = EcdsaSigningKey::generate().unwrap();
        let validator = XmlSignatureValidator::new(vec![key.verifying_key()]);
        let mut signed = sign(key, element());
        signed.children[2].text = Some("pid-2".to_string());

        let err = validator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn untrusted_key_is_rejected() {
        let key = EcdsaSigningKey::generate().unwrap();
        let other = EcdsaSigningKey::generate().unwrap();
        let validator = XmlSignatureValidator::new(vec![other.verifying_key()]);

        assert!(!validator.verify(&sign(key, element())));
    }

    #[test]
    fn placeholder_does_not_verify() {
        let key = EcdsaSigningKey::generate().unwrap();
        let validator = XmlSignatureValidator::new(vec![key.verifying_key()]);
        let mut node = element();
        attach_placeholder(&mut node);

        assert!(!validator.verify(&node));
    }

    #[test]
    fn reference_to_another_element_is_rejected() {
        let key = EcdsaSigningKey::generate().unwrap();
        let validator = XmlSignatureValidator::new(vec![key.verifying_key()]);
        let mut signed = sign(key, element());
        signed.set_attr("ID", "_other");

        let err = validator.validate(&signed).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
