//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig over the hub's canonical serialization. The digest
//! covers the signed element with its own `Signature` child removed; the
//! signature value covers the serialized `SignedInfo`.
//!
//! # Algorithms
//!
//! - ECDSA P-384 with SHA-384 for signature values
//! - SHA-384 (or SHA-512 on verification) for reference digests

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use hub_crypto::{HashAlgorithm, SignatureAlgorithm};

use crate::types::{canonicalization_algorithms, transform_algorithms, XMLDSIG_NS};
use crate::xml::XmlNode;

/// Qualified name of the signature element.
pub const SIGNATURE_ELEMENT: &str = "ds:Signature";

/// XML Signature structure.
///
/// Represents the `<ds:Signature>` element of a SAML message or assertion.
/// Every part is optional so that a present-but-empty placeholder can be
/// told apart from a real signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlSignature {
    /// Signature method URI.
    pub algorithm: Option<String>,
    /// Canonicalization method URI.
    pub canonicalization: Option<String>,
    /// The reference URI, `#` followed by the signed element's ID.
    pub reference_uri: Option<String>,
    /// Digest method URI.
    pub digest_algorithm: Option<String>,
    /// The digest value (base64 encoded).
    pub digest_value: Option<String>,
    /// The signature value (base64 encoded).
    pub signature_value: Option<String>,
    /// Identifier of the signing key.
    pub key_name: Option<String>,
}

impl XmlSignature {
    /// An unsigned signature referencing `reference_id`.
    #[must_use]
    pub fn placeholder(reference_id: &str) -> Self {
        Self {
            algorithm: Some(SignatureAlgorithm::Es384.xml_dsig_uri().to_string()),
            canonicalization: Some(canonicalization_algorithms::EXCLUSIVE_C14N.to_string()),
            reference_uri: Some(format!("#{reference_id}")),
            digest_algorithm: Some(HashAlgorithm::Sha384.xml_dsig_uri().to_string()),
            digest_value: None,
            signature_value: None,
            key_name: None,
        }
    }

    /// Whether the signature carries a value.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature_value
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }

    /// Referenced element ID, without the leading `#`.
    #[must_use]
    pub fn reference_id(&self) -> Option<&str> {
        self.reference_uri.as_deref().and_then(|uri| uri.strip_prefix('#'))
    }

    /// Reads a `ds:Signature` element.
    #[must_use]
    pub fn from_node(node: &XmlNode) -> Self {
        let signed_info = node.child("SignedInfo");
        let reference = signed_info.and_then(|si| si.child("Reference"));
        let algorithm_of = |parent: Option<&XmlNode>, name: &str| {
            parent
                .and_then(|p| p.child(name))
                .and_then(|m| m.attr("Algorithm"))
                .map(str::to_string)
        };

        Self {
            algorithm: algorithm_of(signed_info, "SignatureMethod"),
            canonicalization: algorithm_of(signed_info, "CanonicalizationMethod"),
            reference_uri: reference.and_then(|r| r.attr("URI")).map(str::to_string),
            digest_algorithm: algorithm_of(reference, "DigestMethod"),
            digest_value: reference
                .and_then(|r| r.child_text("DigestValue"))
                .map(str::to_string),
            signature_value: node.child_text("SignatureValue").map(str::to_string),
            key_name: node
                .child("KeyInfo")
                .and_then(|k| k.child_text("KeyName"))
                .map(str::to_string),
        }
    }

    /// Builds the `ds:SignedInfo` element.
    #[must_use]
    pub fn signed_info_node(&self) -> XmlNode {
        let mut digest_value = XmlNode::new("ds:DigestValue");
        digest_value.text.clone_from(&self.digest_value);

        XmlNode::new("ds:SignedInfo")
            .with_child(
                XmlNode::new("ds:CanonicalizationMethod")
                    .with_opt_attr("Algorithm", self.canonicalization.as_deref()),
            )
            .with_child(
                XmlNode::new("ds:SignatureMethod")
                    .with_opt_attr("Algorithm", self.algorithm.as_deref()),
            )
            .with_child(
                XmlNode::new("ds:Reference")
                    .with_opt_attr("URI", self.reference_uri.as_deref())
                    .with_child(
                        XmlNode::new("ds:Transforms")
                            .with_child(
                                XmlNode::new("ds:Transform")
                                    .with_attr("Algorithm", transform_algorithms::ENVELOPED_SIGNATURE),
                            )
                            .with_child(
                                XmlNode::new("ds:Transform")
                                    .with_attr("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
                            ),
                    )
                    .with_child(
                        XmlNode::new("ds:DigestMethod")
                            .with_opt_attr("Algorithm", self.digest_algorithm.as_deref()),
                    )
                    .with_child(digest_value),
            )
    }

    /// Builds the complete `ds:Signature` element.
    #[must_use]
    pub fn to_node(&self) -> XmlNode {
        let mut signature_value = XmlNode::new("ds:SignatureValue");
        signature_value.text.clone_from(&self.signature_value);

        let mut node = XmlNode::new(SIGNATURE_ELEMENT)
            .with_attr("xmlns:ds", XMLDSIG_NS)
            .with_child(self.signed_info_node())
            .with_child(signature_value);
        if let Some(key_name) = &self.key_name {
            node = node.with_child(
                XmlNode::new("ds:KeyInfo").with_child(XmlNode::new("ds:KeyName").with_text(key_name)),
            );
        }
        node
    }
}

/// Inserts an unsigned signature placeholder into `node`.
///
/// The placeholder goes after `Issuer` and references the element's `ID`.
/// An element that already has a signature is left untouched.
pub fn attach_placeholder(node: &mut XmlNode) {
    if node.child("Signature").is_some() {
        return;
    }
    let reference_id = node.attr("ID").unwrap_or_default().to_string();
    insert_after_issuer(node, XmlSignature::placeholder(&reference_id).to_node());
}

/// Inserts `signature` directly after the `Issuer` child, or first if
/// there is none.
pub(crate) fn insert_after_issuer(node: &mut XmlNode, signature: XmlNode) {
    let index = node.position("Issuer").map_or(0, |i| i + 1);
    node.children.insert(index, signature);
}

/// Canonical bytes the reference digest is computed over: the element
/// with its own enveloped signature removed.
pub(crate) fn digest_input(node: &XmlNode) -> String {
    let mut stripped = node.clone();
    stripped.children.retain(|c| c.local_name() != "Signature");
    stripped.to_xml()
}
