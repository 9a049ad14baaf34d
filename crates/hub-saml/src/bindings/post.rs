//! HTTP-POST binding body.
//!
//! A `SAMLResponse` form parameter is the standard base64 encoding of the
//! serialized XML document. Whitespace in the encoded value (line wrapping
//! by some peers) is tolerated on decode.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::xml::{self, XmlNode};

/// Serializes `node` to wire bytes.
#[must_use]
pub fn serialize(node: &XmlNode) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .encode(node.to_xml())
        .into_bytes()
}

/// Deserializes wire bytes into an XML node.
///
/// # Errors
///
/// Returns [`SamlError::Base64Decode`] for a malformed encoding and
/// [`SamlError::XmlParse`] if the decoded document is not well-formed UTF-8
/// XML.
pub fn deserialize(bytes: &[u8]) -> SamlResult<XmlNode> {
    let compact: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;

    let document = String::from_utf8(decoded)
        .map_err(|e| SamlError::XmlParse(format!("Invalid UTF-8 in message: {e}")))?;
    xml::parse(&document)
}
