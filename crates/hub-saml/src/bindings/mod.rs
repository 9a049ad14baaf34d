//! SAML bindings.
//!
//! Only the HTTP-POST binding body is produced here: the base64 encoding of
//! the serialized message. Form rendering and transport belong to the
//! service layer in front of the hub core.

pub mod post;
