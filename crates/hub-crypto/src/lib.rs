//! # hub-crypto
//!
//! Cryptographic primitives for the federation hub, built on aws-lc-rs.
//!
//! The SAML core never touches key material directly. It asks this crate to:
//!
//! - digest canonical XML (SHA-384 / SHA-512)
//! - sign and verify with ECDSA P-384
//! - wrap and unwrap content-encryption keys with RSA-OAEP
//! - seal and open assertion bytes with AES-256-GCM
//! - mint random identifiers
//!
//! ## CNSA 2.0 Compliance
//!
//! Signatures use P-384 with SHA-384 and digests are SHA-384 or stronger.
//! SHA-256 only appears as the OAEP mask function, which is fixed by the
//! XML Encryption key transport profile.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod encryption;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use algorithm::{HashAlgorithm, SignatureAlgorithm};
pub use encryption::{ContentKey, DecryptionKey, EncryptionError, RecipientKey};
pub use hash::{sha384, sha512};
pub use keys::{EcdsaSigningKey, EcdsaVerifyingKey};
pub use random::{generate_saml_id, random_alphanumeric, random_bytes};
pub use signature::{SignatureError, SignatureProvider};
