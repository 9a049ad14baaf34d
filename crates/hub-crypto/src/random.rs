//! Cryptographically secure random values.

use std::fmt::Write;

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates an alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a SAML `ID` value.
///
/// XML IDs must not start with a digit, so the 160 random bits are
/// hex-encoded behind a leading underscore.
#[must_use]
pub fn generate_saml_id() -> String {
    random_bytes(20)
        .iter()
        .fold(String::with_capacity(41), |mut id, byte| {
            if id.is_empty() {
                id.push('_');
            }
            let _ = write!(id, "{byte:02x}");
            id
        })
}
