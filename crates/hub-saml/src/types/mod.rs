//! SAML 2.0 types and data structures.
//!
//! This module contains the typed model of the messages the hub exchanges:
//! responses, assertions, statuses and the constants that go with them.

mod assertion;
mod constants;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use constants::*;
pub use name_id::*;
pub use response::*;
pub use status::*;
