//! # hub-core
//!
//! Ambient concerns shared by the federation hub crates: the hub's
//! configuration, its loader, and tracing initialisation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::HubConfig;
pub use error::{Error, Result};
