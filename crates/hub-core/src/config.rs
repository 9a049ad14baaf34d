//! Configuration for the hub's SAML core.
//!
//! Values come from defaults overlaid with `HUB_*` environment variables
//! (a `.env` file is honoured if present).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Entity identifiers the hub issues under.
    pub entities: EntityConfig,
    /// Endpoints the hub expects inbound messages to be addressed to.
    pub endpoints: EndpointConfig,
    /// Cross-border carrier assertion lifetimes.
    pub eidas: EidasConfig,
    /// `tracing` filter directive.
    pub log_filter: String,
}

/// Entity identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Entity id used as Issuer on hub-built messages.
    pub hub_entity_id: String,
    /// Entity id the hub uses towards eIDAS country nodes.
    pub hub_eidas_entity_id: String,
}

/// Inbound addressing expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Expected bearer `Recipient` on inbound assertions.
    pub assertion_consumer_endpoint: String,
    /// Expected `Destination` on inbound responses; unchecked when `None`.
    pub response_destination: Option<String>,
}

/// Lifetimes of hub-built eIDAS carrier assertions, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EidasConfig {
    /// `Conditions` validity window.
    pub carrier_conditions_validity_secs: i64,
    /// `SubjectConfirmationData` validity window.
    pub carrier_confirmation_validity_secs: i64,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            hub_entity_id: "https://signin.service.gov.uk".to_string(),
            hub_eidas_entity_id: "https://signin.service.gov.uk/eidas".to_string(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            assertion_consumer_endpoint: "https://signin.service.gov.uk/SAML2/SSO/Response/POST"
                .to_string(),
            response_destination: None,
        }
    }
}

impl Default for EidasConfig {
    fn default() -> Self {
        Self {
            carrier_conditions_validity_secs: 5 * 60,
            carrier_confirmation_validity_secs: 15 * 60,
        }
    }
}

impl HubConfig {
    /// Loads configuration from the environment on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse or the
    /// resulting configuration fails [`HubConfig::validate`].
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`HubConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("HUB_ENTITY_ID") {
            config.entities.hub_entity_id = v;
        }
        if let Some(v) = lookup("HUB_EIDAS_ENTITY_ID") {
            config.entities.hub_eidas_entity_id = v;
        }
        if let Some(v) = lookup("HUB_ASSERTION_CONSUMER_ENDPOINT") {
            config.endpoints.assertion_consumer_endpoint = v;
        }
        config.endpoints.response_destination = lookup("HUB_RESPONSE_DESTINATION")
            .filter(|v| !v.is_empty())
            .or(config.endpoints.response_destination);
        if let Some(v) = parse_var(&lookup, "HUB_CARRIER_CONDITIONS_VALIDITY_SECS")? {
            config.eidas.carrier_conditions_validity_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "HUB_CARRIER_CONFIRMATION_VALIDITY_SECS")? {
            config.eidas.carrier_confirmation_validity_secs = v;
        }
        config.log_filter = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the core cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.entities.hub_entity_id.trim().is_empty() {
            return Err(Error::Config("hub entity id must not be empty".to_string()));
        }
        if self.entities.hub_eidas_entity_id.trim().is_empty() {
            return Err(Error::Config("hub eIDAS entity id must not be empty".to_string()));
        }
        if self.eidas.carrier_conditions_validity_secs <= 0
            || self.eidas.carrier_confirmation_validity_secs <= 0
        {
            return Err(Error::Config("carrier validity must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|_| Error::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
            })
        })
        .transpose()
}
