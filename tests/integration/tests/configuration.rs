//! Configuration flowing into the pipeline.

use hub_integration_tests::{
    authn_assertion, country_assertion, matching_dataset_assertion, now, TestHub,
};
use hub_saml::{CountryOutcome, Status};

#[test]
fn test_carrier_validity_follows_configuration() -> anyhow::Result<()> {
    let hub = TestHub::with_settings(&[("HUB_CARRIER_CONFIRMATION_VALIDITY_SECS", "90")])?.with_cross_border();
    assert_eq!(hub.config.eidas.carrier_confirmation_validity_secs, 90);

    let bytes = hub.respond_unsigned(&hub.country, Status::success(), vec![country_assertion()])?;
    let CountryOutcome::Carrier(carrier) = hub.pipeline.process_country_response(&bytes, &hub.context())? else {
        anyhow::bail!("unsigned country assertions should be carried");
    };
    assert_eq!(carrier.not_on_or_after, now() + chrono::Duration::seconds(90));

    Ok(())
}

#[test]
fn test_assertion_counts_are_not_configurable() -> anyhow::Result<()> {
    let hub = TestHub::with_settings(&[("HUB_IDP_ASSERTION_COUNT", "3")])?;
    let bytes = hub.respond(
        &hub.idp,
        Status::success(),
        vec![authn_assertion(), matching_dataset_assertion()],
    )?;
    hub.pipeline.process_idp_response(&bytes, &hub.context())?;

    Ok(())
}

#[test]
fn test_response_destination_is_enforced_when_configured() -> anyhow::Result<()> {
    let hub = TestHub::with_settings(&[("HUB_RESPONSE_DESTINATION", "https://hub.test/other")])?;
    assert_eq!(
        hub.context().expected_destination.as_deref(),
        Some("https://hub.test/other")
    );

    let bytes = hub.respond(
        &hub.idp,
        Status::success(),
        vec![authn_assertion(), matching_dataset_assertion()],
    )?;
    let err = hub.pipeline.process_idp_response(&bytes, &hub.context()).unwrap_err();
    assert_eq!(err.code(), "missing_destination");

    Ok(())
}

#[test]
fn test_invalid_settings_are_refused() {
    assert!(TestHub::with_settings(&[("HUB_CARRIER_CONDITIONS_VALIDITY_SECS", "two")]).is_err());
    assert!(TestHub::with_settings(&[("HUB_CARRIER_CONDITIONS_VALIDITY_SECS", "0")]).is_err());
    assert!(TestHub::with_settings(&[("HUB_ENTITY_ID", "  ")]).is_err());
}
