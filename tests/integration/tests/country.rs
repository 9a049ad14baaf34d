//! eIDAS country responses, signed and carried.

use base64::Engine;
use hub_integration_tests::{country_assertion, now, TestHub, COUNTRY, PID, REQUEST_ID};
use hub_saml::bindings::post;
use hub_saml::signature::SignatureVerifier;
use hub_saml::{
    attribute_names, codec, sub_status_codes, CountryOutcome, InternalStatus, LevelOfAssurance,
    ReplayNamespace, Status, StatusCode,
};

#[test]
fn test_signed_country_response_is_validated() -> anyhow::Result<()> {
    let hub = TestHub::new()?.with_cross_border();
    let bytes = hub.respond(&hub.country, Status::success(), vec![country_assertion()])?;

    let CountryOutcome::Validated(inbound) = hub.pipeline.process_country_response(&bytes, &hub.context())? else {
        anyhow::bail!("signed country assertions should be validated by the hub");
    };
    assert_eq!(inbound.status.status, InternalStatus::Success);
    assert_eq!(inbound.issuer, COUNTRY);
    assert_eq!(inbound.persistent_id.as_deref(), Some(PID));
    assert_eq!(inbound.level_of_assurance, Some(LevelOfAssurance::EidasSubstantial));
    assert!(hub.pipeline.is_duplicate("_country", ReplayNamespace::Authn));

    let replay = hub.pipeline.process_country_response(&bytes, &hub.context());
    assert_eq!(replay.unwrap_err().code(), "duplicate_assertion");

    Ok(())
}

#[test]
fn test_country_failure_decodes() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let status = Status::new(StatusCode::responder().with_sub_status(StatusCode::new(sub_status_codes::AUTHN_FAILED)));
    let bytes = hub.respond(&hub.country, status, Vec::new())?;

    let CountryOutcome::Validated(inbound) = hub.pipeline.process_country_response(&bytes, &hub.context())? else {
        anyhow::bail!("failure responses are never carried");
    };
    assert_eq!(inbound.status.status, InternalStatus::Failure);
    assert!(inbound.encrypted_identity_assertion.is_none());

    Ok(())
}

#[test]
fn test_unsigned_country_assertion_is_carried() -> anyhow::Result<()> {
    let hub = TestHub::new()?.with_cross_border();
    let bytes = hub.respond_unsigned(&hub.country, Status::success(), vec![country_assertion()])?;

    let CountryOutcome::Carrier(carrier) = hub.pipeline.process_country_response(&bytes, &hub.context())? else {
        anyhow::bail!("unsigned country assertions should be carried");
    };
    assert!(hub.hub_verifier.verify(&carrier.node));
    assert_eq!(carrier.container.country_entity_id, COUNTRY);
    assert_eq!(
        carrier.not_on_or_after,
        now() + chrono::Duration::seconds(hub.config.eidas.carrier_confirmation_validity_secs)
    );

    let assertion = codec::assertion_from_node(&carrier.node)?;
    assert_eq!(assertion.issuer_value(), Some(hub.config.entities.hub_eidas_entity_id.as_str()));
    assert_eq!(assertion.persistent_id(), Some(PID));
    assert_eq!(assertion.level_of_assurance(), Some(LevelOfAssurance::EidasSubstantial));
    let confirmation = assertion
        .bearer_confirmations()
        .find_map(|c| c.subject_confirmation_data.as_ref());
    assert_eq!(
        confirmation.and_then(|d| d.in_response_to.as_deref()),
        Some(REQUEST_ID)
    );

    // The forwarded response is the country's own, untouched.
    let forwarded = post::deserialize(carrier.container.base64_saml_response.as_bytes())?;
    assert_eq!(forwarded, post::deserialize(&bytes)?);
    let carried = assertion
        .attribute(attribute_names::EIDAS_SAML_RESPONSE)
        .and_then(|a| a.values.first())
        .map(|v| v.value.as_str());
    assert_eq!(carried, Some(carrier.container.base64_saml_response.as_str()));

    let engine = base64::engine::general_purpose::STANDARD;
    assert_eq!(carrier.container.base64_encrypted_keys.len(), 1);
    let wrapped = engine.decode(&carrier.container.base64_encrypted_keys[0])?;
    hub.relying_party.unwrap_key(&wrapped)?;

    assert!(!hub.pipeline.is_duplicate("_country", ReplayNamespace::Authn));

    Ok(())
}

#[test]
fn test_unsigned_country_assertion_without_cross_border_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond_unsigned(&hub.country, Status::success(), vec![country_assertion()])?;

    let err = hub
        .pipeline
        .process_country_response(&bytes, &hub.context())
        .unwrap_err();
    assert_eq!(err.code(), "assertion_signature_missing");

    Ok(())
}

#[test]
fn test_country_success_without_assertion_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?.with_cross_border();
    let bytes = hub.respond(&hub.country, Status::success(), Vec::new())?;

    let err = hub
        .pipeline
        .process_country_response(&bytes, &hub.context())
        .unwrap_err();
    assert_eq!(err.code(), "missing_success_assertions");

    Ok(())
}
