//! Matching service responses and health checks.

use hub_integration_tests::{matching_service_assertion, TestHub, MSA, PID};
use hub_saml::{
    hub_status_codes, InternalStatus, LevelOfAssurance, ReplayNamespace, Status, StatusCode,
};

fn status(top: StatusCode, sub: &str) -> Status {
    Status::new(top.with_sub_status(StatusCode::new(sub)))
}

#[test]
fn test_match_response_is_accepted_once() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(
        &hub.msa,
        status(StatusCode::success(), hub_status_codes::MATCH),
        vec![matching_service_assertion()],
    )?;

    let inbound = hub.pipeline.process_matching_service_response(&bytes, &hub.context())?;
    assert_eq!(inbound.status.status, InternalStatus::MatchingServiceMatch);
    assert_eq!(inbound.issuer, MSA);
    assert_eq!(inbound.level_of_assurance, Some(LevelOfAssurance::Level2));

    let assertion = hub.open_blob(
        inbound
            .encrypted_matching_service_assertion
            .as_deref()
            .unwrap_or_default(),
    )?;
    assert_eq!(assertion.persistent_id(), Some(PID));
    assert!(hub.pipeline.is_duplicate("_msa", ReplayNamespace::MatchingService));
    assert!(!hub.pipeline.is_duplicate("_msa", ReplayNamespace::Authn));

    let replay = hub.pipeline.process_matching_service_response(&bytes, &hub.context());
    assert_eq!(replay.unwrap_err().code(), "duplicate_assertion");

    Ok(())
}

#[test]
fn test_no_match_and_multi_match_carry_no_assertion() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let cases = [
        (hub_status_codes::NO_MATCH, InternalStatus::NoMatchingServiceMatchFromMatchingService),
        (hub_status_codes::MULTI_MATCH, InternalStatus::MultiMatch),
        (hub_status_codes::CREATE_FAILURE, InternalStatus::UserAccountCreationFailed),
    ];

    for (sub, expected) in cases {
        let bytes = hub.respond(&hub.msa, status(StatusCode::responder(), sub), Vec::new())?;
        let inbound = hub.pipeline.process_matching_service_response(&bytes, &hub.context())?;
        assert_eq!(inbound.status.status, expected);
        assert!(inbound.encrypted_matching_service_assertion.is_none());
    }

    Ok(())
}

#[test]
fn test_sub_status_outside_allowed_set_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(
        &hub.msa,
        status(StatusCode::success(), hub_status_codes::HEALTHY),
        vec![matching_service_assertion()],
    )?;

    let err = hub
        .pipeline
        .process_matching_service_response(&bytes, &hub.context())
        .unwrap_err();
    assert_eq!(err.code(), "sub_status_must_be_one_of");
    assert_eq!(hub.recorded(), 0);

    Ok(())
}

#[test]
fn test_health_check_reports_healthy() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(&hub.msa, status(StatusCode::success(), hub_status_codes::HEALTHY), Vec::new())?;

    let decoded = hub.pipeline.process_health_check_response(&bytes)?;
    assert_eq!(decoded.status, InternalStatus::Healthy);

    Ok(())
}

#[test]
fn test_health_check_requester_error_is_passed_through() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(&hub.msa, Status::new(StatusCode::requester()), Vec::new())?;

    let decoded = hub.pipeline.process_health_check_response(&bytes)?;
    assert_eq!(decoded.status, InternalStatus::RequesterError);

    Ok(())
}

#[test]
fn test_health_check_with_other_sub_status_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(&hub.msa, status(StatusCode::success(), hub_status_codes::MATCH), Vec::new())?;

    let err = hub.pipeline.process_health_check_response(&bytes).unwrap_err();
    assert_eq!(err.code(), "sub_status_must_be_one_of");

    Ok(())
}

#[test]
fn test_health_check_from_untrusted_signer_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond_as_stranger(
        MSA,
        status(StatusCode::success(), hub_status_codes::HEALTHY),
        Vec::new(),
    )?;

    let err = hub.pipeline.process_health_check_response(&bytes).unwrap_err();
    assert_eq!(err.code(), "signature_invalid");

    Ok(())
}
