//! Identity provider responses through the inbound pipeline.

use base64::Engine;
use hub_integration_tests::{
    authn_assertion, envelope, matching_dataset_assertion, TestHub, IDP, PID, REQUEST_ID,
};
use hub_saml::signature::SignatureVerifier;
use hub_saml::{
    status_details, sub_status_codes, InternalStatus, LevelOfAssurance, ReplayNamespace, Status,
    StatusCode,
};

fn both_assertions() -> Vec<hub_saml::Assertion> {
    vec![authn_assertion(), matching_dataset_assertion()]
}

/// A valid response is accepted once and its replay is rejected.
#[test]
fn test_idp_response_is_accepted_once() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(&hub.idp, Status::success(), both_assertions())?;

    let inbound = hub.pipeline.process_idp_response(&bytes, &hub.context())?;
    assert_eq!(inbound.status.status, InternalStatus::Success);
    assert_eq!(inbound.issuer, IDP);
    assert_eq!(inbound.persistent_id.as_deref(), Some(PID));
    assert_eq!(inbound.level_of_assurance, Some(LevelOfAssurance::Level2));
    assert_eq!(inbound.principal_ip_address.as_deref(), Some("192.0.2.10"));

    let authn = hub.open_blob(inbound.encrypted_authn_assertion.as_deref().unwrap_or_default())?;
    assert_eq!(authn.id, "_authn");
    assert!(authn.is_signed());
    let mds = hub.open_blob(
        inbound
            .encrypted_matching_dataset_assertion
            .as_deref()
            .unwrap_or_default(),
    )?;
    assert_eq!(mds.id, "_mds");
    assert_eq!(mds.persistent_id(), Some(PID));

    let replay = hub.pipeline.process_idp_response(&bytes, &hub.context());
    assert_eq!(replay.unwrap_err().code(), "duplicate_assertion");
    assert!(hub.pipeline.is_duplicate("_authn", ReplayNamespace::Authn));
    assert!(hub.pipeline.is_duplicate("_mds", ReplayNamespace::MatchingDataset));

    Ok(())
}

/// Blobs carry the assertions as the identity provider signed them,
/// including content the hub does not interpret.
#[test]
fn test_forwarded_assertions_keep_the_idp_signature() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let mut message = envelope(&hub.idp, Status::success(), both_assertions());
    let authn_statement = message
        .children
        .iter_mut()
        .find(|c| c.local_name() == "Assertion" && c.attr("ID") == Some("_authn"))
        .and_then(|a| a.children.iter_mut().find(|c| c.local_name() == "AuthnStatement"))
        .ok_or_else(|| anyhow::anyhow!("authn assertion has no AuthnStatement"))?;
    authn_statement.set_attr("SessionIndex", "session-7");
    let bytes = hub.send(&hub.idp, message)?;

    let inbound = hub.pipeline.process_idp_response(&bytes, &hub.context())?;
    let authn = hub.open_blob_node(inbound.encrypted_authn_assertion.as_deref().unwrap_or_default())?;
    assert!(hub.peer_verifier.verify(&authn));
    assert_eq!(
        authn.child("AuthnStatement").and_then(|s| s.attr("SessionIndex")),
        Some("session-7")
    );

    let mds = hub.open_blob_node(
        inbound
            .encrypted_matching_dataset_assertion
            .as_deref()
            .unwrap_or_default(),
    )?;
    assert!(hub.peer_verifier.verify(&mds));
    assert!(!hub.hub_verifier.verify(&mds));

    Ok(())
}

/// Non-success statuses decode to the identity provider vocabulary.
#[test]
fn test_idp_failure_statuses_decode() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let no_context = || StatusCode::responder().with_sub_status(StatusCode::new(sub_status_codes::NO_AUTHN_CONTEXT));
    let cases = [
        (
            Status::new(StatusCode::responder().with_sub_status(StatusCode::new(sub_status_codes::AUTHN_FAILED))),
            InternalStatus::AuthenticationFailed,
        ),
        (
            Status::new(no_context()).with_detail(status_details::AUTHN_CANCEL),
            InternalStatus::AuthenticationCancelled,
        ),
        (
            Status::new(no_context()).with_detail(status_details::LOA_PENDING),
            InternalStatus::AuthenticationPending,
        ),
        (Status::new(StatusCode::requester()), InternalStatus::RequesterError),
    ];

    for (status, expected) in cases {
        let bytes = hub.respond(&hub.idp, status, Vec::new())?;
        let inbound = hub.pipeline.process_idp_response(&bytes, &hub.context())?;
        assert_eq!(inbound.status.status, expected);
        assert!(inbound.encrypted_authn_assertion.is_none());
    }
    assert_eq!(hub.recorded(), 0);

    Ok(())
}

/// A failure status may not carry assertions.
#[test]
fn test_idp_failure_with_assertions_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let status = Status::new(StatusCode::responder().with_sub_status(StatusCode::new(sub_status_codes::AUTHN_FAILED)));
    let bytes = hub.respond(&hub.idp, status, both_assertions())?;

    let err = hub.pipeline.process_idp_response(&bytes, &hub.context()).unwrap_err();
    assert_eq!(err.code(), "non_success_has_assertions");

    Ok(())
}

/// A successful response must carry exactly the configured number of
/// assertions.
#[test]
fn test_idp_success_with_one_assertion_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(&hub.idp, Status::success(), vec![authn_assertion()])?;

    let err = hub.pipeline.process_idp_response(&bytes, &hub.context()).unwrap_err();
    assert_eq!(err.code(), "unexpected_number_of_assertions");
    assert_eq!(hub.recorded(), 0);

    Ok(())
}

/// A response answering another request is rejected at the subject.
#[test]
fn test_idp_response_for_other_request_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond(&hub.idp, Status::success(), both_assertions())?;
    let context = hub.pipeline.request_context(format!("{REQUEST_ID}-other"));

    let err = hub.pipeline.process_idp_response(&bytes, &context).unwrap_err();
    assert_eq!(err.code(), "mismatched_in_response_to");
    assert!(!hub.pipeline.is_duplicate("_authn", ReplayNamespace::Authn));

    Ok(())
}

/// A response signed by an untrusted key never reaches decryption.
#[test]
fn test_idp_response_from_untrusted_signer_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let bytes = hub.respond_as_stranger(IDP, Status::success(), both_assertions())?;

    let err = hub.pipeline.process_idp_response(&bytes, &hub.context()).unwrap_err();
    assert_eq!(err.code(), "signature_invalid");
    assert_eq!(hub.recorded(), 0);

    Ok(())
}

/// Garbage on the wire fails before any validation.
#[test]
fn test_malformed_message_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;

    let err = hub
        .pipeline
        .process_idp_response(b"not base64 at all!", &hub.context())
        .unwrap_err();
    assert_eq!(err.code(), "base64_decode");

    Ok(())
}

/// Deeply nested status codes are refused without exhausting the stack.
#[test]
fn test_deeply_nested_message_is_rejected() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let depth = 50_000;
    let document = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_deep"><samlp:Status>{}{}</samlp:Status></samlp:Response>"#,
        r#"<samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Responder">"#.repeat(depth),
        "</samlp:StatusCode>".repeat(depth)
    );
    let bytes = base64::engine::general_purpose::STANDARD.encode(document);

    let err = hub
        .pipeline
        .process_idp_response(bytes.as_bytes(), &hub.context())
        .unwrap_err();
    assert_eq!(err.code(), "malformed_xml");
    assert_eq!(hub.recorded(), 0);

    Ok(())
}
