//! Hub responses built by the outbound pipeline.

use std::sync::Arc;

use hub_integration_tests::{now, TestHub, PID};
use hub_saml::bindings::post;
use hub_saml::encryption::{AssertionDecrypter, HybridAssertionDecrypter, HybridAssertionEncrypter};
use hub_saml::signature::SignatureVerifier;
use hub_saml::{
    codec, status_codes, sub_status_codes, Assertion, InternalStatus, MessageKind, NameId,
    OutboundResponseFromHub, SigningEncryptionPipeline, StatusCodec, Subject,
};

fn outbound(hub: &TestHub, kind: MessageKind, status: InternalStatus, assertions: Vec<Assertion>) -> OutboundResponseFromHub {
    OutboundResponseFromHub {
        response_id: "_hub-response".to_string(),
        in_response_to: "rp-req-7".to_string(),
        issuer: hub.config.entities.hub_entity_id.clone(),
        destination: "https://rp.test/acs".to_string(),
        kind,
        status,
        status_message: None,
        assertions,
        issue_instant: now(),
    }
}

fn pipeline(hub: &TestHub) -> SigningEncryptionPipeline {
    SigningEncryptionPipeline::new(hub.hub_signer.clone(), Arc::new(HybridAssertionEncrypter))
}

#[test]
fn test_relying_party_can_verify_and_decrypt() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let assertion = Assertion::with_id("_hub-assertion", &hub.config.entities.hub_entity_id)
        .with_issue_instant(now())
        .with_subject(Subject::new(NameId::persistent(PID)));
    let bytes = pipeline(&hub).build_outbound_message(
        &outbound(&hub, MessageKind::Transaction, InternalStatus::Success, vec![assertion]),
        &hub.relying_party.recipient_key(),
    )?;

    let node = post::deserialize(&bytes)?;
    assert!(hub.hub_verifier.verify(&node));
    let response = codec::response_from_node(&node)?;
    assert!(response.assertions.is_empty());
    assert_eq!(response.encrypted_assertions.len(), 1);
    assert_eq!(response.in_response_to.as_deref(), Some("rp-req-7"));

    let decrypter = HybridAssertionDecrypter::new(Arc::clone(&hub.relying_party));
    let encrypted = node
        .child("EncryptedAssertion")
        .ok_or_else(|| anyhow::anyhow!("no encrypted assertion"))?;
    let plain = decrypter.decrypt(encrypted)?;
    assert!(hub.hub_verifier.verify(&plain));
    assert_eq!(codec::assertion_from_node(&plain)?.persistent_id(), Some(PID));

    // Only the intended recipient can open it.
    let wrong = HybridAssertionDecrypter::new(Arc::clone(&hub.next_hop));
    assert!(wrong.decrypt(encrypted).is_err());

    Ok(())
}

#[test]
fn test_hub_no_match_is_encoded_per_profile() -> anyhow::Result<()> {
    let hub = TestHub::new()?;
    let recipient = hub.relying_party.recipient_key();

    let transaction = pipeline(&hub).build_outbound_message(
        &outbound(&hub, MessageKind::Transaction, InternalStatus::NoMatchingServiceMatchFromHub, Vec::new()),
        &recipient,
    )?;
    let response = codec::response_from_node(&post::deserialize(&transaction)?)?;
    assert_eq!(response.status.status_code.value, status_codes::SUCCESS);
    let decoded = StatusCodec::new(MessageKind::Transaction).decode(&response.status)?;
    assert_eq!(decoded.status, InternalStatus::NoMatchingServiceMatchFromHub);

    let simple = pipeline(&hub).build_outbound_message(
        &outbound(&hub, MessageKind::SimpleProfile, InternalStatus::NoMatchingServiceMatchFromHub, Vec::new()),
        &recipient,
    )?;
    let response = codec::response_from_node(&post::deserialize(&simple)?)?;
    assert_eq!(response.status.status_code.value, status_codes::RESPONDER);
    assert_eq!(
        response.status.status_code.sub_status_value(),
        Some(sub_status_codes::UNKNOWN_PRINCIPAL)
    );

    Ok(())
}

#[test]
fn test_status_outside_profile_is_not_sent() -> anyhow::Result<()> {
    let hub = TestHub::new()?;

    let err = pipeline(&hub)
        .build_outbound_message(
            &outbound(&hub, MessageKind::SimpleProfile, InternalStatus::MultiMatch, Vec::new()),
            &hub.relying_party.recipient_key(),
        )
        .unwrap_err();
    assert_eq!(err.code(), "unrecognized_status");

    Ok(())
}
