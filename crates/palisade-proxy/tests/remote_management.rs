//! Claim and manage a peer through the proxy and a loopback transport
#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use palisade_core::{ApplicationState, GroupId, PermissionError, SecurityConfig};
use palisade_proxy::ClaimProxy;
use palisade_testkit::{
    init_tracing, observe_policy, SecurityScenario, UnreachableTransport, MANIFEST_TEMPLATE,
    SECOND_TEMPLATE,
};
use palisade_xml::manifest_to_xml;
use proptest::prelude::*;
use std::sync::Arc;

fn manifest_xml(scenario: &SecurityScenario, leaf: &palisade_trust::Certificate, template: &str) -> String {
    manifest_to_xml(&scenario.signed_manifest(leaf, template)).unwrap()
}

/// Claim through the proxy and return it
fn claimed(scenario: &SecurityScenario) -> ClaimProxy {
    let proxy = ClaimProxy::new(scenario.manager_transport(), SecurityConfig::default());
    let identity = scenario.peer_identity();
    let manifests = [manifest_xml(scenario, &identity[0], MANIFEST_TEMPLATE)];
    proxy
        .claim(
            &scenario.certificate_authority.key_info(),
            scenario.admin_group.as_bytes(),
            &scenario.admin_authority.key_info(),
            &identity,
            &manifests,
        )
        .unwrap();
    proxy
}

#[test]
fn test_claim_over_the_bus() {
    init_tracing();
    let scenario = SecurityScenario::new();
    let proxy = ClaimProxy::new(scenario.manager_transport(), SecurityConfig::default());

    assert_eq!(proxy.application_state().unwrap(), ApplicationState::Claimable);
    assert_eq!(proxy.ecc_public_key().unwrap(), scenario.peer_key.key_info());
    assert_eq!(
        proxy.manifest_template().unwrap(),
        scenario.configurator.manifest_template().unwrap()
    );
    assert_eq!(
        proxy.manifest_template_digest().unwrap(),
        scenario.configurator.manifest_template_digest().unwrap()
    );
    assert_eq!(
        proxy.claim_capabilities().unwrap(),
        scenario.configurator.claim_capabilities().unwrap()
    );
    assert_eq!(
        proxy.claim_capability_additional_info().unwrap(),
        scenario.configurator.claim_capability_additional_info().unwrap()
    );

    let proxy = claimed(&scenario);
    assert_eq!(proxy.application_state().unwrap(), ApplicationState::Claimed);

    let identity = proxy.identity().unwrap();
    assert_eq!(identity, scenario.configurator.identity().unwrap());
    assert_eq!(proxy.manifests().unwrap().len(), 1);
    let id = proxy.identity_certificate_id().unwrap();
    assert_eq!(id.serial, identity[0].serial());
    assert_eq!(proxy.policy().unwrap(), proxy.default_policy().unwrap());
    assert_eq!(proxy.policy_version().unwrap(), 0);
}

#[test]
fn test_claim_rejects_wrong_length_group_before_sending() {
    let scenario = SecurityScenario::new();
    let transport = scenario.manager_transport();
    let proxy = ClaimProxy::new(transport.clone(), SecurityConfig::default());
    let identity = scenario.peer_identity();
    let manifests = [manifest_xml(&scenario, &identity[0], MANIFEST_TEMPLATE)];

    let result = proxy.claim(
        &scenario.certificate_authority.key_info(),
        &[7u8; 17],
        &scenario.admin_authority.key_info(),
        &identity,
        &manifests,
    );
    assert_matches!(result, Err(PermissionError::InvalidGuid { length: 17 }));
    assert!(transport.calls().is_empty());
}

#[test]
fn test_claim_accepts_any_sixteen_byte_group() {
    let scenario = SecurityScenario::new();
    let proxy = ClaimProxy::new(scenario.manager_transport(), SecurityConfig::default());
    let identity = scenario.peer_identity();
    let manifests = [manifest_xml(&scenario, &identity[0], MANIFEST_TEMPLATE)];
    proxy
        .claim(
            &scenario.certificate_authority.key_info(),
            &[0xee; 16],
            &scenario.admin_authority.key_info(),
            &identity,
            &manifests,
        )
        .unwrap();
    assert_eq!(proxy.application_state().unwrap(), ApplicationState::Claimed);
}

#[test]
fn test_claim_requires_manifests() {
    let scenario = SecurityScenario::new();
    let proxy = ClaimProxy::new(scenario.manager_transport(), SecurityConfig::default());
    let identity = scenario.peer_identity();
    let result = proxy.claim::<String>(
        &scenario.certificate_authority.key_info(),
        scenario.admin_group.as_bytes(),
        &scenario.admin_authority.key_info(),
        &identity,
        &[],
    );
    assert_matches!(result, Err(PermissionError::InvalidData { .. }));
}

#[test]
fn test_management_bracket() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    proxy.start_management().unwrap();
    assert_matches!(proxy.start_management(), Err(PermissionError::ManagementAlreadyStarted));
    proxy.end_management().unwrap();
    assert_matches!(proxy.end_management(), Err(PermissionError::ManagementNotStarted));
    proxy.start_management().unwrap();
}

#[test]
fn test_management_bracket_closed_by_its_opener() {
    let scenario = SecurityScenario::new();
    let transport = scenario.manager_transport();
    let proxy = ClaimProxy::new(transport.clone(), SecurityConfig::default());
    let identity = scenario.peer_identity();
    proxy
        .claim(
            &scenario.certificate_authority.key_info(),
            scenario.admin_group.as_bytes(),
            &scenario.admin_authority.key_info(),
            &identity,
            &[manifest_xml(&scenario, &identity[0], MANIFEST_TEMPLATE)],
        )
        .unwrap();
    proxy.start_management().unwrap();

    transport.set_caller(scenario.admin_credentials("second-admin"));
    assert_matches!(proxy.end_management(), Err(PermissionError::PermissionDenied { .. }));
    assert_matches!(proxy.start_management(), Err(PermissionError::ManagementAlreadyStarted));
    proxy.policy().unwrap();

    transport.set_caller(scenario.manager_credentials());
    proxy.end_management().unwrap();
    transport.set_caller(scenario.admin_credentials("second-admin"));
    proxy.start_management().unwrap();
    proxy.end_management().unwrap();
}

#[test]
fn test_duplicate_membership_and_idempotent_removal() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    let chain = scenario.membership("member", GroupId::random());

    proxy.install_membership(&chain).unwrap();
    assert_matches!(
        proxy.install_membership(&chain),
        Err(PermissionError::DuplicateCertificate { .. })
    );
    let summaries = proxy.membership_summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].serial, chain[0].serial());

    let issuer = scenario.admin_authority.key_info();
    proxy.remove_membership(chain[0].serial(), &issuer).unwrap();
    proxy.remove_membership(chain[0].serial(), &issuer).unwrap();
    assert!(proxy.membership_summaries().unwrap().is_empty());
}

#[test]
fn test_policy_reset_restores_default() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    proxy.update_policy(&observe_policy(3)).unwrap();
    assert_eq!(proxy.policy().unwrap(), observe_policy(3));
    assert_eq!(proxy.policy_version().unwrap(), 3);

    proxy.reset_policy().unwrap();
    assert_eq!(proxy.policy().unwrap(), proxy.default_policy().unwrap());
    proxy.update_policy(&observe_policy(1)).unwrap();
}

#[test]
fn test_policy_from_xml() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    let xml = palisade_xml::policy_to_xml(&observe_policy(8)).unwrap();
    proxy.update_policy_from_xml(&xml).unwrap();
    assert_eq!(proxy.policy_version().unwrap(), 8);
}

#[test]
fn test_update_identity_and_install_manifests() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    let identity = scenario.peer_identity();
    proxy
        .update_identity(&identity, &[manifest_xml(&scenario, &identity[0], MANIFEST_TEMPLATE)])
        .unwrap();
    assert_eq!(proxy.identity().unwrap(), identity);

    proxy
        .install_manifests(&[manifest_xml(&scenario, &identity[0], SECOND_TEMPLATE)])
        .unwrap();
    assert_eq!(proxy.manifests().unwrap().len(), 2);

    let stale = scenario.peer_identity();
    assert_matches!(
        proxy.install_manifests(&[manifest_xml(&scenario, &stale[0], SECOND_TEMPLATE)]),
        Err(PermissionError::DigestMismatch { .. })
    );
}

#[test]
fn test_update_identity_rejects_foreign_key() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    let stranger = palisade_testkit::KeyTestFixture::generate();
    let identity = scenario.certificate_authority.issue_identity("intruder", &stranger);
    assert_matches!(
        proxy.update_identity(&identity, &[manifest_xml(&scenario, &identity[0], MANIFEST_TEMPLATE)]),
        Err(PermissionError::InvalidCertificate { .. })
    );
}

#[test]
fn test_managed_calls_need_admin_membership() {
    let scenario = SecurityScenario::new();
    let transport = scenario.manager_transport();
    let proxy = ClaimProxy::new(transport.clone(), SecurityConfig::default());
    let identity = scenario.peer_identity();
    proxy
        .claim(
            &scenario.certificate_authority.key_info(),
            scenario.admin_group.as_bytes(),
            &scenario.admin_authority.key_info(),
            &identity,
            &[manifest_xml(&scenario, &identity[0], MANIFEST_TEMPLATE)],
        )
        .unwrap();

    transport.set_caller(scenario.stranger_credentials());
    assert_matches!(proxy.start_management(), Err(PermissionError::PermissionDenied { .. }));
    assert_matches!(proxy.policy(), Err(PermissionError::PermissionDenied { .. }));
    assert_eq!(proxy.application_state().unwrap(), ApplicationState::Claimed);

    transport.set_caller(scenario.manager_credentials());
    proxy.start_management().unwrap();
}

#[test]
fn test_reset_returns_peer_to_claimable() {
    let scenario = SecurityScenario::new();
    let proxy = claimed(&scenario);
    proxy.reset().unwrap();
    assert_eq!(proxy.application_state().unwrap(), ApplicationState::Claimable);
    assert_matches!(proxy.policy(), Err(PermissionError::PermissionDenied { .. }));
}

#[test]
fn test_rpc_timeout_passed_to_transport() {
    let scenario = SecurityScenario::new();
    let transport = scenario.manager_transport();
    let config = SecurityConfig {
        rpc_timeout_ms: 250,
        ..SecurityConfig::default()
    };
    let proxy = ClaimProxy::new(transport.clone(), config);
    proxy.application_state().unwrap();
    assert_eq!(
        transport.calls()[0].timeout,
        std::time::Duration::from_millis(250)
    );
}

#[test]
fn test_unreachable_peer_is_rpc_failure() {
    let transport = Arc::new(UnreachableTransport::default());
    let proxy = ClaimProxy::new(transport.clone(), SecurityConfig::default());
    assert_matches!(proxy.application_state(), Err(PermissionError::RpcFailure { .. }));
    assert_matches!(proxy.reset(), Err(PermissionError::RpcFailure { .. }));
    assert_eq!(transport.attempts(), 2);
}

#[test]
fn test_split_signing_matches_one_step() {
    let scenario = SecurityScenario::new();
    let identity = scenario.peer_identity();
    let ca = scenario.certificate_authority.key().signer();

    let digest = ClaimProxy::compute_manifest_digest(MANIFEST_TEMPLATE, &identity[0]).unwrap();
    let signature = palisade_core::Signer::sign(ca.as_ref(), &digest).unwrap();
    let split = ClaimProxy::set_manifest_signature(MANIFEST_TEMPLATE, &identity[0], &signature)
        .unwrap();
    let one_step = ClaimProxy::sign_manifest(MANIFEST_TEMPLATE, &identity[0], ca.as_ref()).unwrap();

    let split = palisade_xml::xml_to_manifest(&split).unwrap();
    let one_step = palisade_xml::xml_to_manifest(&one_step).unwrap();
    assert_eq!(split.rules(), one_step.rules());
    assert_eq!(split.thumbprint(), one_step.thumbprint());
    for manifest in [split, one_step] {
        palisade_trust::verify_manifest(
            &manifest,
            &identity[0],
            &scenario.certificate_authority.key_info().public_key,
            &palisade_trust::Sha256Hasher,
            &palisade_trust::P256Verifier,
        )
        .unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn policy_serials_only_increase(first in 1u32..1000, second in 0u32..1000) {
        let scenario = SecurityScenario::new();
        let proxy = claimed(&scenario);
        proxy.update_policy(&observe_policy(first)).unwrap();
        let result = proxy.update_policy(&observe_policy(second));
        if second > first {
            prop_assert!(result.is_ok());
            prop_assert_eq!(proxy.policy_version().unwrap(), second);
        } else {
            prop_assert!(matches!(result, Err(PermissionError::PolicyNotNewer { .. })), "{:?}", result);
            prop_assert_eq!(proxy.policy_version().unwrap(), first);
        }
    }
}
