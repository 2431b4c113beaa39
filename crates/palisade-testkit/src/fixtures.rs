//! Complete claim scenario
//!
//! A certificate authority, an admin group authority, a managed peer and a
//! security manager holding an admin membership. The peer starts enabled and
//! `Claimable` with [`MANIFEST_TEMPLATE`] installed.

use crate::certificates::AuthorityFixture;
use crate::keys::{KeyTestFixture, MemoryKeyStore};
use crate::samples::MANIFEST_TEMPLATE;
use crate::transport::LoopbackTransport;
use palisade_configurator::{
    CallerCredentials, ClaimRequest, ManagedApplication, PermissionConfigurator,
};
use palisade_core::{GroupId, Manifest, SecurityConfig};
use palisade_trust::{sign_manifest_xml, Certificate, Sha256Hasher};
use palisade_xml::xml_to_manifest;
use std::sync::Arc;

/// Everything needed to claim and manage one peer
pub struct SecurityScenario {
    /// Issues identity certificates
    pub certificate_authority: AuthorityFixture,
    /// Issues admin group memberships
    pub admin_authority: AuthorityFixture,
    /// Admin security group
    pub admin_group: GroupId,
    /// Managed peer's key
    pub peer_key: KeyTestFixture,
    /// Security manager's key
    pub manager_key: KeyTestFixture,
    /// Manager's admin membership chain
    pub manager_membership: Vec<Certificate>,
    /// Managed peer's configurator
    pub configurator: Arc<PermissionConfigurator>,
    /// Managed peer's bus object
    pub application: Arc<ManagedApplication>,
}

impl SecurityScenario {
    /// Scenario with the default configuration
    pub fn new() -> Self {
        Self::with_config(SecurityConfig::default())
    }

    /// Scenario whose peer runs with `config`
    pub fn with_config(config: SecurityConfig) -> Self {
        let certificate_authority = AuthorityFixture::new("certificate authority");
        let admin_authority = AuthorityFixture::new("admin authority");
        let admin_group = GroupId::random();
        let peer_key = KeyTestFixture::generate();
        let manager_key = KeyTestFixture::generate();
        let manager_membership =
            admin_authority.issue_membership("security manager", &manager_key, admin_group);

        let configurator =
            PermissionConfigurator::new(&MemoryKeyStore::new(&peer_key), config).unwrap();
        configurator.enable_peer_security();
        configurator
            .set_manifest_template_from_xml(MANIFEST_TEMPLATE)
            .unwrap();
        let configurator = Arc::new(configurator);
        let application = Arc::new(ManagedApplication::new(configurator.clone()));

        Self {
            certificate_authority,
            admin_authority,
            admin_group,
            peer_key,
            manager_key,
            manager_membership,
            configurator,
            application,
        }
    }

    /// Fresh identity chain for the peer
    pub fn peer_identity(&self) -> Vec<Certificate> {
        self.certificate_authority.issue_identity("managed peer", &self.peer_key)
    }

    /// Manifest for `template` bound to `leaf` and signed by the authority
    pub fn signed_manifest(&self, leaf: &Certificate, template: &str) -> Manifest {
        let xml = sign_manifest_xml(
            template,
            leaf,
            self.certificate_authority.key().signer().as_ref(),
            &Sha256Hasher,
        )
        .unwrap();
        xml_to_manifest(&xml).unwrap()
    }

    /// Valid claim for the peer
    pub fn claim_request(&self) -> ClaimRequest {
        let identity = self.peer_identity();
        let manifests = vec![self.signed_manifest(&identity[0], MANIFEST_TEMPLATE)];
        ClaimRequest {
            certificate_authority: self.certificate_authority.key_info(),
            admin_group_id: self.admin_group,
            admin_group_authority: self.admin_authority.key_info(),
            identity,
            manifests,
        }
    }

    /// Claim the peer directly through its configurator
    pub fn claim_locally(&self) {
        self.configurator.claim(self.claim_request()).unwrap();
    }

    /// Credentials of the security manager
    pub fn manager_credentials(&self) -> CallerCredentials {
        CallerCredentials::anonymous(self.manager_key.public_key())
            .with_membership(self.manager_membership.clone())
    }

    /// Credentials of another admin group member with a fresh key
    pub fn admin_credentials(&self, name: &str) -> CallerCredentials {
        let key = KeyTestFixture::generate();
        let chain = self
            .admin_authority
            .issue_membership(name, &key, self.admin_group);
        CallerCredentials::anonymous(key.public_key()).with_membership(chain)
    }

    /// Credentials of a caller with no memberships
    pub fn stranger_credentials(&self) -> CallerCredentials {
        CallerCredentials::anonymous(KeyTestFixture::generate().public_key())
    }

    /// Transport from the security manager to the peer
    pub fn manager_transport(&self) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport::new(
            self.application.clone(),
            self.manager_credentials(),
        ))
    }

    /// Membership chain for a fresh key in `group`
    pub fn membership(&self, name: &str, group: GroupId) -> Vec<Certificate> {
        self.admin_authority
            .issue_membership(name, &KeyTestFixture::generate(), group)
    }
}

impl Default for SecurityScenario {
    fn default() -> Self {
        Self::new()
    }
}
