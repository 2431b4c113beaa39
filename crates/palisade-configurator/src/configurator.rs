//! Local permission configurator
//!
//! Owns the security state of one local peer: lifecycle state, claim
//! configuration, manifest template, trust anchors, identity, manifests,
//! policy and memberships. All state sits behind one mutex; every operation
//! either commits completely or leaves the state untouched.
//!
//! Nothing works until [`PermissionConfigurator::enable_peer_security`] has
//! been called. Before that every operation fails with `FeatureNotAvailable`.

use palisade_core::{
    serialization, ApplicationState, CertificateId, ClaimCapabilities,
    ClaimCapabilityAdditionalInfo, EccPublicKey, GroupId, Hasher, KeyInfo, KeyStore, Manifest,
    PermissionError, Policy, Result, Rule, SecurityConfig, Signer, TrustAnchor, Verifier,
};
use palisade_trust::{
    chain_matches_anchor, check_usage, sign_manifest_xml, verify_chain, verify_manifest,
    Certificate, CertificateUsage, P256Verifier, Sha256Hasher,
};
use palisade_xml::{rules_to_xml, validate_policy, xml_array_to_manifests, xml_to_rules};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Receives configuration events
///
/// Callbacks run after the configurator has released its lock, so they may
/// call back into the configurator.
pub trait ConfigurationListener: Send + Sync {
    /// The peer was reset to its unclaimed state
    fn factory_reset(&self) {}

    /// The installed policy changed
    fn policy_changed(&self) {}
}

/// Arguments of a claim, already decoded
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Certificate authority that issued the identity chain
    pub certificate_authority: KeyInfo,
    /// Admin security group
    pub admin_group_id: GroupId,
    /// Authority issuing admin group memberships
    pub admin_group_authority: KeyInfo,
    /// Identity chain, leaf first
    pub identity: Vec<Certificate>,
    /// Signed manifests for the identity
    pub manifests: Vec<Manifest>,
}

#[derive(Debug, Default)]
struct ConfiguratorState {
    security_enabled: bool,
    application_state: ApplicationState,
    claim_capabilities: ClaimCapabilities,
    claim_capability_info: ClaimCapabilityAdditionalInfo,
    manifest_template: Option<Vec<Rule>>,
    certificate_authority: Option<TrustAnchor>,
    admin_group: Option<TrustAnchor>,
    identity: Vec<Certificate>,
    manifests: Vec<Manifest>,
    policy: Option<Policy>,
    memberships: Vec<Vec<Certificate>>,
    management: Option<ManagementOwner>,
}

/// Who opened the management bracket
#[derive(Debug, Clone, PartialEq, Eq)]
enum ManagementOwner {
    Local,
    Remote(EccPublicKey),
}

impl ConfiguratorState {
    /// Key that signed the identity leaf, when known
    fn identity_issuer(&self) -> Option<EccPublicKey> {
        self.identity
            .get(1)
            .map(|issuer| issuer.subject_public_key().clone())
            .or_else(|| {
                self.certificate_authority
                    .as_ref()
                    .map(|anchor| anchor.key_info.public_key.clone())
            })
    }
}

/// Security state of the local peer
pub struct PermissionConfigurator {
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn Verifier>,
    hasher: Arc<dyn Hasher>,
    config: SecurityConfig,
    state: Mutex<ConfiguratorState>,
    listeners: Mutex<Vec<Arc<dyn ConfigurationListener>>>,
}

impl std::fmt::Debug for PermissionConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionConfigurator")
            .field("public_key", &self.signer.public_key())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl PermissionConfigurator {
    /// Configurator over the local key from `key_store`
    pub fn new(key_store: &dyn KeyStore, config: SecurityConfig) -> Result<Self> {
        Ok(Self::with_signer(key_store.local_signer()?, config))
    }

    /// Configurator over `signer` with the default P-256 verifier and SHA-256 hasher
    pub fn with_signer(signer: Arc<dyn Signer>, config: SecurityConfig) -> Self {
        Self::with_crypto(signer, Arc::new(P256Verifier), Arc::new(Sha256Hasher), config)
    }

    /// Configurator with every crypto capability supplied
    pub fn with_crypto(
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn Verifier>,
        hasher: Arc<dyn Hasher>,
        config: SecurityConfig,
    ) -> Self {
        let state = ConfiguratorState {
            claim_capabilities: config.claim_capabilities(),
            claim_capability_info: config.claim_capability_info(),
            ..ConfiguratorState::default()
        };
        Self {
            signer,
            verifier,
            hasher,
            config,
            state: Mutex::new(state),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Turn on peer security; required before any other operation
    pub fn enable_peer_security(&self) {
        let mut state = self.state.lock();
        if !state.security_enabled {
            state.security_enabled = true;
            tracing::info!(key = ?self.signer.public_key(), "peer security enabled");
        }
    }

    /// Register a listener for reset and policy events
    pub fn add_listener(&self, listener: Arc<dyn ConfigurationListener>) {
        self.listeners.lock().push(listener);
    }

    /// Configuration in effect
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Verifier used for certificate and manifest checks
    pub fn verifier(&self) -> &dyn Verifier {
        self.verifier.as_ref()
    }

    fn enabled(&self) -> Result<MutexGuard<'_, ConfiguratorState>> {
        let state = self.state.lock();
        if !state.security_enabled {
            return Err(PermissionError::feature_not_available(
                "peer security is not enabled",
            ));
        }
        Ok(state)
    }

    fn notify(&self, event: fn(&dyn ConfigurationListener)) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            event(listener.as_ref());
        }
    }

    // --- lifecycle ----------------------------------------------------------

    /// Current lifecycle state
    pub fn application_state(&self) -> Result<ApplicationState> {
        Ok(self.enabled()?.application_state)
    }

    /// Force a lifecycle state
    ///
    /// Unclaimed peers move between `NotClaimable` and `Claimable`; claimed
    /// peers between `Claimed` and `NeedUpdate`. Entering or leaving the
    /// claimed states this way is refused; use claim and reset instead.
    pub fn set_application_state(&self, next: ApplicationState) -> Result<()> {
        let mut state = self.enabled()?;
        let current = state.application_state;
        if current.is_claimed() != next.is_claimed() {
            return Err(PermissionError::invalid_data(format!(
                "cannot move from {current} to {next}"
            )));
        }
        state.application_state = next;
        tracing::info!(from = %current, to = %next, "application state set");
        Ok(())
    }

    /// Accepted claim mechanisms
    pub fn claim_capabilities(&self) -> Result<ClaimCapabilities> {
        Ok(self.enabled()?.claim_capabilities)
    }

    /// Replace the accepted claim mechanisms
    pub fn set_claim_capabilities(&self, capabilities: ClaimCapabilities) -> Result<()> {
        self.enabled()?.claim_capabilities = capabilities;
        Ok(())
    }

    /// Claim capability additional info
    pub fn claim_capability_additional_info(&self) -> Result<ClaimCapabilityAdditionalInfo> {
        Ok(self.enabled()?.claim_capability_info)
    }

    /// Replace the claim capability additional info
    pub fn set_claim_capability_additional_info(
        &self,
        info: ClaimCapabilityAdditionalInfo,
    ) -> Result<()> {
        self.enabled()?.claim_capability_info = info;
        Ok(())
    }

    // --- manifest template --------------------------------------------------

    /// Installed manifest template; empty when none
    pub fn manifest_template(&self) -> Result<Vec<Rule>> {
        Ok(self.enabled()?.manifest_template.clone().unwrap_or_default())
    }

    /// Installed manifest template as a `<rules>` document
    pub fn manifest_template_as_xml(&self) -> Result<String> {
        let state = self.enabled()?;
        let template = state
            .manifest_template
            .as_ref()
            .ok_or_else(|| PermissionError::invalid_data("no manifest template installed"))?;
        rules_to_xml(template)
    }

    /// Install a manifest template from a `<rules>` document
    ///
    /// A `NotClaimable` peer becomes `Claimable`.
    pub fn set_manifest_template_from_xml(&self, xml: &str) -> Result<()> {
        let rules = xml_to_rules(xml)?;
        let mut state = self.enabled()?;
        state.manifest_template = Some(rules);
        if state.application_state == ApplicationState::NotClaimable {
            state.application_state = ApplicationState::Claimable;
            tracing::info!(to = %ApplicationState::Claimable, "manifest template installed");
        }
        Ok(())
    }

    /// Digest of the installed manifest template
    pub fn manifest_template_digest(&self) -> Result<Vec<u8>> {
        let template = self.manifest_template()?;
        Ok(self
            .hasher
            .hash(&serialization::to_canonical_bytes(&template)?))
    }

    // --- local key ----------------------------------------------------------

    /// Public half of the local signing key
    pub fn signing_public_key(&self) -> Result<KeyInfo> {
        self.enabled()?;
        Ok(self.signer.key_info())
    }

    /// Sign bytes with the local key
    pub fn sign_digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.enabled()?;
        self.signer.sign(data)
    }

    /// Bind an unsigned rules document to `subject` and sign it with the local key
    pub fn compute_thumbprint_and_sign_manifest_xml(
        &self,
        subject: &Certificate,
        unsigned_xml: &str,
    ) -> Result<String> {
        self.enabled()?;
        sign_manifest_xml(unsigned_xml, subject, self.signer.as_ref(), self.hasher.as_ref())
    }

    // --- claim and reset ----------------------------------------------------

    /// Claim this peer
    ///
    /// The peer must be `Claimable`. The identity leaf must carry the local
    /// key and chain to the certificate authority, and every manifest must be
    /// bound to the leaf and signed by its issuer. On success the peer is
    /// `Claimed` with fresh trust anchors and the default policy.
    pub fn claim(&self, request: ClaimRequest) -> Result<()> {
        let mut state = self.enabled()?;
        if state.application_state != ApplicationState::Claimable {
            return Err(PermissionError::permission_denied(format!(
                "peer is {}, not claimable",
                state.application_state
            )));
        }
        let ClaimRequest {
            certificate_authority,
            admin_group_id,
            admin_group_authority,
            identity,
            manifests,
        } = request;

        let ca_anchor = TrustAnchor::certificate_authority(certificate_authority);
        self.check_identity(&identity, &manifests)?;
        if !chain_matches_anchor(&identity, &ca_anchor, self.verifier.as_ref()) {
            return Err(PermissionError::invalid_certificate(
                "identity chain is not issued by the certificate authority",
            ));
        }
        let issuer = identity
            .get(1)
            .map(|cert| cert.subject_public_key().clone())
            .unwrap_or_else(|| ca_anchor.key_info.public_key.clone());
        self.check_manifests(&manifests, &identity[0], &issuer)?;

        state.certificate_authority = Some(ca_anchor);
        state.admin_group = Some(TrustAnchor::security_group(
            admin_group_authority,
            admin_group_id,
        ));
        state.identity = identity;
        state.manifests = manifests;
        state.policy = None;
        state.memberships.clear();
        state.application_state = ApplicationState::Claimed;
        tracing::info!(admin_group = %admin_group_id, "peer claimed");
        Ok(())
    }

    /// Return to the unclaimed state
    ///
    /// Identity, manifests, policy, memberships and trust anchors are dropped.
    /// Claim capabilities and the manifest template survive; the peer is
    /// `Claimable` when a template is installed and `NotClaimable` otherwise.
    pub fn reset(&self) -> Result<()> {
        {
            let mut state = self.enabled()?;
            state.certificate_authority = None;
            state.admin_group = None;
            state.identity.clear();
            state.manifests.clear();
            state.policy = None;
            state.memberships.clear();
            state.management = None;
            state.application_state = if state.manifest_template.is_some() {
                ApplicationState::Claimable
            } else {
                ApplicationState::NotClaimable
            };
            tracing::info!(to = %state.application_state, "factory reset");
        }
        self.notify(|l| l.factory_reset());
        self.notify(|l| l.policy_changed());
        Ok(())
    }

    // --- identity and manifests ---------------------------------------------

    fn check_identity(
        &self,
        identity: &[Certificate],
        manifests: &[Manifest],
    ) -> Result<()> {
        let leaf = identity
            .first()
            .ok_or_else(|| PermissionError::invalid_data("identity chain is empty"))?;
        if manifests.is_empty() {
            return Err(PermissionError::invalid_data("at least one manifest is required"));
        }
        if leaf.subject_public_key() != &self.signer.public_key() {
            return Err(PermissionError::invalid_certificate(
                "identity leaf does not carry this peer's public key",
            ));
        }
        check_usage(leaf, CertificateUsage::Identity, &self.config)?;
        verify_chain(identity, self.verifier.as_ref())
    }

    fn check_manifests(
        &self,
        manifests: &[Manifest],
        leaf: &Certificate,
        issuer: &EccPublicKey,
    ) -> Result<()> {
        for manifest in manifests {
            verify_manifest(
                manifest,
                leaf,
                issuer,
                self.hasher.as_ref(),
                self.verifier.as_ref(),
            )?;
        }
        Ok(())
    }

    /// Installed identity chain, leaf first
    pub fn identity(&self) -> Result<Vec<Certificate>> {
        Ok(self.enabled()?.identity.clone())
    }

    /// Replace the identity chain and its manifests together
    pub fn update_identity(&self, identity: Vec<Certificate>, manifests: Vec<Manifest>) -> Result<()> {
        let mut state = self.enabled()?;
        self.check_identity(&identity, &manifests)?;
        let issuer = identity
            .get(1)
            .map(|cert| cert.subject_public_key().clone())
            .or_else(|| {
                state
                    .certificate_authority
                    .as_ref()
                    .map(|anchor| anchor.key_info.public_key.clone())
            })
            .ok_or_else(|| {
                PermissionError::invalid_certificate("no issuer key to verify manifests against")
            })?;
        self.check_manifests(&manifests, &identity[0], &issuer)?;
        tracing::info!(subject = identity[0].subject(), manifests = manifests.len(), "identity updated");
        state.identity = identity;
        state.manifests = manifests;
        Ok(())
    }

    /// Replace the identity from PEM and manifest XML
    pub fn update_identity_from_pem(&self, chain_pem: &str, manifests_xml: &[&str]) -> Result<()> {
        let identity = palisade_trust::extract_chain(chain_pem)?;
        let manifests = xml_array_to_manifests(manifests_xml)?;
        self.update_identity(identity, manifests)
    }

    /// Id of the identity leaf certificate
    pub fn identity_certificate_id(&self) -> Result<CertificateId> {
        let state = self.enabled()?;
        let leaf = state
            .identity
            .first()
            .ok_or_else(|| PermissionError::certificate_not_found("no identity installed"))?;
        Ok(leaf.certificate_id(state.identity_issuer().as_ref()))
    }

    /// Installed manifests
    pub fn manifests(&self) -> Result<Vec<Manifest>> {
        Ok(self.enabled()?.manifests.clone())
    }

    /// Install signed manifests for the current identity
    ///
    /// With `append` the manifests are added to the installed set, otherwise
    /// they replace it.
    pub fn install_manifests(&self, manifests: Vec<Manifest>, append: bool) -> Result<()> {
        if manifests.is_empty() {
            return Err(PermissionError::invalid_data("at least one manifest is required"));
        }
        let mut state = self.enabled()?;
        let leaf = state
            .identity
            .first()
            .ok_or_else(|| PermissionError::certificate_not_found("no identity installed"))?;
        let issuer = state.identity_issuer().ok_or_else(|| {
            PermissionError::invalid_certificate("no issuer key to verify manifests against")
        })?;
        self.check_manifests(&manifests, leaf, &issuer)?;
        if !append {
            state.manifests.clear();
        }
        state.manifests.extend(manifests);
        tracing::debug!(installed = state.manifests.len(), append, "manifests installed");
        Ok(())
    }

    // --- policy -------------------------------------------------------------

    /// Built-in policy for the current trust anchors
    pub fn default_policy(&self) -> Result<Policy> {
        let state = self.enabled()?;
        Ok(self.default_policy_for(&state))
    }

    fn default_policy_for(&self, state: &ConfiguratorState) -> Policy {
        let admin = state.admin_group.as_ref().and_then(|anchor| {
            anchor
                .security_group_id
                .map(|group| (&anchor.key_info, group))
        });
        Policy::default_policy(
            state.certificate_authority.as_ref().map(|a| &a.key_info),
            admin,
            &self.signer.key_info(),
        )
    }

    /// Policy in effect: the installed one, else the default
    pub fn policy(&self) -> Result<Policy> {
        let state = self.enabled()?;
        Ok(state
            .policy
            .clone()
            .unwrap_or_else(|| self.default_policy_for(&state)))
    }

    /// Serial number of the policy in effect
    pub fn policy_version(&self) -> Result<u32> {
        let state = self.enabled()?;
        Ok(state.policy.as_ref().map_or(0, |p| p.serial_number))
    }

    /// Install a policy with a strictly greater serial number
    pub fn install_policy(&self, policy: Policy) -> Result<()> {
        validate_policy(&policy)?;
        {
            let mut state = self.enabled()?;
            let installed = state.policy.as_ref().map_or(0, |p| p.serial_number);
            if policy.serial_number <= installed {
                return Err(PermissionError::policy_not_newer(installed, policy.serial_number));
            }
            tracing::info!(serial = policy.serial_number, acls = policy.acls.len(), "installing policy");
            state.policy = Some(policy);
        }
        self.notify(|l| l.policy_changed());
        Ok(())
    }

    /// Drop the installed policy in favour of the default
    pub fn reset_policy(&self) -> Result<()> {
        self.enabled()?.policy = None;
        tracing::info!("policy reset to default");
        self.notify(|l| l.policy_changed());
        Ok(())
    }

    // --- memberships --------------------------------------------------------

    /// Ids of the installed membership leaf certificates
    pub fn membership_summaries(&self) -> Result<Vec<CertificateId>> {
        let state = self.enabled()?;
        Ok(state
            .memberships
            .iter()
            .filter_map(|chain| {
                let leaf = chain.first()?;
                Some(leaf.certificate_id(chain.get(1).map(Certificate::subject_public_key)))
            })
            .collect())
    }

    /// Installed membership chains
    pub fn memberships(&self) -> Result<Vec<Vec<Certificate>>> {
        Ok(self.enabled()?.memberships.clone())
    }

    /// Install a membership chain, leaf first
    pub fn install_membership(&self, chain: Vec<Certificate>) -> Result<()> {
        let leaf = chain
            .first()
            .ok_or_else(|| PermissionError::invalid_data("membership chain is empty"))?;
        let group = leaf.group_id().ok_or_else(|| {
            PermissionError::invalid_certificate("membership certificate names no security group")
        })?;
        check_usage(leaf, CertificateUsage::Membership, &self.config)?;
        verify_chain(&chain, self.verifier.as_ref())?;

        let mut state = self.enabled()?;
        let duplicate = state.memberships.iter().filter_map(|c| c.first()).any(|installed| {
            installed.serial() == leaf.serial()
                && installed.authority_key_id() == leaf.authority_key_id()
        });
        if duplicate {
            return Err(PermissionError::duplicate_certificate(format!(
                "membership {} already installed",
                leaf.certificate_id(None)
            )));
        }
        tracing::info!(%group, subject = leaf.subject(), "membership installed");
        state.memberships.push(chain);
        Ok(())
    }

    /// Remove the membership `serial` issued by `issuer`
    ///
    /// Removing a membership that is not installed succeeds.
    pub fn remove_membership(&self, serial: &[u8], issuer: &KeyInfo) -> Result<()> {
        let mut state = self.enabled()?;
        let before = state.memberships.len();
        state.memberships.retain(|chain| {
            chain.first().map_or(true, |leaf| {
                !leaf
                    .certificate_id(chain.get(1).map(Certificate::subject_public_key))
                    .matches(serial, issuer)
            })
        });
        let removed = before - state.memberships.len();
        tracing::debug!(removed, "membership removal");
        Ok(())
    }

    // --- management session -------------------------------------------------

    /// Open the management bracket on behalf of the local application
    pub fn start_management(&self) -> Result<()> {
        self.open_management(ManagementOwner::Local)
    }

    /// Close the management bracket, whoever opened it
    pub fn end_management(&self) -> Result<()> {
        let mut state = self.enabled()?;
        if state.management.take().is_none() {
            return Err(PermissionError::ManagementNotStarted);
        }
        tracing::debug!("management ended locally");
        Ok(())
    }

    /// Open the management bracket for the remote `caller`
    pub fn start_management_for(&self, caller: &EccPublicKey) -> Result<()> {
        self.open_management(ManagementOwner::Remote(caller.clone()))
    }

    /// Close a bracket `caller` opened
    ///
    /// Another caller gets `PermissionDenied` and the bracket stays open.
    pub fn end_management_for(&self, caller: &EccPublicKey) -> Result<()> {
        let mut state = self.enabled()?;
        match &state.management {
            None => return Err(PermissionError::ManagementNotStarted),
            Some(ManagementOwner::Remote(owner)) if owner == caller => {}
            Some(_) => {
                return Err(PermissionError::permission_denied(
                    "management was started by another caller",
                ))
            }
        }
        state.management = None;
        tracing::debug!("management ended");
        Ok(())
    }

    fn open_management(&self, owner: ManagementOwner) -> Result<()> {
        let mut state = self.enabled()?;
        if state.management.is_some() {
            return Err(PermissionError::ManagementAlreadyStarted);
        }
        tracing::debug!(remote = matches!(owner, ManagementOwner::Remote(_)), "management started");
        state.management = Some(owner);
        Ok(())
    }

    // --- authorization support ----------------------------------------------

    /// Whether `chain` proves admin group membership for `caller`
    pub fn is_admin(&self, caller: &EccPublicKey, chain: &[Certificate]) -> bool {
        let admin = self.state.lock().admin_group.clone();
        let Some(admin) = admin else {
            return false;
        };
        match chain.first() {
            Some(leaf) if leaf.subject_public_key() == caller => {
                chain_matches_anchor(chain, &admin, self.verifier.as_ref())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use palisade_core::{Acl, Peer};
    use palisade_trust::P256Signer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEMPLATE: &str = r#"<rules><node name="/light"><interface name="org.example.Light"><method name="Toggle"><annotation name="org.alljoyn.Bus.Action" value="Modify"/></method></interface></node></rules>"#;

    fn configurator() -> PermissionConfigurator {
        let configurator = PermissionConfigurator::with_signer(
            Arc::new(P256Signer::generate()),
            SecurityConfig::default(),
        );
        configurator.enable_peer_security();
        configurator
    }

    #[derive(Default)]
    struct Counter {
        resets: AtomicUsize,
        policy_changes: AtomicUsize,
    }

    impl ConfigurationListener for Counter {
        fn factory_reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn policy_changed(&self) {
            self.policy_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn policy(serial: u32) -> Policy {
        Policy::new(serial, vec![Acl::new(vec![Peer::any_trusted()], vec![Rule::allow_all()])])
    }

    #[test]
    fn test_requires_security_enabled() {
        let configurator = PermissionConfigurator::with_signer(
            Arc::new(P256Signer::generate()),
            SecurityConfig::default(),
        );
        assert_matches!(
            configurator.application_state(),
            Err(PermissionError::FeatureNotAvailable { .. })
        );
        assert_matches!(
            configurator.set_manifest_template_from_xml(TEMPLATE),
            Err(PermissionError::FeatureNotAvailable { .. })
        );
        configurator.enable_peer_security();
        assert_eq!(configurator.application_state().unwrap(), ApplicationState::NotClaimable);
    }

    #[test]
    fn test_template_makes_peer_claimable() {
        let configurator = configurator();
        assert!(configurator.manifest_template().unwrap().is_empty());
        assert!(configurator.manifest_template_as_xml().is_err());

        configurator.set_manifest_template_from_xml(TEMPLATE).unwrap();
        assert_eq!(configurator.application_state().unwrap(), ApplicationState::Claimable);
        assert_eq!(configurator.manifest_template().unwrap().len(), 1);
        let xml = configurator.manifest_template_as_xml().unwrap();
        assert_eq!(xml_to_rules(&xml).unwrap(), configurator.manifest_template().unwrap());
        assert_eq!(configurator.manifest_template_digest().unwrap().len(), 32);

        assert!(configurator.set_manifest_template_from_xml("<rules/>").is_err());
        assert_eq!(configurator.manifest_template().unwrap().len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let configurator = configurator();
        configurator.set_application_state(ApplicationState::Claimable).unwrap();
        configurator.set_application_state(ApplicationState::NotClaimable).unwrap();
        assert_matches!(
            configurator.set_application_state(ApplicationState::Claimed),
            Err(PermissionError::InvalidData { .. })
        );
        assert_matches!(
            configurator.set_application_state(ApplicationState::NeedUpdate),
            Err(PermissionError::InvalidData { .. })
        );
    }

    #[test]
    fn test_claim_capabilities_survive_reset() {
        let configurator = configurator();
        assert_eq!(configurator.claim_capabilities().unwrap(), ClaimCapabilities::default());
        let caps = ClaimCapabilities::ECDSA_AUTH | ClaimCapabilities::PSK_AUTH;
        configurator.set_claim_capabilities(caps).unwrap();
        configurator
            .set_claim_capability_additional_info(
                ClaimCapabilityAdditionalInfo::PASSWORD_GENERATED_BY_APPLICATION,
            )
            .unwrap();
        configurator.reset().unwrap();
        assert_eq!(configurator.claim_capabilities().unwrap(), caps);
        assert_eq!(
            configurator.claim_capability_additional_info().unwrap(),
            ClaimCapabilityAdditionalInfo::PASSWORD_GENERATED_BY_APPLICATION
        );
    }

    #[test]
    fn test_reset_target_state_follows_template() {
        let configurator = configurator();
        configurator.reset().unwrap();
        assert_eq!(configurator.application_state().unwrap(), ApplicationState::NotClaimable);
        configurator.set_manifest_template_from_xml(TEMPLATE).unwrap();
        configurator.reset().unwrap();
        assert_eq!(configurator.application_state().unwrap(), ApplicationState::Claimable);
    }

    #[test]
    fn test_policy_serial_must_increase() {
        let configurator = configurator();
        let counter = Arc::new(Counter::default());
        configurator.add_listener(counter.clone());

        assert_eq!(configurator.policy_version().unwrap(), 0);
        assert_matches!(
            configurator.install_policy(policy(0)),
            Err(PermissionError::PolicyNotNewer { .. })
        );
        configurator.install_policy(policy(5)).unwrap();
        assert_matches!(
            configurator.install_policy(policy(5)),
            Err(PermissionError::PolicyNotNewer { .. })
        );
        assert_matches!(
            configurator.install_policy(policy(4)),
            Err(PermissionError::PolicyNotNewer { .. })
        );
        configurator.install_policy(policy(6)).unwrap();
        assert_eq!(configurator.policy_version().unwrap(), 6);
        assert_eq!(counter.policy_changes.load(Ordering::SeqCst), 2);

        configurator.reset_policy().unwrap();
        assert_eq!(configurator.policy_version().unwrap(), 0);
        assert_eq!(configurator.policy().unwrap(), configurator.default_policy().unwrap());
        assert_eq!(counter.policy_changes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let configurator = configurator();
        let bad = Policy::new(3, vec![Acl::new(vec![Peer::all(), Peer::any_trusted()], vec![Rule::allow_all()])]);
        assert_matches!(
            configurator.install_policy(bad),
            Err(PermissionError::SchemaViolation(_))
        );
        assert_eq!(configurator.policy_version().unwrap(), 0);
    }

    #[test]
    fn test_listeners_may_reenter() {
        struct Reader(Arc<PermissionConfigurator>, AtomicUsize);
        impl ConfigurationListener for Reader {
            fn factory_reset(&self) {
                self.0.application_state().unwrap();
                self.1.fetch_add(1, Ordering::SeqCst);
            }
        }
        let configurator = Arc::new(configurator());
        let reader = Arc::new(Reader(configurator.clone(), AtomicUsize::new(0)));
        configurator.add_listener(reader.clone());
        configurator.reset().unwrap();
        assert_eq!(reader.1.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_management_bracket() {
        let configurator = configurator();
        assert_matches!(configurator.end_management(), Err(PermissionError::ManagementNotStarted));
        configurator.start_management().unwrap();
        assert_matches!(
            configurator.start_management(),
            Err(PermissionError::ManagementAlreadyStarted)
        );
        configurator.end_management().unwrap();
        configurator.start_management().unwrap();
    }

    #[test]
    fn test_management_bracket_owned_by_opener() {
        let configurator = configurator();
        let (first, second) = (
            Signer::public_key(&P256Signer::generate()),
            Signer::public_key(&P256Signer::generate()),
        );
        assert_matches!(
            configurator.end_management_for(&first),
            Err(PermissionError::ManagementNotStarted)
        );
        configurator.start_management_for(&first).unwrap();
        assert_matches!(
            configurator.start_management_for(&second),
            Err(PermissionError::ManagementAlreadyStarted)
        );
        assert_matches!(
            configurator.end_management_for(&second),
            Err(PermissionError::PermissionDenied { .. })
        );
        configurator.end_management_for(&first).unwrap();

        configurator.start_management().unwrap();
        assert_matches!(
            configurator.end_management_for(&first),
            Err(PermissionError::PermissionDenied { .. })
        );
        configurator.start_management_for(&first).unwrap_err();
        configurator.end_management().unwrap();
    }

    #[test]
    fn test_claim_requires_claimable() {
        let configurator = configurator();
        let key = configurator.signing_public_key().unwrap();
        let request = ClaimRequest {
            certificate_authority: key.clone(),
            admin_group_id: GroupId::random(),
            admin_group_authority: key,
            identity: Vec::new(),
            manifests: Vec::new(),
        };
        assert_matches!(configurator.claim(request), Err(PermissionError::PermissionDenied { .. }));
    }

    #[test]
    fn test_identity_operations_need_identity() {
        let configurator = configurator();
        assert!(configurator.identity().unwrap().is_empty());
        assert_matches!(
            configurator.identity_certificate_id(),
            Err(PermissionError::CertificateNotFound { .. })
        );
        assert_matches!(
            configurator.update_identity(Vec::new(), Vec::new()),
            Err(PermissionError::InvalidData { .. })
        );
        let manifest = Manifest::new(vec![Rule::allow_all()]);
        assert_matches!(
            configurator.install_manifests(vec![manifest], true),
            Err(PermissionError::CertificateNotFound { .. })
        );
    }

    #[test]
    fn test_sign_digest_uses_local_key() {
        let configurator = configurator();
        let signature = configurator.sign_digest(b"digest").unwrap();
        let key = configurator.signing_public_key().unwrap();
        assert!(configurator.verifier().verify(b"digest", &signature, &key.public_key));
    }
}
