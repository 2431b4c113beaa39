//! Claim and management of a remote peer
//!
//! Every operation is one blocking round trip over the [`BusTransport`].
//! Arguments are validated locally first so malformed input never reaches the
//! bus. Error replies are translated with [`PermissionError::from_remote`].

use palisade_core::wire::{interfaces, members, properties};
use palisade_core::{
    ApplicationState, ArgReader, BusTransport, CertificateId, ClaimCapabilities,
    ClaimCapabilityAdditionalInfo, KeyInfo, Manifest, MsgArg, PermissionError, Policy, Result,
    RpcError, Rule, SecurityConfig, Signer,
};
use palisade_trust::{
    chain_from_der, compute_manifest_digest_xml, parse_group_id, set_manifest_signature_xml,
    sign_manifest_xml, Certificate, Sha256Hasher,
};
use palisade_xml::{rules_to_xml, validate_policy, xml_array_to_manifests, xml_to_policy};
use std::sync::Arc;

fn remote_error(err: RpcError) -> PermissionError {
    tracing::debug!(name = %err.name, description = %err.description, "remote error reply");
    PermissionError::from_remote(err)
}

fn certificates_arg(chain: &[Certificate]) -> MsgArg {
    MsgArg::byte_array_list(chain.iter().map(|cert| cert.der().to_vec()))
}

fn require_chain(chain: &[Certificate], what: &str) -> Result<()> {
    if chain.is_empty() {
        return Err(PermissionError::invalid_data(format!("{what} chain is empty")));
    }
    Ok(())
}

/// Parse manifests locally; an empty list is `InvalidData`
fn require_manifests<S: AsRef<str>>(manifests: &[S]) -> Result<MsgArg> {
    if manifests.is_empty() {
        return Err(PermissionError::invalid_data("at least one manifest is required"));
    }
    xml_array_to_manifests(manifests)?;
    Ok(MsgArg::string_list(manifests.iter().map(|xml| xml.as_ref().to_string())))
}

/// Client for the security interfaces of one remote peer
pub struct ClaimProxy {
    transport: Arc<dyn BusTransport>,
    config: SecurityConfig,
}

impl std::fmt::Debug for ClaimProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimProxy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ClaimProxy {
    /// Proxy over `transport`
    pub fn new(transport: Arc<dyn BusTransport>, config: SecurityConfig) -> Self {
        Self { transport, config }
    }

    fn call(&self, interface: &str, member: &str, args: Vec<MsgArg>) -> Result<Vec<MsgArg>> {
        tracing::debug!(interface, member, "security call");
        self.transport
            .method_call(interface, member, args, self.config.rpc_timeout())
            .map_err(remote_error)
    }

    fn call_unit(&self, interface: &str, member: &str, args: Vec<MsgArg>) -> Result<()> {
        let reply = self.call(interface, member, args)?;
        ArgReader::new(&reply).finish().map_err(remote_error)
    }

    fn property(&self, interface: &str, property: &str) -> Result<MsgArg> {
        self.transport
            .get_property(interface, property, self.config.rpc_timeout())
            .map_err(remote_error)
    }

    fn read_property<T>(
        &self,
        interface: &str,
        property: &str,
        read: impl FnOnce(&mut ArgReader<'_>) -> std::result::Result<T, RpcError>,
    ) -> Result<T> {
        let value = self.property(interface, property)?;
        let values = std::slice::from_ref(&value);
        let mut reader = ArgReader::new(values);
        let decoded = read(&mut reader).map_err(remote_error)?;
        reader.finish().map_err(remote_error)?;
        Ok(decoded)
    }

    // --- claim --------------------------------------------------------------

    /// Claim the remote peer
    ///
    /// The admin group id must be exactly 16 bytes; its content is not
    /// checked. The identity chain and manifest list must be non-empty and
    /// every manifest must parse.
    pub fn claim<S: AsRef<str>>(
        &self,
        certificate_authority: &KeyInfo,
        admin_group_id: &[u8],
        admin_group_authority: &KeyInfo,
        identity: &[Certificate],
        manifests: &[S],
    ) -> Result<()> {
        let group = parse_group_id(admin_group_id)?;
        require_chain(identity, "identity")?;
        let manifests = require_manifests(manifests)?;
        tracing::info!(%group, "claiming peer");
        self.call_unit(
            interfaces::CLAIMABLE,
            members::CLAIM,
            vec![
                MsgArg::KeyInfo(certificate_authority.clone()),
                MsgArg::Bytes(group.as_bytes().to_vec()),
                MsgArg::KeyInfo(admin_group_authority.clone()),
                certificates_arg(identity),
                manifests,
            ],
        )
    }

    /// Return the remote peer to its unclaimed state
    pub fn reset(&self) -> Result<()> {
        self.call_unit(interfaces::MANAGED, members::RESET, Vec::new())
    }

    // --- identity and manifests ---------------------------------------------

    /// Replace the remote identity and its manifests
    pub fn update_identity<S: AsRef<str>>(
        &self,
        identity: &[Certificate],
        manifests: &[S],
    ) -> Result<()> {
        require_chain(identity, "identity")?;
        let manifests = require_manifests(manifests)?;
        self.call_unit(
            interfaces::MANAGED,
            members::UPDATE_IDENTITY,
            vec![certificates_arg(identity), manifests],
        )
    }

    /// Append signed manifests to the remote set
    pub fn install_manifests<S: AsRef<str>>(&self, manifests: &[S]) -> Result<()> {
        let manifests = require_manifests(manifests)?;
        self.call_unit(interfaces::MANAGED, members::INSTALL_MANIFESTS, vec![manifests])
    }

    // --- policy -------------------------------------------------------------

    /// Install a policy; its serial must exceed the remote one
    pub fn update_policy(&self, policy: &Policy) -> Result<()> {
        validate_policy(policy)?;
        tracing::info!(serial = policy.serial_number, "updating remote policy");
        self.call_unit(
            interfaces::MANAGED,
            members::UPDATE_POLICY,
            vec![MsgArg::Policy(policy.clone())],
        )
    }

    /// Install a policy given as XML
    pub fn update_policy_from_xml(&self, xml: &str) -> Result<()> {
        self.update_policy(&xml_to_policy(xml)?)
    }

    /// Restore the remote default policy
    pub fn reset_policy(&self) -> Result<()> {
        self.call_unit(interfaces::MANAGED, members::RESET_POLICY, Vec::new())
    }

    // --- memberships --------------------------------------------------------

    /// Install a membership chain, leaf first
    pub fn install_membership(&self, chain: &[Certificate]) -> Result<()> {
        require_chain(chain, "membership")?;
        self.call_unit(
            interfaces::MANAGED,
            members::INSTALL_MEMBERSHIP,
            vec![certificates_arg(chain)],
        )
    }

    /// Remove the membership `serial` issued by `issuer`
    pub fn remove_membership(&self, serial: &[u8], issuer: &KeyInfo) -> Result<()> {
        if serial.is_empty() {
            return Err(PermissionError::invalid_data("serial number is empty"));
        }
        self.call_unit(
            interfaces::MANAGED,
            members::REMOVE_MEMBERSHIP,
            vec![MsgArg::Bytes(serial.to_vec()), MsgArg::KeyInfo(issuer.clone())],
        )
    }

    // --- management session -------------------------------------------------

    /// Open the remote management bracket
    pub fn start_management(&self) -> Result<()> {
        self.call_unit(interfaces::MANAGED, members::START_MANAGEMENT, Vec::new())
    }

    /// Close the remote management bracket
    pub fn end_management(&self) -> Result<()> {
        self.call_unit(interfaces::MANAGED, members::END_MANAGEMENT, Vec::new())
    }

    // --- properties ---------------------------------------------------------

    /// Remote lifecycle state
    pub fn application_state(&self) -> Result<ApplicationState> {
        let value = self.read_property(
            interfaces::APPLICATION,
            properties::APPLICATION_STATE,
            |reader| reader.u16(),
        )?;
        ApplicationState::from_u16(value).ok_or_else(|| {
            PermissionError::invalid_data(format!("unknown application state {value}"))
        })
    }

    /// Remote claim capabilities
    pub fn claim_capabilities(&self) -> Result<ClaimCapabilities> {
        self.read_property(
            interfaces::CLAIMABLE,
            properties::CLAIM_CAPABILITIES,
            |reader| reader.u16(),
        )
        .map(ClaimCapabilities::from_bits)
    }

    /// Remote claim capability additional info
    pub fn claim_capability_additional_info(&self) -> Result<ClaimCapabilityAdditionalInfo> {
        self.read_property(
            interfaces::CLAIMABLE,
            properties::CLAIM_CAPABILITY_ADDITIONAL_INFO,
            |reader| reader.u16(),
        )
        .map(ClaimCapabilityAdditionalInfo::from_bits)
    }

    /// Remote manifest template
    pub fn manifest_template(&self) -> Result<Vec<Rule>> {
        self.read_property(
            interfaces::APPLICATION,
            properties::MANIFEST_TEMPLATE,
            |reader| reader.rules().map(<[Rule]>::to_vec),
        )
    }

    /// Remote manifest template as a `<rules>` document
    pub fn manifest_template_as_xml(&self) -> Result<String> {
        rules_to_xml(&self.manifest_template()?)
    }

    /// Digest of the remote manifest template
    pub fn manifest_template_digest(&self) -> Result<Vec<u8>> {
        self.read_property(
            interfaces::APPLICATION,
            properties::MANIFEST_TEMPLATE_DIGEST,
            |reader| reader.bytes().map(<[u8]>::to_vec),
        )
    }

    /// Remote peer's public key
    pub fn ecc_public_key(&self) -> Result<KeyInfo> {
        self.read_property(interfaces::APPLICATION, properties::ECC_PUBLIC_KEY, |reader| {
            reader.key_info().cloned()
        })
    }

    /// Remote identity chain, leaf first
    pub fn identity(&self) -> Result<Vec<Certificate>> {
        let ders = self.read_property(interfaces::MANAGED, properties::IDENTITY, |reader| {
            reader
                .byte_array_list()
                .map(|list| list.into_iter().map(<[u8]>::to_vec).collect::<Vec<_>>())
        })?;
        if ders.is_empty() {
            return Ok(Vec::new());
        }
        chain_from_der(&ders)
    }

    /// Remote manifests
    pub fn manifests(&self) -> Result<Vec<Manifest>> {
        let documents = self.read_property(interfaces::MANAGED, properties::MANIFESTS, |reader| {
            reader
                .string_list()
                .map(|list| list.into_iter().map(str::to_string).collect::<Vec<_>>())
        })?;
        xml_array_to_manifests(&documents)
    }

    /// Id of the remote identity leaf
    pub fn identity_certificate_id(&self) -> Result<CertificateId> {
        self.read_property(
            interfaces::MANAGED,
            properties::IDENTITY_CERTIFICATE_ID,
            |reader| reader.certificate_id(),
        )
    }

    /// Serial number of the remote policy
    pub fn policy_version(&self) -> Result<u32> {
        self.read_property(interfaces::MANAGED, properties::POLICY_VERSION, |reader| reader.u32())
    }

    /// Remote policy in effect
    pub fn policy(&self) -> Result<Policy> {
        self.read_property(interfaces::MANAGED, properties::POLICY, |reader| {
            reader.policy().cloned()
        })
    }

    /// Remote default policy
    pub fn default_policy(&self) -> Result<Policy> {
        self.read_property(interfaces::MANAGED, properties::DEFAULT_POLICY, |reader| {
            reader.policy().cloned()
        })
    }

    /// Ids of the remote membership certificates
    pub fn membership_summaries(&self) -> Result<Vec<CertificateId>> {
        self.read_property(
            interfaces::MANAGED,
            properties::MEMBERSHIP_SUMMARIES,
            |reader| reader.certificate_id_list(),
        )
    }

    // --- manifest signing ---------------------------------------------------

    /// Bind an unsigned rules document to `identity`, sign it and emit manifest XML
    pub fn sign_manifest(
        unsigned_xml: &str,
        identity: &Certificate,
        signer: &dyn Signer,
    ) -> Result<String> {
        sign_manifest_xml(unsigned_xml, identity, signer, &Sha256Hasher)
    }

    /// Digest a separate key holder must sign
    pub fn compute_manifest_digest(unsigned_xml: &str, identity: &Certificate) -> Result<Vec<u8>> {
        compute_manifest_digest_xml(unsigned_xml, identity, &Sha256Hasher)
    }

    /// Attach a signature over [`ClaimProxy::compute_manifest_digest`]
    pub fn set_manifest_signature(
        unsigned_xml: &str,
        identity: &Certificate,
        signature: &[u8],
    ) -> Result<String> {
        set_manifest_signature_xml(unsigned_xml, identity, signature, &Sha256Hasher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::wire::error_names;
    use palisade_core::{Acl, Peer};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport answering every call with a fixed reply
    struct Scripted {
        reply: std::result::Result<Vec<MsgArg>, RpcError>,
        property: std::result::Result<MsgArg, RpcError>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(
            reply: std::result::Result<Vec<MsgArg>, RpcError>,
            property: std::result::Result<MsgArg, RpcError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                reply,
                property,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl BusTransport for Scripted {
        fn method_call(
            &self,
            _interface: &str,
            _member: &str,
            _args: Vec<MsgArg>,
            timeout: Duration,
        ) -> std::result::Result<Vec<MsgArg>, RpcError> {
            assert_eq!(timeout, Duration::from_millis(10_000));
            *self.calls.lock().unwrap() += 1;
            self.reply.clone()
        }

        fn get_property(
            &self,
            _interface: &str,
            _property: &str,
            _timeout: Duration,
        ) -> std::result::Result<MsgArg, RpcError> {
            *self.calls.lock().unwrap() += 1;
            self.property.clone()
        }
    }

    fn proxy(transport: Arc<Scripted>) -> ClaimProxy {
        ClaimProxy::new(transport, SecurityConfig::default())
    }

    #[test]
    fn test_local_validation_precedes_rpc() {
        let transport = Scripted::new(Ok(Vec::new()), Ok(MsgArg::U16(0)));
        let proxy = proxy(transport.clone());
        let bad = Policy::new(
            2,
            vec![Acl::new(vec![Peer::any_trusted(), Peer::any_trusted()], vec![Rule::allow_all()])],
        );
        assert!(matches!(
            proxy.update_policy(&bad),
            Err(PermissionError::SchemaViolation(_))
        ));
        assert!(matches!(
            proxy.install_manifests::<&str>(&[]),
            Err(PermissionError::InvalidData { .. })
        ));
        assert!(matches!(
            proxy.install_membership(&[]),
            Err(PermissionError::InvalidData { .. })
        ));
        assert!(matches!(
            proxy.install_manifests(&["<manifest/>"]),
            Err(PermissionError::SchemaViolation(_))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_remote_errors_translate() {
        let transport = Scripted::new(
            Err(RpcError::new(error_names::MANAGEMENT_ALREADY_STARTED, "busy")),
            Err(RpcError::new("com.example.Unheard", "no idea")),
        );
        let proxy = proxy(transport);
        assert_eq!(proxy.start_management(), Err(PermissionError::ManagementAlreadyStarted));
        assert_eq!(
            proxy.policy_version(),
            Err(PermissionError::RpcFailure {
                name: "com.example.Unheard".to_string(),
                description: "no idea".to_string(),
            })
        );
    }

    #[test]
    fn test_reply_shape_checked() {
        let transport = Scripted::new(Ok(vec![MsgArg::U8(1)]), Ok(MsgArg::Str("x".into())));
        let proxy = proxy(transport);
        assert!(matches!(proxy.reset(), Err(PermissionError::RpcFailure { .. })));
        assert!(matches!(
            proxy.application_state(),
            Err(PermissionError::RpcFailure { .. })
        ));
    }

    #[test]
    fn test_unknown_state_value() {
        let transport = Scripted::new(Ok(Vec::new()), Ok(MsgArg::U16(9)));
        assert!(matches!(
            proxy(transport).application_state(),
            Err(PermissionError::InvalidData { .. })
        ));
    }
}
