//! Managed-application bus object
//!
//! Serves the three security interfaces of a peer on top of its
//! [`PermissionConfigurator`]. Every call arrives with the caller's
//! authenticated credentials; managed operations require the caller to prove
//! membership of the admin security group. A management bracket belongs to
//! the caller that opened it. Failures are answered with the remote error
//! names of [`PermissionError::to_remote`].

use crate::configurator::{ClaimRequest, PermissionConfigurator};
use palisade_core::wire::{error_names, interfaces, members, properties};
use palisade_core::{
    ArgReader, EccPublicKey, GroupId, MsgArg, PermissionError, Result, RpcError,
};
use palisade_trust::{chain_from_der, Certificate};
use palisade_xml::{manifests_to_xml_array, xml_array_to_manifests};
use std::sync::Arc;

/// Authenticated identity of the remote caller
#[derive(Debug, Clone)]
pub struct CallerCredentials {
    /// Key the caller authenticated with
    pub public_key: EccPublicKey,
    /// Membership chains the caller presented, leaf first
    pub memberships: Vec<Vec<Certificate>>,
}

impl CallerCredentials {
    /// Caller without memberships
    pub fn anonymous(public_key: EccPublicKey) -> Self {
        Self {
            public_key,
            memberships: Vec::new(),
        }
    }

    /// Add a membership chain
    pub fn with_membership(mut self, chain: Vec<Certificate>) -> Self {
        self.memberships.push(chain);
        self
    }
}

/// In-process implementation of the remote security contract
#[derive(Debug, Clone)]
pub struct ManagedApplication {
    configurator: Arc<PermissionConfigurator>,
}

fn reply_error(err: PermissionError) -> RpcError {
    tracing::debug!(error = %err, "security call rejected");
    err.to_remote()
}

fn decode_failure(err: PermissionError) -> RpcError {
    RpcError::new(error_names::GENERIC_FAILURE, err.to_string())
}

fn remote<T>(result: Result<T>) -> std::result::Result<T, RpcError> {
    result.map_err(reply_error)
}

fn certificates_arg(chain: &[Certificate]) -> MsgArg {
    MsgArg::byte_array_list(chain.iter().map(|cert| cert.der().to_vec()))
}

fn manifests_arg(xml: Vec<String>) -> MsgArg {
    MsgArg::string_list(xml)
}

impl ManagedApplication {
    /// Serve `configurator`
    pub fn new(configurator: Arc<PermissionConfigurator>) -> Self {
        Self { configurator }
    }

    /// Configurator behind this object
    pub fn configurator(&self) -> &Arc<PermissionConfigurator> {
        &self.configurator
    }

    /// Dispatch a method call
    pub fn handle_method_call(
        &self,
        caller: &CallerCredentials,
        interface: &str,
        member: &str,
        args: &[MsgArg],
    ) -> std::result::Result<Vec<MsgArg>, RpcError> {
        tracing::debug!(interface, member, args = args.len(), "security method call");
        match (interface, member) {
            (interfaces::CLAIMABLE, members::CLAIM) => self.claim(args),
            (interfaces::MANAGED, member) if is_managed_member(member) => {
                self.authorize(caller)?;
                self.managed_call(caller, member, args)
            }
            _ => Err(RpcError::unknown_member(interface, member)),
        }
    }

    /// Read a property
    pub fn get_property(
        &self,
        caller: &CallerCredentials,
        interface: &str,
        property: &str,
    ) -> std::result::Result<MsgArg, RpcError> {
        let configurator = &self.configurator;
        match (interface, property) {
            (interfaces::APPLICATION, properties::APPLICATION_STATE) => {
                Ok(MsgArg::U16(remote(configurator.application_state())?.as_u16()))
            }
            (interfaces::APPLICATION, properties::MANIFEST_TEMPLATE) => {
                Ok(MsgArg::Rules(remote(configurator.manifest_template())?))
            }
            (interfaces::APPLICATION, properties::MANIFEST_TEMPLATE_DIGEST) => {
                Ok(MsgArg::Bytes(remote(configurator.manifest_template_digest())?))
            }
            (interfaces::APPLICATION, properties::ECC_PUBLIC_KEY) => {
                Ok(MsgArg::KeyInfo(remote(configurator.signing_public_key())?))
            }
            (interfaces::CLAIMABLE, properties::CLAIM_CAPABILITIES) => {
                Ok(MsgArg::U16(remote(configurator.claim_capabilities())?.bits()))
            }
            (interfaces::CLAIMABLE, properties::CLAIM_CAPABILITY_ADDITIONAL_INFO) => Ok(
                MsgArg::U16(remote(configurator.claim_capability_additional_info())?.bits()),
            ),
            (interfaces::MANAGED, property) if is_managed_property(property) => {
                self.authorize(caller)?;
                self.managed_property(property)
            }
            _ => Err(RpcError::unknown_member(interface, property)),
        }
    }

    fn claim(&self, args: &[MsgArg]) -> std::result::Result<Vec<MsgArg>, RpcError> {
        let mut reader = ArgReader::new(args);
        let certificate_authority = reader.key_info()?.clone();
        let admin_group_id = GroupId::from_slice(reader.bytes()?).map_err(decode_failure)?;
        let admin_group_authority = reader.key_info()?.clone();
        let identity = remote(chain_from_der(&reader.byte_array_list()?))?;
        let manifests = remote(xml_array_to_manifests(&reader.string_list()?))?;
        reader.finish()?;

        remote(self.configurator.claim(ClaimRequest {
            certificate_authority,
            admin_group_id,
            admin_group_authority,
            identity,
            manifests,
        }))?;
        Ok(Vec::new())
    }

    /// Caller must hold an admin group membership on a claimed peer
    fn authorize(&self, caller: &CallerCredentials) -> std::result::Result<(), RpcError> {
        let state = remote(self.configurator.application_state())?;
        if !state.is_claimed() {
            return Err(reply_error(PermissionError::permission_denied(format!(
                "peer is {state}"
            ))));
        }
        let admitted = caller
            .memberships
            .iter()
            .any(|chain| self.configurator.is_admin(&caller.public_key, chain));
        if !admitted {
            return Err(reply_error(PermissionError::permission_denied(
                "caller is not a member of the admin group",
            )));
        }
        Ok(())
    }

    fn managed_call(
        &self,
        caller: &CallerCredentials,
        member: &str,
        args: &[MsgArg],
    ) -> std::result::Result<Vec<MsgArg>, RpcError> {
        let configurator = &self.configurator;
        let mut reader = ArgReader::new(args);
        match member {
            members::RESET => {
                reader.finish()?;
                remote(configurator.reset())?;
            }
            members::UPDATE_IDENTITY => {
                let identity = remote(chain_from_der(&reader.byte_array_list()?))?;
                let manifests = remote(xml_array_to_manifests(&reader.string_list()?))?;
                reader.finish()?;
                remote(configurator.update_identity(identity, manifests))?;
            }
            members::UPDATE_POLICY => {
                let policy = reader.policy()?.clone();
                reader.finish()?;
                remote(configurator.install_policy(policy))?;
            }
            members::RESET_POLICY => {
                reader.finish()?;
                remote(configurator.reset_policy())?;
            }
            members::INSTALL_MEMBERSHIP => {
                let chain = remote(chain_from_der(&reader.byte_array_list()?))?;
                reader.finish()?;
                remote(configurator.install_membership(chain))?;
            }
            members::REMOVE_MEMBERSHIP => {
                let serial = reader.bytes()?.to_vec();
                let issuer = reader.key_info()?.clone();
                reader.finish()?;
                remote(configurator.remove_membership(&serial, &issuer))?;
            }
            members::START_MANAGEMENT => {
                reader.finish()?;
                remote(configurator.start_management_for(&caller.public_key))?;
            }
            members::END_MANAGEMENT => {
                reader.finish()?;
                remote(configurator.end_management_for(&caller.public_key))?;
            }
            members::INSTALL_MANIFESTS => {
                let manifests = remote(xml_array_to_manifests(&reader.string_list()?))?;
                reader.finish()?;
                remote(configurator.install_manifests(manifests, true))?;
            }
            _ => return Err(RpcError::unknown_member(interfaces::MANAGED, member)),
        }
        Ok(Vec::new())
    }

    fn managed_property(&self, property: &str) -> std::result::Result<MsgArg, RpcError> {
        let configurator = &self.configurator;
        let value = match property {
            properties::IDENTITY => certificates_arg(&remote(configurator.identity())?),
            properties::MANIFESTS => manifests_arg(remote(
                configurator.manifests().and_then(|m| manifests_to_xml_array(&m)),
            )?),
            properties::IDENTITY_CERTIFICATE_ID => {
                MsgArg::certificate_id(&remote(configurator.identity_certificate_id())?)
            }
            properties::POLICY_VERSION => MsgArg::U32(remote(configurator.policy_version())?),
            properties::POLICY => MsgArg::Policy(remote(configurator.policy())?),
            properties::DEFAULT_POLICY => MsgArg::Policy(remote(configurator.default_policy())?),
            properties::MEMBERSHIP_SUMMARIES => MsgArg::Array(
                remote(configurator.membership_summaries())?
                    .iter()
                    .map(MsgArg::certificate_id)
                    .collect(),
            ),
            _ => return Err(RpcError::unknown_member(interfaces::MANAGED, property)),
        };
        Ok(value)
    }
}

fn is_managed_member(member: &str) -> bool {
    matches!(
        member,
        members::RESET
            | members::UPDATE_IDENTITY
            | members::UPDATE_POLICY
            | members::RESET_POLICY
            | members::INSTALL_MEMBERSHIP
            | members::REMOVE_MEMBERSHIP
            | members::START_MANAGEMENT
            | members::END_MANAGEMENT
            | members::INSTALL_MANIFESTS
    )
}

fn is_managed_property(property: &str) -> bool {
    matches!(
        property,
        properties::IDENTITY
            | properties::MANIFESTS
            | properties::IDENTITY_CERTIFICATE_ID
            | properties::POLICY_VERSION
            | properties::POLICY
            | properties::DEFAULT_POLICY
            | properties::MEMBERSHIP_SUMMARIES
    )
}
