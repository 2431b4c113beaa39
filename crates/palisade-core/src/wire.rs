//! Bus vocabulary shared by the claim proxy and the managed application
//!
//! Interface, member, property and error names are fixed by the bus security
//! contract. Payloads are carried as [`MsgArg`] values; the envelope format is
//! owned by the transport.

use crate::types::{CertificateId, EccPublicKey, KeyInfo, Policy, Rule};
use serde::{Deserialize, Serialize};

/// Interface names of the three security surfaces
pub mod interfaces {
    /// Base application surface (state, version, public key)
    pub const APPLICATION: &str = "org.alljoyn.Bus.Security.Application";
    /// Surface exposed while the application can be claimed
    pub const CLAIMABLE: &str = "org.alljoyn.Bus.Security.ClaimableApplication";
    /// Surface exposed once the application is claimed
    pub const MANAGED: &str = "org.alljoyn.Bus.Security.ManagedApplication";
}

/// Method names
pub mod members {
    /// Claim an application
    pub const CLAIM: &str = "Claim";
    /// Factory reset
    pub const RESET: &str = "Reset";
    /// Replace identity certificate chain and manifests
    pub const UPDATE_IDENTITY: &str = "UpdateIdentity";
    /// Install a newer policy
    pub const UPDATE_POLICY: &str = "UpdatePolicy";
    /// Restore the default policy
    pub const RESET_POLICY: &str = "ResetPolicy";
    /// Install a membership certificate chain
    pub const INSTALL_MEMBERSHIP: &str = "InstallMembership";
    /// Remove a membership certificate
    pub const REMOVE_MEMBERSHIP: &str = "RemoveMembership";
    /// Open a management session
    pub const START_MANAGEMENT: &str = "StartManagement";
    /// Close a management session
    pub const END_MANAGEMENT: &str = "EndManagement";
    /// Append signed manifests
    pub const INSTALL_MANIFESTS: &str = "InstallManifests";
}

/// Property names
pub mod properties {
    /// Current application state
    pub const APPLICATION_STATE: &str = "ApplicationState";
    /// Claim capabilities
    pub const CLAIM_CAPABILITIES: &str = "ClaimCapabilities";
    /// Claim capability additional info
    pub const CLAIM_CAPABILITY_ADDITIONAL_INFO: &str = "ClaimCapabilityAdditionalInfo";
    /// Manifest template rules
    pub const MANIFEST_TEMPLATE: &str = "ManifestTemplate";
    /// Digest of the manifest template
    pub const MANIFEST_TEMPLATE_DIGEST: &str = "ManifestTemplateDigest";
    /// Application's own public key
    pub const ECC_PUBLIC_KEY: &str = "EccPublicKey";
    /// Identity certificate chain
    pub const IDENTITY: &str = "Identity";
    /// Installed signed manifests
    pub const MANIFESTS: &str = "Manifests";
    /// Version of the installed policy format
    pub const POLICY_VERSION: &str = "PolicyVersion";
    /// Installed policy
    pub const POLICY: &str = "Policy";
    /// Built-in default policy
    pub const DEFAULT_POLICY: &str = "DefaultPolicy";
    /// Installed membership certificate ids
    pub const MEMBERSHIP_SUMMARIES: &str = "MembershipSummaries";
    /// Id of the identity leaf certificate
    pub const IDENTITY_CERTIFICATE_ID: &str = "IdentityCertificateId";
}

/// Remote error names understood by the proxy
pub mod error_names {
    /// Caller not authorized
    pub const PERMISSION_DENIED: &str = "org.alljoyn.Bus.Security.Error.PermissionDenied";
    /// Certificate rejected
    pub const INVALID_CERTIFICATE: &str = "org.alljoyn.Bus.Security.Error.InvalidCertificate";
    /// Certificate usage rejected
    pub const INVALID_CERTIFICATE_USAGE: &str =
        "org.alljoyn.Bus.Security.Error.InvalidCertificateUsage";
    /// Manifest digest rejected
    pub const DIGEST_MISMATCH: &str = "org.alljoyn.Bus.Security.Error.DigestMismatch";
    /// Policy serial did not increase
    pub const POLICY_NOT_NEWER: &str = "org.alljoyn.Bus.Security.Error.PolicyNotNewer";
    /// Certificate not installed
    pub const CERTIFICATE_NOT_FOUND: &str = "org.alljoyn.Bus.Security.Error.CertificateNotFound";
    /// Certificate already installed
    pub const DUPLICATE_CERTIFICATE: &str = "org.alljoyn.Bus.Security.Error.DuplicateCertificate";
    /// Management session already open
    pub const MANAGEMENT_ALREADY_STARTED: &str =
        "org.alljoyn.Bus.Security.Error.ManagementAlreadyStarted";
    /// Management session not open
    pub const MANAGEMENT_NOT_STARTED: &str =
        "org.alljoyn.Bus.Security.Error.ManagementNotStarted";
    /// Catch-all for failures outside the security error set
    pub const GENERIC_FAILURE: &str = "org.alljoyn.Bus.ErStatus";
    /// Member or property not implemented by the remote object
    pub const UNKNOWN_MEMBER: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    /// Call timed out in the transport
    pub const TIMEOUT: &str = "org.alljoyn.Bus.Timeout";
}

/// Error reply received from, or sent to, a remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {description}")]
pub struct RpcError {
    /// Error name
    pub name: String,
    /// Free-form description
    pub description: String,
}

impl RpcError {
    /// Create a new error reply
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Reply for a member that the remote object does not implement
    pub fn unknown_member(interface: &str, member: &str) -> Self {
        Self::new(error_names::UNKNOWN_MEMBER, format!("{interface}.{member}"))
    }
}

/// One argument of a method call, reply or property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgArg {
    /// Boolean flag
    Bool(bool),
    /// Unsigned 8-bit value
    U8(u8),
    /// Unsigned 16-bit value
    U16(u16),
    /// Unsigned 32-bit value
    U32(u32),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    Str(String),
    /// Homogeneous array
    Array(Vec<MsgArg>),
    /// Fixed-shape tuple
    Struct(Vec<MsgArg>),
    /// Public key with key id
    KeyInfo(KeyInfo),
    /// Rule list
    Rules(Vec<Rule>),
    /// Policy
    Policy(Policy),
}

impl MsgArg {
    fn kind(&self) -> &'static str {
        match self {
            MsgArg::Bool(_) => "bool",
            MsgArg::U8(_) => "u8",
            MsgArg::U16(_) => "u16",
            MsgArg::U32(_) => "u32",
            MsgArg::Bytes(_) => "bytes",
            MsgArg::Str(_) => "string",
            MsgArg::Array(_) => "array",
            MsgArg::Struct(_) => "struct",
            MsgArg::KeyInfo(_) => "key info",
            MsgArg::Rules(_) => "rules",
            MsgArg::Policy(_) => "policy",
        }
    }

    /// Wrap a list of byte strings as an array argument
    pub fn byte_array_list(items: impl IntoIterator<Item = Vec<u8>>) -> Self {
        MsgArg::Array(items.into_iter().map(MsgArg::Bytes).collect())
    }

    /// Encode a certificate id as `(serial, issuer key id, issuer key)`
    ///
    /// The issuer key is an empty byte array when unknown.
    pub fn certificate_id(id: &CertificateId) -> Self {
        MsgArg::Struct(vec![
            MsgArg::Bytes(id.serial.clone()),
            MsgArg::Bytes(id.issuer_key_id.clone()),
            MsgArg::Bytes(
                id.issuer_public_key
                    .as_ref()
                    .map(|key| key.as_bytes().to_vec())
                    .unwrap_or_default(),
            ),
        ])
    }

    /// Wrap a list of strings as an array argument
    pub fn string_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        MsgArg::Array(items.into_iter().map(|s| MsgArg::Str(s.into())).collect())
    }
}

fn signature_error(expected: &str, found: Option<&MsgArg>) -> RpcError {
    let found = found.map_or("nothing", MsgArg::kind);
    RpcError::new(
        error_names::GENERIC_FAILURE,
        format!("signature mismatch: expected {expected}, found {found}"),
    )
}

fn decode_certificate_id(fields: &[MsgArg]) -> Result<CertificateId, RpcError> {
    let mut reader = ArgReader::new(fields);
    let serial = reader.bytes()?.to_vec();
    let issuer_key_id = reader.bytes()?.to_vec();
    let issuer_key = reader.bytes()?;
    reader.finish()?;
    let issuer_public_key = if issuer_key.is_empty() {
        None
    } else {
        Some(EccPublicKey::from_sec1_bytes(issuer_key).map_err(|e| {
            RpcError::new(error_names::GENERIC_FAILURE, format!("bad issuer key: {e}"))
        })?)
    };
    Ok(CertificateId {
        serial,
        issuer_public_key,
        issuer_key_id,
    })
}

/// Positional reader over method arguments or reply values
///
/// Every accessor returns an [`RpcError`] describing the mismatch so that a
/// malformed message is answered instead of panicking.
pub struct ArgReader<'a> {
    args: &'a [MsgArg],
    position: usize,
}

impl<'a> ArgReader<'a> {
    /// Read from the start of `args`
    pub fn new(args: &'a [MsgArg]) -> Self {
        Self { args, position: 0 }
    }

    fn next(&mut self) -> Option<&'a MsgArg> {
        let arg = self.args.get(self.position);
        self.position += 1;
        arg
    }

    /// Read a u8
    pub fn u8(&mut self) -> Result<u8, RpcError> {
        match self.next() {
            Some(MsgArg::U8(v)) => Ok(*v),
            other => Err(signature_error("u8", other)),
        }
    }

    /// Read a u16
    pub fn u16(&mut self) -> Result<u16, RpcError> {
        match self.next() {
            Some(MsgArg::U16(v)) => Ok(*v),
            other => Err(signature_error("u16", other)),
        }
    }

    /// Read a u32
    pub fn u32(&mut self) -> Result<u32, RpcError> {
        match self.next() {
            Some(MsgArg::U32(v)) => Ok(*v),
            other => Err(signature_error("u32", other)),
        }
    }

    /// Read a byte array
    pub fn bytes(&mut self) -> Result<&'a [u8], RpcError> {
        match self.next() {
            Some(MsgArg::Bytes(v)) => Ok(v),
            other => Err(signature_error("bytes", other)),
        }
    }

    /// Read a string
    pub fn str(&mut self) -> Result<&'a str, RpcError> {
        match self.next() {
            Some(MsgArg::Str(v)) => Ok(v),
            other => Err(signature_error("string", other)),
        }
    }

    /// Read a key info
    pub fn key_info(&mut self) -> Result<&'a KeyInfo, RpcError> {
        match self.next() {
            Some(MsgArg::KeyInfo(v)) => Ok(v),
            other => Err(signature_error("key info", other)),
        }
    }

    /// Read a rule list
    pub fn rules(&mut self) -> Result<&'a [Rule], RpcError> {
        match self.next() {
            Some(MsgArg::Rules(v)) => Ok(v),
            other => Err(signature_error("rules", other)),
        }
    }

    /// Read a policy
    pub fn policy(&mut self) -> Result<&'a Policy, RpcError> {
        match self.next() {
            Some(MsgArg::Policy(v)) => Ok(v),
            other => Err(signature_error("policy", other)),
        }
    }

    /// Read an array of byte arrays
    pub fn byte_array_list(&mut self) -> Result<Vec<&'a [u8]>, RpcError> {
        match self.next() {
            Some(MsgArg::Array(items)) => items
                .iter()
                .map(|item| match item {
                    MsgArg::Bytes(v) => Ok(v.as_slice()),
                    other => Err(signature_error("bytes", Some(other))),
                })
                .collect(),
            other => Err(signature_error("array of bytes", other)),
        }
    }

    /// Read an array of strings
    pub fn string_list(&mut self) -> Result<Vec<&'a str>, RpcError> {
        match self.next() {
            Some(MsgArg::Array(items)) => items
                .iter()
                .map(|item| match item {
                    MsgArg::Str(v) => Ok(v.as_str()),
                    other => Err(signature_error("string", Some(other))),
                })
                .collect(),
            other => Err(signature_error("array of strings", other)),
        }
    }

    /// Read one struct, returning its fields
    pub fn struct_fields(&mut self) -> Result<&'a [MsgArg], RpcError> {
        match self.next() {
            Some(MsgArg::Struct(fields)) => Ok(fields),
            other => Err(signature_error("struct", other)),
        }
    }

    /// Read a certificate id encoded by [`MsgArg::certificate_id`]
    pub fn certificate_id(&mut self) -> Result<CertificateId, RpcError> {
        decode_certificate_id(self.struct_fields()?)
    }

    /// Read an array of certificate ids
    pub fn certificate_id_list(&mut self) -> Result<Vec<CertificateId>, RpcError> {
        self.struct_list()?
            .into_iter()
            .map(decode_certificate_id)
            .collect()
    }

    /// Read an array of structs, returning each struct's fields
    pub fn struct_list(&mut self) -> Result<Vec<&'a [MsgArg]>, RpcError> {
        match self.next() {
            Some(MsgArg::Array(items)) => items
                .iter()
                .map(|item| match item {
                    MsgArg::Struct(fields) => Ok(fields.as_slice()),
                    other => Err(signature_error("struct", Some(other))),
                })
                .collect(),
            other => Err(signature_error("array of structs", other)),
        }
    }

    /// Fail if unread arguments remain
    pub fn finish(self) -> Result<(), RpcError> {
        if self.position < self.args.len() {
            return Err(RpcError::new(
                error_names::GENERIC_FAILURE,
                format!(
                    "signature mismatch: {} unexpected trailing arguments",
                    self.args.len() - self.position
                ),
            ));
        }
        Ok(())
    }
}
