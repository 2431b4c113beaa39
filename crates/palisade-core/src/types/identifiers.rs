//! Security group ids, certificate ids and trust anchors

use super::keys::{EccPublicKey, KeyInfo};
use crate::{PermissionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length in bytes of a security group id
pub const GROUP_ID_LEN: usize = 16;

/// 128-bit security group identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Build from raw bytes; only the length is checked
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Uuid::from_slice(bytes)
            .map(GroupId)
            .map_err(|_| PermissionError::InvalidGuid {
                length: bytes.len(),
            })
    }

    /// Parse a textual GUID (32 hex digits, hyphens optional)
    pub fn parse(text: &str) -> Result<Self> {
        Uuid::parse_str(text.trim())
            .map(GroupId)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid GUID '{text}': {e}")))
    }

    /// Fresh random group id
    pub fn random() -> Self {
        GroupId(Uuid::new_v4())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; GROUP_ID_LEN] {
        self.0.as_bytes()
    }
}

impl From<[u8; GROUP_ID_LEN]> for GroupId {
    fn from(bytes: [u8; GROUP_ID_LEN]) -> Self {
        GroupId(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0.simple())
    }
}

/// Compact identity of an installed certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateId {
    /// Serial number bytes
    pub serial: Vec<u8>,
    /// Issuer public key, when known
    pub issuer_public_key: Option<EccPublicKey>,
    /// Authority key identifier of the issuer
    pub issuer_key_id: Vec<u8>,
}

impl CertificateId {
    /// Whether this id names the certificate `serial` issued by `issuer`
    pub fn matches(&self, serial: &[u8], issuer: &KeyInfo) -> bool {
        if self.serial != serial {
            return false;
        }
        if !self.issuer_key_id.is_empty() && !issuer.key_id.is_empty() {
            return self.issuer_key_id == issuer.key_id;
        }
        self.issuer_public_key.as_ref() == Some(&issuer.public_key)
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serial {} issuer {}",
            hex::encode(&self.serial),
            hex::encode(&self.issuer_key_id)
        )
    }
}

/// Kind of trust anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustAnchorKind {
    /// Root of identity certificates
    CertificateAuthority,
    /// Root of membership certificates for one security group
    SecurityGroupAuthority,
}

/// Public key rooting a chain of trust
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// Anchor kind
    pub kind: TrustAnchorKind,
    /// Anchor public key
    pub key_info: KeyInfo,
    /// Security group, for group authorities
    pub security_group_id: Option<GroupId>,
}

impl TrustAnchor {
    /// Certificate authority anchor
    pub fn certificate_authority(key_info: KeyInfo) -> Self {
        Self {
            kind: TrustAnchorKind::CertificateAuthority,
            key_info,
            security_group_id: None,
        }
    }

    /// Security group authority anchor
    pub fn security_group(key_info: KeyInfo, group: GroupId) -> Self {
        Self {
            kind: TrustAnchorKind::SecurityGroupAuthority,
            key_info,
            security_group_id: Some(group),
        }
    }
}
