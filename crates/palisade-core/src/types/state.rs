//! Application lifecycle state and claim configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Lifecycle of one managed peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApplicationState {
    /// No manifest template; claim requests are refused
    #[default]
    NotClaimable,
    /// Manifest template installed; claim requests are accepted
    Claimable,
    /// Claimed by a security manager
    Claimed,
    /// Claimed, but flagged for re-provisioning
    NeedUpdate,
}

impl ApplicationState {
    /// Wire value
    pub fn as_u16(self) -> u16 {
        match self {
            ApplicationState::NotClaimable => 0,
            ApplicationState::Claimable => 1,
            ApplicationState::Claimed => 2,
            ApplicationState::NeedUpdate => 3,
        }
    }

    /// Decode a wire value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(ApplicationState::NotClaimable),
            1 => Some(ApplicationState::Claimable),
            2 => Some(ApplicationState::Claimed),
            3 => Some(ApplicationState::NeedUpdate),
            _ => None,
        }
    }

    /// Whether a security manager owns this peer
    pub fn is_claimed(self) -> bool {
        matches!(
            self,
            ApplicationState::Claimed | ApplicationState::NeedUpdate
        )
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationState::NotClaimable => "NOT CLAIMABLE",
            ApplicationState::Claimable => "CLAIMABLE",
            ApplicationState::Claimed => "CLAIMED",
            ApplicationState::NeedUpdate => "NEED UPDATE",
        };
        f.write_str(name)
    }
}

/// Authentication mechanisms accepted during claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimCapabilities(u16);

impl ClaimCapabilities {
    /// Claim over an unauthenticated key exchange
    pub const NULL_AUTH: ClaimCapabilities = ClaimCapabilities(0x01);
    /// Claim with a pre-shared key
    pub const PSK_AUTH: ClaimCapabilities = ClaimCapabilities(0x02);
    /// Claim with an ECDSA certificate
    pub const ECDSA_AUTH: ClaimCapabilities = ClaimCapabilities(0x04);
    /// Claim with a SPEKE password
    pub const SPEKE_AUTH: ClaimCapabilities = ClaimCapabilities(0x08);

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Build from raw bits
    pub const fn from_bits(bits: u16) -> Self {
        ClaimCapabilities(bits)
    }

    /// Whether every mechanism in `other` is set
    pub const fn contains(self, other: ClaimCapabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ClaimCapabilities {
    fn default() -> Self {
        Self::NULL_AUTH | Self::PSK_AUTH | Self::SPEKE_AUTH
    }
}

impl BitOr for ClaimCapabilities {
    type Output = ClaimCapabilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        ClaimCapabilities(self.0 | rhs.0)
    }
}

/// Who generated the claim password or pre-shared key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClaimCapabilityAdditionalInfo(u16);

impl ClaimCapabilityAdditionalInfo {
    /// Password generated by the security manager
    pub const PASSWORD_GENERATED_BY_SECURITY_MANAGER: ClaimCapabilityAdditionalInfo =
        ClaimCapabilityAdditionalInfo(0x01);
    /// Password generated by the application
    pub const PASSWORD_GENERATED_BY_APPLICATION: ClaimCapabilityAdditionalInfo =
        ClaimCapabilityAdditionalInfo(0x02);

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Build from raw bits
    pub const fn from_bits(bits: u16) -> Self {
        ClaimCapabilityAdditionalInfo(bits)
    }
}

impl BitOr for ClaimCapabilityAdditionalInfo {
    type Output = ClaimCapabilityAdditionalInfo;

    fn bitor(self, rhs: Self) -> Self::Output {
        ClaimCapabilityAdditionalInfo(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_values() {
        for state in [
            ApplicationState::NotClaimable,
            ApplicationState::Claimable,
            ApplicationState::Claimed,
            ApplicationState::NeedUpdate,
        ] {
            assert_eq!(ApplicationState::from_u16(state.as_u16()), Some(state));
        }
        assert_eq!(ApplicationState::from_u16(4), None);
    }

    #[test]
    fn test_default_capabilities() {
        let caps = ClaimCapabilities::default();
        assert_eq!(caps.bits(), 0x0B);
        assert!(!caps.contains(ClaimCapabilities::ECDSA_AUTH));
        assert_eq!(ClaimCapabilityAdditionalInfo::default().bits(), 0);
    }
}
