//! Security data model
//!
//! Rules, manifests, policies and peers are plain values with no back
//! references; whoever holds one owns it.

pub mod identifiers;
pub mod keys;
pub mod manifest;
pub mod policy;
pub mod rules;
pub mod state;

pub use identifiers::{CertificateId, GroupId, TrustAnchor, TrustAnchorKind, GROUP_ID_LEN};
pub use keys::{EccPublicKey, KeyInfo, KEY_ID_LEN};
pub use manifest::{oids, Manifest, MANIFEST_VERSION};
pub use policy::{Acl, Peer, PeerKind, Policy, POLICY_VERSION};
pub use rules::{action_names, ActionMask, Member, MemberKind, Rule, WILDCARD};
pub use state::{ApplicationState, ClaimCapabilities, ClaimCapabilityAdditionalInfo};
