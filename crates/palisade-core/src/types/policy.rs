//! Policy, ACL and peer model

use super::identifiers::GroupId;
use super::keys::KeyInfo;
use super::rules::{ActionMask, Member, MemberKind, Rule, WILDCARD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Only supported policy format version
pub const POLICY_VERSION: u32 = 1;

/// Matching rule deciding which remote identities an ACL applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeerKind {
    /// Every peer, authenticated or not
    All,
    /// Any authenticated peer
    AnyTrusted,
    /// Peers with an identity issued by the given authority
    FromCertificateAuthority,
    /// The peer holding the given key
    WithPublicKey,
    /// Members of the given security group
    WithMembership,
}

impl PeerKind {
    /// Every peer kind, in declaration order
    pub const ALL_KINDS: [PeerKind; 5] = [
        PeerKind::All,
        PeerKind::AnyTrusted,
        PeerKind::FromCertificateAuthority,
        PeerKind::WithPublicKey,
        PeerKind::WithMembership,
    ];

    /// XML `type` content for this kind
    pub fn xml_name(self) -> &'static str {
        match self {
            PeerKind::All => "ALL",
            PeerKind::AnyTrusted => "ANY_TRUSTED",
            PeerKind::FromCertificateAuthority => "FROM_CERTIFICATE_AUTHORITY",
            PeerKind::WithPublicKey => "WITH_PUBLIC_KEY",
            PeerKind::WithMembership => "WITH_MEMBERSHIP",
        }
    }

    /// Resolve XML `type` content
    pub fn from_xml_name(name: &str) -> Option<Self> {
        Self::ALL_KINDS
            .into_iter()
            .find(|kind| kind.xml_name() == name)
    }

    /// Number of children a `peer` element of this kind carries
    pub fn child_count(self) -> usize {
        match self {
            PeerKind::All | PeerKind::AnyTrusted => 1,
            PeerKind::FromCertificateAuthority | PeerKind::WithPublicKey => 2,
            PeerKind::WithMembership => 3,
        }
    }

    /// Whether peers of this kind are identified by a public key
    pub fn requires_public_key(self) -> bool {
        !matches!(self, PeerKind::All | PeerKind::AnyTrusted)
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xml_name())
    }
}

/// One peer entry of an ACL
///
/// A peer is identified by its public key alone. The constructors replace any
/// key identifier with the one derived from the key, which is the identifier
/// the XML form recovers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Matching rule
    pub kind: PeerKind,
    /// Public key for key-bearing kinds
    pub public_key: Option<KeyInfo>,
    /// Security group for membership peers
    pub security_group_id: Option<GroupId>,
}

impl Peer {
    /// `ALL` peer
    pub fn all() -> Self {
        Self {
            kind: PeerKind::All,
            public_key: None,
            security_group_id: None,
        }
    }

    /// `ANY_TRUSTED` peer
    pub fn any_trusted() -> Self {
        Self {
            kind: PeerKind::AnyTrusted,
            public_key: None,
            security_group_id: None,
        }
    }

    /// `FROM_CERTIFICATE_AUTHORITY` peer
    pub fn from_certificate_authority(authority: KeyInfo) -> Self {
        Self {
            kind: PeerKind::FromCertificateAuthority,
            public_key: Some(derived_key_id(authority)),
            security_group_id: None,
        }
    }

    /// `WITH_PUBLIC_KEY` peer
    pub fn with_public_key(key: KeyInfo) -> Self {
        Self {
            kind: PeerKind::WithPublicKey,
            public_key: Some(derived_key_id(key)),
            security_group_id: None,
        }
    }

    /// `WITH_MEMBERSHIP` peer
    pub fn with_membership(authority: KeyInfo, group: GroupId) -> Self {
        Self {
            kind: PeerKind::WithMembership,
            public_key: Some(derived_key_id(authority)),
            security_group_id: Some(group),
        }
    }
}

fn derived_key_id(key: KeyInfo) -> KeyInfo {
    KeyInfo::new(key.public_key)
}

/// Peers plus the rules granted to them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    /// Peers this ACL applies to
    pub peers: Vec<Peer>,
    /// Rules granted
    pub rules: Vec<Rule>,
}

impl Acl {
    /// Create an ACL
    pub fn new(peers: Vec<Peer>, rules: Vec<Rule>) -> Self {
        Self { peers, rules }
    }
}

/// Versioned, serial-numbered ACL list installed on a claimed peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    /// Format version
    pub version: u32,
    /// Serial number, strictly increasing across updates
    pub serial_number: u32,
    /// ACLs in evaluation order
    pub acls: Vec<Acl>,
}

impl Policy {
    /// Policy of the current format version
    pub fn new(serial_number: u32, acls: Vec<Acl>) -> Self {
        Self {
            version: POLICY_VERSION,
            serial_number,
            acls,
        }
    }

    /// Built-in policy of a peer that has not received one from its manager
    ///
    /// The admin group and the peer's own key get full access; the certificate
    /// authority and any trusted peer may only provide and observe.
    pub fn default_policy(
        certificate_authority: Option<&KeyInfo>,
        admin_group: Option<(&KeyInfo, GroupId)>,
        own_key: &KeyInfo,
    ) -> Self {
        let mut acls = Vec::new();
        if let Some((authority, group)) = admin_group {
            acls.push(Acl::new(
                vec![Peer::with_membership(authority.clone(), group)],
                vec![Rule::allow_all()],
            ));
        }
        if let Some(authority) = certificate_authority {
            acls.push(Acl::new(
                vec![Peer::from_certificate_authority(authority.clone())],
                vec![provide_and_observe()],
            ));
        }
        acls.push(Acl::new(vec![Peer::any_trusted()], vec![provide_and_observe()]));
        acls.push(Acl::new(
            vec![Peer::with_public_key(own_key.clone())],
            vec![Rule::allow_all()],
        ));
        Self::new(0, acls)
    }
}

fn provide_and_observe() -> Rule {
    Rule::new(
        WILDCARD,
        WILDCARD,
        vec![
            Member::new(WILDCARD, MemberKind::Method, ActionMask::PROVIDE),
            Member::new(WILDCARD, MemberKind::Property, ActionMask::PROVIDE),
            Member::new(
                WILDCARD,
                MemberKind::Signal,
                ActionMask::PROVIDE | ActionMask::OBSERVE,
            ),
        ],
    )
}
