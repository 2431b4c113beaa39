//! Policy validator and converter
//!
//! ```xml
//! <policy>
//!     <policyVersion>1</policyVersion>
//!     <serialNumber>10</serialNumber>
//!     <acls>
//!         <acl>
//!             <peers>
//!                 <peer><type>WITH_PUBLIC_KEY</type><publicKey>PEM</publicKey></peer>
//!             </peers>
//!             <rules>...</rules>
//!         </acl>
//!     </acls>
//! </policy>
//! ```
//!
//! Peer lists are checked with a fold: whether peer `i` is legal depends on
//! which peers came before it, so the running state is threaded through
//! [`PeerScan`] instead of living on the per-kind checks.

use crate::element::XmlElement;
use crate::rules::{element_to_rules, rules_to_element, validate_rules, RULES_ELEMENT};
use crate::validator::{
    parse_u32_content, validate_child_count, validate_element_name,
    validate_positive_child_count,
};
use palisade_core::{
    Acl, EccPublicKey, GroupId, KeyInfo, Peer, PeerKind, PermissionError, Policy, Result,
    ViolationKind, POLICY_VERSION,
};
use std::collections::BTreeSet;

/// Root element of a policy
pub const POLICY_ELEMENT: &str = "policy";
/// Policy version element
pub const POLICY_VERSION_ELEMENT: &str = "policyVersion";
/// Serial number element
pub const SERIAL_NUMBER_ELEMENT: &str = "serialNumber";
/// ACL list element
pub const ACLS_ELEMENT: &str = "acls";
/// ACL element
pub const ACL_ELEMENT: &str = "acl";
/// Peer list element
pub const PEERS_ELEMENT: &str = "peers";
/// Peer element
pub const PEER_ELEMENT: &str = "peer";
/// Peer type element
pub const TYPE_ELEMENT: &str = "type";
/// Peer public key element
pub const PUBLIC_KEY_ELEMENT: &str = "publicKey";
/// Peer security group element
pub const SGID_ELEMENT: &str = "sgID";

/// Running state of the peer-list fold
#[derive(Debug, Default)]
pub struct PeerScan {
    admitted: usize,
    all_seen: bool,
    any_trusted_seen: bool,
    authorities: BTreeSet<EccPublicKey>,
    keys: BTreeSet<EccPublicKey>,
    memberships: BTreeSet<(EccPublicKey, GroupId)>,
}

fn conflict(message: impl Into<String>) -> PermissionError {
    PermissionError::schema(ViolationKind::PeerConflict, message)
}

fn peer_key(peer: &Peer) -> Result<&EccPublicKey> {
    peer.public_key.as_ref().map(|k| &k.public_key).ok_or_else(|| {
        PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("{} peer has no public key", peer.kind),
        )
    })
}

fn peer_group(peer: &Peer) -> Result<GroupId> {
    peer.security_group_id.ok_or_else(|| {
        PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("{} peer has no security group", peer.kind),
        )
    })
}

impl PeerScan {
    /// Admit the next peer, or explain why it conflicts with earlier ones
    pub fn admit(mut self, peer: &Peer) -> Result<Self> {
        if self.all_seen {
            return Err(conflict("an ALL peer must be the only peer of its ACL"));
        }
        let fresh = match peer.kind {
            PeerKind::All => {
                if self.admitted > 0 {
                    return Err(conflict("an ALL peer must be the only peer of its ACL"));
                }
                self.all_seen = true;
                true
            }
            PeerKind::AnyTrusted => !std::mem::replace(&mut self.any_trusted_seen, true),
            PeerKind::FromCertificateAuthority => self.authorities.insert(peer_key(peer)?.clone()),
            PeerKind::WithPublicKey => self.keys.insert(peer_key(peer)?.clone()),
            PeerKind::WithMembership => self
                .memberships
                .insert((peer_key(peer)?.clone(), peer_group(peer)?)),
        };
        if !fresh {
            tracing::debug!(kind = %peer.kind, "duplicate peer");
            return Err(PermissionError::schema(
                ViolationKind::Duplicate,
                format!("duplicate {} peer", peer.kind),
            ));
        }
        self.admitted += 1;
        Ok(self)
    }
}

/// Check that a decoded peer carries exactly the fields its kind needs
fn validate_peer_fields(peer: &Peer) -> Result<()> {
    if peer.kind.requires_public_key() {
        peer_key(peer)?;
    } else if peer.public_key.is_some() {
        return Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("{} peer may not carry a public key", peer.kind),
        ));
    }
    match (peer.kind, peer.security_group_id) {
        (PeerKind::WithMembership, None) => peer_group(peer).map(|_| ()),
        (PeerKind::WithMembership, Some(_)) | (_, None) => Ok(()),
        (kind, Some(_)) => Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("{kind} peer may not carry a security group"),
        )),
    }
}

/// Validate a decoded policy (for example one received over RPC)
pub fn validate_policy(policy: &Policy) -> Result<()> {
    if policy.version != POLICY_VERSION {
        return Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("policy version must be {POLICY_VERSION}, found {}", policy.version),
        ));
    }
    if policy.acls.is_empty() {
        return Err(PermissionError::schema(ViolationKind::Empty, "policy has no ACLs"));
    }
    for acl in &policy.acls {
        if acl.peers.is_empty() {
            return Err(PermissionError::schema(ViolationKind::Empty, "ACL has no peers"));
        }
        acl.peers.iter().try_fold(PeerScan::default(), |scan, peer| {
            validate_peer_fields(peer)?;
            scan.admit(peer)
        })?;
        validate_rules(&acl.rules)?;
    }
    Ok(())
}

/// Validate a `<policy>` document root
pub fn validate_policy_xml(root: &XmlElement) -> Result<()> {
    element_to_policy(root).map(|_| ())
}

/// Parse and validate a policy document
pub fn xml_to_policy(xml: &str) -> Result<Policy> {
    element_to_policy(&XmlElement::parse(xml)?)
}

/// Validate `root` and convert it into a policy
pub fn element_to_policy(root: &XmlElement) -> Result<Policy> {
    validate_element_name(root, POLICY_ELEMENT)?;
    validate_child_count(root, 3)?;
    let children = root.children();

    validate_element_name(&children[0], POLICY_VERSION_ELEMENT)?;
    let version = parse_u32_content(&children[0])?;
    if version != POLICY_VERSION {
        return Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("policy version must be {POLICY_VERSION}, found {version}"),
        ));
    }

    validate_element_name(&children[1], SERIAL_NUMBER_ELEMENT)?;
    let serial_number = parse_u32_content(&children[1])?;

    let acls_element = &children[2];
    validate_element_name(acls_element, ACLS_ELEMENT)?;
    validate_positive_child_count(acls_element)?;
    let acls = acls_element
        .children()
        .iter()
        .map(element_to_acl)
        .collect::<Result<Vec<_>>>()?;

    Ok(Policy {
        version,
        serial_number,
        acls,
    })
}

fn element_to_acl(element: &XmlElement) -> Result<Acl> {
    validate_element_name(element, ACL_ELEMENT)?;
    validate_child_count(element, 2)?;
    let peers = element_to_peers(&element.children()[0])?;
    let rules = element_to_rules(&element.children()[1], RULES_ELEMENT)?;
    Ok(Acl::new(peers, rules))
}

fn element_to_peers(element: &XmlElement) -> Result<Vec<Peer>> {
    validate_element_name(element, PEERS_ELEMENT)?;
    validate_positive_child_count(element)?;
    let (_, peers) = element.children().iter().try_fold(
        (PeerScan::default(), Vec::new()),
        |(scan, mut peers), child| {
            let peer = element_to_peer(child)?;
            let scan = scan.admit(&peer)?;
            peers.push(peer);
            Ok::<_, PermissionError>((scan, peers))
        },
    )?;
    Ok(peers)
}

fn element_to_peer(element: &XmlElement) -> Result<Peer> {
    validate_element_name(element, PEER_ELEMENT)?;
    validate_positive_child_count(element)?;
    let children = element.children();

    validate_element_name(&children[0], TYPE_ELEMENT)?;
    let type_name = children[0].content();
    let kind = PeerKind::from_xml_name(type_name).ok_or_else(|| {
        PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("unknown peer type \"{type_name}\""),
        )
    })?;
    validate_child_count(element, kind.child_count())?;

    match kind {
        PeerKind::All => Ok(Peer::all()),
        PeerKind::AnyTrusted => Ok(Peer::any_trusted()),
        PeerKind::FromCertificateAuthority => {
            Ok(Peer::from_certificate_authority(peer_public_key(&children[1])?))
        }
        PeerKind::WithPublicKey => Ok(Peer::with_public_key(peer_public_key(&children[1])?)),
        PeerKind::WithMembership => Ok(Peer::with_membership(
            peer_public_key(&children[1])?,
            peer_security_group(&children[2])?,
        )),
    }
}

fn peer_public_key(element: &XmlElement) -> Result<KeyInfo> {
    validate_element_name(element, PUBLIC_KEY_ELEMENT)?;
    KeyInfo::from_pem(element.content()).map_err(|e| {
        PermissionError::schema(ViolationKind::InvalidValue, format!("bad peer public key: {e}"))
    })
}

fn peer_security_group(element: &XmlElement) -> Result<GroupId> {
    validate_element_name(element, SGID_ELEMENT)?;
    GroupId::parse(element.content()).map_err(|e| {
        PermissionError::schema(ViolationKind::InvalidValue, format!("bad security group: {e}"))
    })
}

/// Validate a policy and serialize it
pub fn policy_to_xml(policy: &Policy) -> Result<String> {
    Ok(policy_to_element(policy)?.to_xml_string())
}

/// Validate a policy and build its element tree
pub fn policy_to_element(policy: &Policy) -> Result<XmlElement> {
    validate_policy(policy)?;
    let mut acls = XmlElement::new(ACLS_ELEMENT);
    for acl in &policy.acls {
        let mut peers = XmlElement::new(PEERS_ELEMENT);
        for peer in &acl.peers {
            peers.push_child(peer_element(peer)?);
        }
        acls.push_child(
            XmlElement::new(ACL_ELEMENT)
                .with_child(peers)
                .with_child(rules_to_element(&acl.rules, RULES_ELEMENT)?),
        );
    }
    Ok(XmlElement::new(POLICY_ELEMENT)
        .with_child(
            XmlElement::new(POLICY_VERSION_ELEMENT).with_content(policy.version.to_string()),
        )
        .with_child(
            XmlElement::new(SERIAL_NUMBER_ELEMENT).with_content(policy.serial_number.to_string()),
        )
        .with_child(acls))
}

fn peer_element(peer: &Peer) -> Result<XmlElement> {
    let mut element = XmlElement::new(PEER_ELEMENT)
        .with_child(XmlElement::new(TYPE_ELEMENT).with_content(peer.kind.xml_name()));
    if let Some(key) = &peer.public_key {
        let pem = key.public_key.to_pem()?;
        element.push_child(XmlElement::new(PUBLIC_KEY_ELEMENT).with_content(pem.trim_end()));
    }
    if let Some(group) = &peer.security_group_id {
        element.push_child(XmlElement::new(SGID_ELEMENT).with_content(group.to_string()));
    }
    Ok(element)
}
