//! Rule and member model shared by manifests, templates and policy ACLs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Wildcard used for unnamed nodes, interfaces and members
pub const WILDCARD: &str = "*";

/// Bitset of actions a member grants
///
/// An empty mask is an explicit deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ActionMask(u8);

impl ActionMask {
    /// Explicit deny
    pub const DENY: ActionMask = ActionMask(0);
    /// Allowed to provide (implement) the member
    pub const PROVIDE: ActionMask = ActionMask(0x02);
    /// Allowed to observe signals and property reads
    pub const OBSERVE: ActionMask = ActionMask(0x04);
    /// Allowed to call methods and set properties
    pub const MODIFY: ActionMask = ActionMask(0x08);

    /// Raw bit representation
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, keeping only known actions
    pub const fn from_bits_truncate(bits: u8) -> Self {
        ActionMask(bits & (0x02 | 0x04 | 0x08))
    }

    /// Build from raw bits, rejecting unknown actions
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !(0x02 | 0x04 | 0x08) == 0 {
            Some(ActionMask(bits))
        } else {
            None
        }
    }

    /// Whether this is the deny mask
    pub const fn is_deny(self) -> bool {
        self.0 == 0
    }

    /// Whether every action in `other` is also in `self`
    pub const fn contains(self, other: ActionMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `self` only grants actions present in `allowed`
    pub const fn is_subset_of(self, allowed: ActionMask) -> bool {
        allowed.contains(self)
    }
}

impl BitOr for ActionMask {
    type Output = ActionMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        ActionMask(self.0 | rhs.0)
    }
}

/// Action annotation values as they appear in XML
pub mod action_names {
    /// Deny annotation value
    pub const DENY: &str = "Deny";
    /// Provide annotation value
    pub const PROVIDE: &str = "Provide";
    /// Observe annotation value
    pub const OBSERVE: &str = "Observe";
    /// Modify annotation value
    pub const MODIFY: &str = "Modify";
}

/// Kind of bus member a rule controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberKind {
    /// Method call
    Method,
    /// Property
    Property,
    /// Signal
    Signal,
    /// Kind not specified
    Unspecified,
}

impl MemberKind {
    /// XML element name for this kind
    pub fn xml_name(self) -> Option<&'static str> {
        match self {
            MemberKind::Method => Some("method"),
            MemberKind::Property => Some("property"),
            MemberKind::Signal => Some("signal"),
            MemberKind::Unspecified => None,
        }
    }

    /// Resolve an XML element name
    pub fn from_xml_name(name: &str) -> Option<Self> {
        match name {
            "method" => Some(MemberKind::Method),
            "property" => Some(MemberKind::Property),
            "signal" => Some(MemberKind::Signal),
            _ => None,
        }
    }

    /// Union of actions this kind may grant
    pub fn allowed_actions(self) -> ActionMask {
        match self {
            MemberKind::Method => ActionMask::PROVIDE | ActionMask::MODIFY,
            MemberKind::Property => ActionMask::PROVIDE | ActionMask::MODIFY | ActionMask::OBSERVE,
            MemberKind::Signal => ActionMask::PROVIDE | ActionMask::OBSERVE,
            MemberKind::Unspecified => ActionMask::DENY,
        }
    }

    /// Resolve an annotation value to the action it grants for this kind
    ///
    /// Returns `None` when the value is not allowed on this kind. `Deny` maps to
    /// the empty mask for every concrete kind.
    pub fn action_for(self, value: &str) -> Option<ActionMask> {
        let action = match value {
            action_names::DENY => ActionMask::DENY,
            action_names::PROVIDE => ActionMask::PROVIDE,
            action_names::OBSERVE => ActionMask::OBSERVE,
            action_names::MODIFY => ActionMask::MODIFY,
            _ => return None,
        };
        if self == MemberKind::Unspecified {
            return None;
        }
        if action.is_deny() || self.allowed_actions().contains(action) {
            Some(action)
        } else {
            None
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xml_name().unwrap_or("unspecified"))
    }
}

/// One controllable bus member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Member name or wildcard pattern
    pub name: String,
    /// Member kind
    pub kind: MemberKind,
    /// Actions granted
    pub action_mask: ActionMask,
}

impl Member {
    /// Create a member
    pub fn new(name: impl Into<String>, kind: MemberKind, action_mask: ActionMask) -> Self {
        Self {
            name: name.into(),
            kind,
            action_mask,
        }
    }

    /// Annotation values encoding this member's action mask, in canonical order
    pub fn action_names(&self) -> Vec<&'static str> {
        if self.action_mask.is_deny() {
            return vec![action_names::DENY];
        }
        [
            (ActionMask::PROVIDE, action_names::PROVIDE),
            (ActionMask::MODIFY, action_names::MODIFY),
            (ActionMask::OBSERVE, action_names::OBSERVE),
        ]
        .into_iter()
        .filter(|(mask, _)| self.action_mask.contains(*mask))
        .map(|(_, name)| name)
        .collect()
    }
}

/// Access rule for one interface on one object path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// Object path pattern
    pub object_path: String,
    /// Interface name pattern
    pub interface_name: String,
    /// Members, in declaration order
    pub members: Vec<Member>,
}

impl Rule {
    /// Create a rule
    pub fn new(
        object_path: impl Into<String>,
        interface_name: impl Into<String>,
        members: Vec<Member>,
    ) -> Self {
        Self {
            object_path: object_path.into(),
            interface_name: interface_name.into(),
            members,
        }
    }

    /// Rule granting every action on every member of every interface
    pub fn allow_all() -> Self {
        Self::new(
            WILDCARD,
            WILDCARD,
            vec![
                Member::new(WILDCARD, MemberKind::Method, MemberKind::Method.allowed_actions()),
                Member::new(
                    WILDCARD,
                    MemberKind::Property,
                    MemberKind::Property.allowed_actions(),
                ),
                Member::new(WILDCARD, MemberKind::Signal, MemberKind::Signal.allowed_actions()),
            ],
        )
    }
}
