//! Palisade XML
//!
//! Schema validators and converters for the three XML documents the
//! permission engine exchanges:
//!
//! - `<rules>`: manifest templates and the rule sets embedded in manifests
//!   and policy ACLs ([`rules`])
//! - `<manifest>`: signed manifests ([`manifest`])
//! - `<policy>`: versioned ACL lists ([`policy`])
//!
//! Documents are parsed into an owned [`XmlElement`] tree first; the
//! validators in [`validator`] then check one element at a time. Every
//! converter validates before it produces a value, so a successful
//! conversion always yields a fully populated result.

#![forbid(unsafe_code)]

/// Owned element tree, parser and writer
pub mod element;

/// Signed manifest schema
pub mod manifest;

/// Policy schema and decoded-policy validation
pub mod policy;

/// Rules schema shared by templates, manifests and policies
pub mod rules;

/// Generic element assertions
pub mod validator;

pub use element::XmlElement;
pub use manifest::{
    element_to_manifest, manifest_to_element, manifest_to_xml, manifests_to_xml_array,
    validate_manifest_xml, xml_array_to_manifests, xml_to_manifest,
};
pub use policy::{
    element_to_policy, policy_to_element, policy_to_xml, validate_policy, validate_policy_xml,
    xml_to_policy, PeerScan,
};
pub use rules::{
    element_to_rules, rules_to_element, rules_to_xml, validate_rules, validate_rules_element,
    validate_rules_xml, xml_to_rules,
};
