//! Signed manifest validator and converter
//!
//! ```xml
//! <manifest>
//!     <version>1</version>
//!     <rules>...</rules>
//!     <thumbprint><oid>2.16.840.1.101.3.4.2.1</oid><value>base64</value></thumbprint>
//!     <signature><oid>1.2.840.10045.4.3.2</oid><value>base64</value></signature>
//! </manifest>
//! ```

use crate::element::XmlElement;
use crate::rules::{element_to_rules, rules_to_element, validate_rules_element, RULES_ELEMENT};
use crate::validator::{
    decode_base64_content, encode_base64, parse_u32_content, validate_child_count,
    validate_element_name,
};
use palisade_core::{oids, Manifest, PermissionError, Result, ViolationKind, MANIFEST_VERSION};

/// Root element of a signed manifest
pub const MANIFEST_ELEMENT: &str = "manifest";
/// Version element
pub const VERSION_ELEMENT: &str = "version";
/// Thumbprint element
pub const THUMBPRINT_ELEMENT: &str = "thumbprint";
/// Signature element
pub const SIGNATURE_ELEMENT: &str = "signature";
/// Algorithm identifier element
pub const OID_ELEMENT: &str = "oid";
/// Base64 value element
pub const VALUE_ELEMENT: &str = "value";

const MANIFEST_CHILDREN: usize = 4;

/// Validate a `<manifest>` document root
pub fn validate_manifest_xml(root: &XmlElement) -> Result<()> {
    validate_element_name(root, MANIFEST_ELEMENT)?;
    validate_child_count(root, MANIFEST_CHILDREN)?;
    let children = root.children();
    validate_version(&children[0])?;
    validate_rules_element(&children[1], RULES_ELEMENT)?;
    algorithm_value(&children[2], THUMBPRINT_ELEMENT, oids::SHA256)?;
    algorithm_value(&children[3], SIGNATURE_ELEMENT, oids::ECDSA_SHA256)?;
    Ok(())
}

fn validate_version(element: &XmlElement) -> Result<u32> {
    validate_element_name(element, VERSION_ELEMENT)?;
    let version = parse_u32_content(element)?;
    if version != MANIFEST_VERSION {
        return Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("manifest version must be {MANIFEST_VERSION}, found {version}"),
        ));
    }
    Ok(version)
}

/// Validate an `{oid, value}` pair and return the decoded value
fn algorithm_value(element: &XmlElement, name: &str, expected_oid: &str) -> Result<Vec<u8>> {
    validate_element_name(element, name)?;
    validate_child_count(element, 2)?;
    let oid = &element.children()[0];
    validate_element_name(oid, OID_ELEMENT)?;
    if oid.content() != expected_oid {
        return Err(PermissionError::schema(
            ViolationKind::InvalidOid,
            format!("<{name}> oid must be {expected_oid}, found \"{}\"", oid.content()),
        ));
    }
    let value = &element.children()[1];
    validate_element_name(value, VALUE_ELEMENT)?;
    decode_base64_content(value)
}

/// Parse and validate a manifest document
pub fn xml_to_manifest(xml: &str) -> Result<Manifest> {
    element_to_manifest(&XmlElement::parse(xml)?)
}

/// Validate `root` and convert it into a manifest
pub fn element_to_manifest(root: &XmlElement) -> Result<Manifest> {
    validate_element_name(root, MANIFEST_ELEMENT)?;
    validate_child_count(root, MANIFEST_CHILDREN)?;
    let children = root.children();
    let version = validate_version(&children[0])?;
    let rules = element_to_rules(&children[1], RULES_ELEMENT)?;
    let thumbprint = algorithm_value(&children[2], THUMBPRINT_ELEMENT, oids::SHA256)?;
    let signature = algorithm_value(&children[3], SIGNATURE_ELEMENT, oids::ECDSA_SHA256)?;
    Ok(Manifest::from_parts(
        version,
        rules,
        oids::SHA256,
        thumbprint,
        oids::ECDSA_SHA256,
        signature,
    ))
}

/// Serialize a manifest, re-validating its rules first
pub fn manifest_to_xml(manifest: &Manifest) -> Result<String> {
    Ok(manifest_to_element(manifest)?.to_xml_string())
}

/// Build the element tree for a manifest
pub fn manifest_to_element(manifest: &Manifest) -> Result<XmlElement> {
    let rules = rules_to_element(manifest.rules(), RULES_ELEMENT)?;
    Ok(XmlElement::new(MANIFEST_ELEMENT)
        .with_child(XmlElement::new(VERSION_ELEMENT).with_content(manifest.version().to_string()))
        .with_child(rules)
        .with_child(algorithm_element(
            THUMBPRINT_ELEMENT,
            manifest.thumbprint_oid(),
            manifest.thumbprint(),
        ))
        .with_child(algorithm_element(
            SIGNATURE_ELEMENT,
            manifest.signature_oid(),
            manifest.signature(),
        )))
}

fn algorithm_element(name: &str, oid: &str, value: &[u8]) -> XmlElement {
    XmlElement::new(name)
        .with_child(XmlElement::new(OID_ELEMENT).with_content(oid))
        .with_child(XmlElement::new(VALUE_ELEMENT).with_content(encode_base64(value)))
}

/// Parse a list of manifest documents; fails on the first invalid one
pub fn xml_array_to_manifests<S: AsRef<str>>(documents: &[S]) -> Result<Vec<Manifest>> {
    documents
        .iter()
        .map(|xml| xml_to_manifest(xml.as_ref()))
        .collect()
}

/// Serialize a list of manifests
pub fn manifests_to_xml_array(manifests: &[Manifest]) -> Result<Vec<String>> {
    manifests.iter().map(manifest_to_xml).collect()
}
