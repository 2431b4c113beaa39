//! Generic element assertions shared by every schema validator
//!
//! Each check inspects one element and reports a [`SchemaViolation`] on
//! failure. None of them modify the tree.
//!
//! [`SchemaViolation`]: palisade_core::SchemaViolation

use crate::element::XmlElement;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use palisade_core::{PermissionError, Result, ViolationKind};
use std::collections::HashSet;

/// Name of annotation elements
pub const ANNOTATION_ELEMENT: &str = "annotation";

/// Require `element` to be named `expected`
pub fn validate_element_name(element: &XmlElement, expected: &str) -> Result<()> {
    if element.name() != expected {
        tracing::debug!(found = element.name(), expected, "unexpected element");
        return Err(PermissionError::schema(
            ViolationKind::ElementName,
            format!("expected <{expected}>, found <{}>", element.name()),
        ));
    }
    Ok(())
}

/// Require exactly `expected` children
pub fn validate_child_count(element: &XmlElement, expected: usize) -> Result<()> {
    let found = element.children().len();
    if found != expected {
        return Err(PermissionError::schema(
            ViolationKind::ChildCount,
            format!("<{}> must have {expected} children, found {found}", element.name()),
        ));
    }
    Ok(())
}

/// Require no children
pub fn validate_no_children(element: &XmlElement) -> Result<()> {
    validate_child_count(element, 0)
}

/// Require exactly one child
pub fn validate_one_child(element: &XmlElement) -> Result<()> {
    validate_child_count(element, 1)
}

/// Require at least one child
pub fn validate_positive_child_count(element: &XmlElement) -> Result<()> {
    if element.children().is_empty() {
        return Err(PermissionError::schema(
            ViolationKind::ChildCount,
            format!("<{}> must have at least one child", element.name()),
        ));
    }
    Ok(())
}

/// Require `attribute` (or `default` when absent) to be new to `seen`
///
/// The value is inserted into `seen` and returned.
pub fn validate_attribute_unique(
    element: &XmlElement,
    attribute: &str,
    default: &str,
    seen: &mut HashSet<String>,
) -> Result<String> {
    let value = element.attribute(attribute).unwrap_or(default).to_string();
    if !seen.insert(value.clone()) {
        return Err(PermissionError::schema(
            ViolationKind::Duplicate,
            format!("duplicate {attribute} \"{value}\" on <{}>", element.name()),
        ));
    }
    Ok(value)
}

/// Separate annotation children from the rest, preserving order
pub fn split_annotations(element: &XmlElement) -> (Vec<&XmlElement>, Vec<&XmlElement>) {
    element
        .children()
        .iter()
        .partition(|child| child.name() == ANNOTATION_ELEMENT)
}

/// Require that no child is an annotation
pub fn validate_no_annotations(element: &XmlElement) -> Result<()> {
    let (annotations, _) = split_annotations(element);
    if !annotations.is_empty() {
        return Err(PermissionError::schema(
            ViolationKind::UnexpectedAnnotation,
            format!("<{}> may not carry annotations", element.name()),
        ));
    }
    Ok(())
}

/// Parse leaf content as an unsigned 32-bit decimal
pub fn parse_u32_content(element: &XmlElement) -> Result<u32> {
    validate_no_children(element)?;
    let content = element.content();
    let invalid = || {
        PermissionError::schema(
            ViolationKind::InvalidNumber,
            format!("<{}> content \"{content}\" is not an unsigned 32-bit integer", element.name()),
        )
    };
    if content.is_empty() || !content.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    content.parse::<u32>().map_err(|_| invalid())
}

/// Decode leaf content as non-empty base64
pub fn decode_base64_content(element: &XmlElement) -> Result<Vec<u8>> {
    validate_no_children(element)?;
    let compact: String = element
        .content()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        PermissionError::schema(
            ViolationKind::InvalidBase64,
            format!("<{}> is not valid base64: {e}", element.name()),
        )
    })?;
    if bytes.is_empty() {
        return Err(PermissionError::schema(
            ViolationKind::InvalidBase64,
            format!("<{}> decodes to an empty value", element.name()),
        ));
    }
    Ok(bytes)
}

/// Encode bytes for a base64 leaf
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
