//! Rules validator and converter
//!
//! The `<rules>` grammar is shared by manifest templates, signed manifests and
//! policy ACLs:
//!
//! ```xml
//! <rules>
//!     <node name="/control">
//!         <interface name="org.example.Light">
//!             <method name="Toggle">
//!                 <annotation name="org.alljoyn.Bus.Action" value="Modify"/>
//!             </method>
//!         </interface>
//!     </node>
//! </rules>
//! ```
//!
//! Each `node`/`interface` pair becomes one [`Rule`]. Missing `name`
//! attributes stand for the wildcard `*`.

use crate::element::XmlElement;
use crate::validator::{
    split_annotations, validate_attribute_unique, validate_element_name,
    validate_no_annotations, validate_positive_child_count,
};
use once_cell::sync::Lazy;
use palisade_core::{
    ActionMask, Member, MemberKind, PermissionError, Result, Rule, ViolationKind, WILDCARD,
};
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Root element of a standalone rule set
pub const RULES_ELEMENT: &str = "rules";
/// Object path element
pub const NODE_ELEMENT: &str = "node";
/// Interface element
pub const INTERFACE_ELEMENT: &str = "interface";
/// Name attribute on nodes, interfaces and members
pub const NAME_ATTRIBUTE: &str = "name";
/// Value attribute on annotations
pub const VALUE_ATTRIBUTE: &str = "value";
/// Name of the action annotation
pub const ACTION_ANNOTATION: &str = "org.alljoyn.Bus.Action";
/// Longest interface or member name accepted
pub const MAX_NAME_LENGTH: usize = 255;

#[allow(clippy::expect_used)] // Hard-coded patterns - expect is safe here
static OBJECT_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\*|/\*?|(?:/[a-zA-Z0-9_]+)+(?:/?\*)?)$").expect("valid object path pattern")
});

#[allow(clippy::expect_used)] // Hard-coded patterns - expect is safe here
static INTERFACE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\*|[a-zA-Z_][a-zA-Z0-9_]*(?:(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*\.?\*|(?:\.[a-zA-Z_][a-zA-Z0-9_]*)+))$",
    )
    .expect("valid interface name pattern")
});

#[allow(clippy::expect_used)] // Hard-coded patterns - expect is safe here
static MEMBER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\*|[a-zA-Z_][a-zA-Z0-9_]*\*?)$").expect("valid member name pattern")
});

/// Whether `path` is a valid object path pattern
pub fn is_valid_object_path(path: &str) -> bool {
    OBJECT_PATH.is_match(path)
}

/// Whether `name` is a valid interface name pattern
pub fn is_valid_interface_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && INTERFACE_NAME.is_match(name)
}

/// Whether `name` is a valid member name pattern
pub fn is_valid_member_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && MEMBER_NAME.is_match(name)
}

fn invalid_name(what: &str, name: &str) -> PermissionError {
    tracing::debug!(what, name, "name does not match pattern");
    PermissionError::schema(ViolationKind::InvalidName, format!("invalid {what} \"{name}\""))
}

/// Validate a standalone `<rules>` document root
pub fn validate_rules_xml(root: &XmlElement) -> Result<()> {
    validate_rules_element(root, RULES_ELEMENT)
}

/// Validate a rules element whose root is named `root_name`
pub fn validate_rules_element(root: &XmlElement, root_name: &str) -> Result<()> {
    validate_element_name(root, root_name)?;
    validate_positive_child_count(root)?;
    let mut paths = HashSet::new();
    for node in root.children() {
        validate_node(node, &mut paths)?;
    }
    Ok(())
}

fn validate_node(node: &XmlElement, paths: &mut HashSet<String>) -> Result<()> {
    validate_element_name(node, NODE_ELEMENT)?;
    validate_no_annotations(node)?;
    validate_positive_child_count(node)?;
    let path = validate_attribute_unique(node, NAME_ATTRIBUTE, WILDCARD, paths)?;
    if !is_valid_object_path(&path) {
        return Err(invalid_name("object path", &path));
    }
    let mut interfaces = HashSet::new();
    for interface in node.children() {
        validate_interface(interface, &mut interfaces)?;
    }
    Ok(())
}

fn validate_interface(interface: &XmlElement, names: &mut HashSet<String>) -> Result<()> {
    validate_element_name(interface, INTERFACE_ELEMENT)?;
    validate_no_annotations(interface)?;
    validate_positive_child_count(interface)?;
    let name = validate_attribute_unique(interface, NAME_ATTRIBUTE, WILDCARD, names)?;
    if !is_valid_interface_name(&name) {
        return Err(invalid_name("interface name", &name));
    }
    let mut members = HashMap::new();
    for member in interface.children() {
        validate_member(member, &mut members)?;
    }
    Ok(())
}

fn member_kind(member: &XmlElement) -> Result<MemberKind> {
    MemberKind::from_xml_name(member.name()).ok_or_else(|| {
        PermissionError::schema(
            ViolationKind::ElementName,
            format!("<{}> is not a method, property or signal", member.name()),
        )
    })
}

/// Member names are unique per kind: a method and a signal may share a name.
fn validate_member(
    member: &XmlElement,
    names: &mut HashMap<MemberKind, HashSet<String>>,
) -> Result<()> {
    let kind = member_kind(member)?;
    let name =
        validate_attribute_unique(member, NAME_ATTRIBUTE, WILDCARD, names.entry(kind).or_default())?;
    if !is_valid_member_name(&name) {
        return Err(invalid_name("member name", &name));
    }
    let (annotations, others) = split_annotations(member);
    if !others.is_empty() {
        return Err(PermissionError::schema(
            ViolationKind::ElementName,
            format!("{kind} \"{name}\" may only contain annotations"),
        ));
    }
    if annotations.is_empty() {
        return Err(PermissionError::schema(
            ViolationKind::ChildCount,
            format!("{kind} \"{name}\" has no action annotation"),
        ));
    }
    let mut values = HashSet::new();
    let mut denied = false;
    for annotation in &annotations {
        let value = action_value(annotation, kind)?;
        if !values.insert(value) {
            return Err(PermissionError::schema(
                ViolationKind::Duplicate,
                format!("{kind} \"{name}\" repeats action {value}"),
            ));
        }
        denied |= value == palisade_core::action_names::DENY;
    }
    if denied && values.len() > 1 {
        return Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("{kind} \"{name}\" combines Deny with other actions"),
        ));
    }
    Ok(())
}

fn action_value<'a>(annotation: &'a XmlElement, kind: MemberKind) -> Result<&'a str> {
    if annotation.attribute(NAME_ATTRIBUTE) != Some(ACTION_ANNOTATION) {
        return Err(PermissionError::schema(
            ViolationKind::InvalidName,
            format!(
                "annotation name must be {ACTION_ANNOTATION}, found {:?}",
                annotation.attribute(NAME_ATTRIBUTE)
            ),
        ));
    }
    let value = annotation.attribute(VALUE_ATTRIBUTE).unwrap_or_default();
    if kind.action_for(value).is_none() {
        return Err(PermissionError::schema(
            ViolationKind::InvalidValue,
            format!("action \"{value}\" is not allowed on a {kind}"),
        ));
    }
    Ok(value)
}

/// Validate rules that arrived already decoded
///
/// Rules for one object path must be adjacent, since the XML form carries
/// them under a single `node`. Within a path interface names must be unique,
/// and every rule needs a non-empty member set whose masks stay inside what
/// each member kind allows.
pub fn validate_rules(rules: &[Rule]) -> Result<()> {
    if rules.is_empty() {
        return Err(PermissionError::schema(ViolationKind::Empty, "rule set is empty"));
    }
    let mut finished_paths = HashSet::new();
    for group in path_runs(rules) {
        let path = group[0].object_path.as_str();
        if !is_valid_object_path(path) {
            return Err(invalid_name("object path", path));
        }
        if !finished_paths.insert(path) {
            return Err(PermissionError::schema(
                ViolationKind::Duplicate,
                format!("rules for {path} are split by another object path"),
            ));
        }
        let mut interfaces = HashSet::new();
        for rule in group {
            if !is_valid_interface_name(&rule.interface_name) {
                return Err(invalid_name("interface name", &rule.interface_name));
            }
            if !interfaces.insert(rule.interface_name.as_str()) {
                return Err(PermissionError::schema(
                    ViolationKind::Duplicate,
                    format!("interface \"{}\" repeated under {path}", rule.interface_name),
                ));
            }
            validate_members(rule)?;
        }
    }
    Ok(())
}

/// Maximal runs of adjacent rules sharing an object path
fn path_runs(rules: &[Rule]) -> Vec<&[Rule]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for end in 1..=rules.len() {
        if end == rules.len() || rules[end].object_path != rules[start].object_path {
            runs.push(&rules[start..end]);
            start = end;
        }
    }
    runs
}

fn validate_members(rule: &Rule) -> Result<()> {
    if rule.members.is_empty() {
        return Err(PermissionError::schema(
            ViolationKind::Empty,
            format!("interface \"{}\" has no members", rule.interface_name),
        ));
    }
    let mut names = HashSet::new();
    for member in &rule.members {
        if member.kind == MemberKind::Unspecified {
            return Err(PermissionError::schema(
                ViolationKind::InvalidValue,
                format!("member \"{}\" has no kind", member.name),
            ));
        }
        if !is_valid_member_name(&member.name) {
            return Err(invalid_name("member name", &member.name));
        }
        if !names.insert((member.kind, member.name.as_str())) {
            return Err(PermissionError::schema(
                ViolationKind::Duplicate,
                format!("member \"{}\" repeated in {}", member.name, rule.interface_name),
            ));
        }
        if !member.action_mask.is_subset_of(member.kind.allowed_actions()) {
            return Err(PermissionError::schema(
                ViolationKind::InvalidValue,
                format!(
                    "{} \"{}\" grants actions 0x{:02x} outside 0x{:02x}",
                    member.kind,
                    member.name,
                    member.action_mask.bits(),
                    member.kind.allowed_actions().bits()
                ),
            ));
        }
    }
    Ok(())
}

/// Parse and validate a standalone rules document
pub fn xml_to_rules(xml: &str) -> Result<Vec<Rule>> {
    let root = XmlElement::parse(xml)?;
    element_to_rules(&root, RULES_ELEMENT)
}

/// Validate `root` and convert it into rules
pub fn element_to_rules(root: &XmlElement, root_name: &str) -> Result<Vec<Rule>> {
    validate_rules_element(root, root_name)?;
    let mut rules = Vec::new();
    for node in root.children() {
        let path = node.attribute(NAME_ATTRIBUTE).unwrap_or(WILDCARD);
        for interface in node.children() {
            let members = interface
                .children()
                .iter()
                .map(member_from_element)
                .collect::<Result<Vec<_>>>()?;
            rules.push(Rule::new(
                path,
                interface.attribute(NAME_ATTRIBUTE).unwrap_or(WILDCARD),
                members,
            ));
        }
    }
    Ok(rules)
}

fn member_from_element(element: &XmlElement) -> Result<Member> {
    let kind = member_kind(element)?;
    let mut mask = ActionMask::DENY;
    for annotation in element.children() {
        let value = action_value(annotation, kind)?;
        let action = kind.action_for(value).ok_or_else(|| {
            PermissionError::schema(ViolationKind::InvalidValue, format!("action \"{value}\""))
        })?;
        mask = mask | action;
    }
    Ok(Member::new(
        element.attribute(NAME_ATTRIBUTE).unwrap_or(WILDCARD),
        kind,
        mask,
    ))
}

/// Validate rules and serialize them as a `<rules>` document
pub fn rules_to_xml(rules: &[Rule]) -> Result<String> {
    Ok(rules_to_element(rules, RULES_ELEMENT)?.to_xml_string())
}

/// Validate rules and build an element named `root_name`
///
/// Each run of rules sharing an object path becomes one `node`, so the rule
/// order survives a trip through XML.
pub fn rules_to_element(rules: &[Rule], root_name: &str) -> Result<XmlElement> {
    validate_rules(rules)?;
    let mut root = XmlElement::new(root_name);
    for group in path_runs(rules) {
        let mut node = XmlElement::new(NODE_ELEMENT)
            .with_attribute(NAME_ATTRIBUTE, group[0].object_path.as_str());
        for rule in group {
            node.push_child(interface_element(rule)?);
        }
        root.push_child(node);
    }
    Ok(root)
}

fn interface_element(rule: &Rule) -> Result<XmlElement> {
    let mut interface = XmlElement::new(INTERFACE_ELEMENT)
        .with_attribute(NAME_ATTRIBUTE, rule.interface_name.as_str());
    for member in &rule.members {
        let element_name = member.kind.xml_name().ok_or_else(|| {
            PermissionError::schema(
                ViolationKind::InvalidValue,
                format!("member \"{}\" has no kind", member.name),
            )
        })?;
        let element = member.action_names().into_iter().fold(
            XmlElement::new(element_name).with_attribute(NAME_ATTRIBUTE, member.name.as_str()),
            |element, action| {
                element.with_child(
                    XmlElement::new(crate::validator::ANNOTATION_ELEMENT)
                        .with_attribute(NAME_ATTRIBUTE, ACTION_ANNOTATION)
                        .with_attribute(VALUE_ATTRIBUTE, action),
                )
            },
        );
        interface.push_child(element);
    }
    Ok(interface)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_RULES: &str = r#"
        <rules>
            <node name="/control">
                <interface name="org.example.Light">
                    <method name="Toggle">
                        <annotation name="org.alljoyn.Bus.Action" value="Modify"/>
                        <annotation name="org.alljoyn.Bus.Action" value="Provide"/>
                    </method>
                    <property name="Brightness">
                        <annotation name="org.alljoyn.Bus.Action" value="Observe"/>
                    </property>
                    <signal>
                        <annotation name="org.alljoyn.Bus.Action" value="Deny"/>
                    </signal>
                </interface>
            </node>
            <node>
                <interface>
                    <method>
                        <annotation name="org.alljoyn.Bus.Action" value="Provide"/>
                    </method>
                </interface>
            </node>
        </rules>"#;

    fn member_xml(kind: &str, annotations: &[&str]) -> String {
        let annotations: String = annotations
            .iter()
            .map(|v| format!(r#"<annotation name="org.alljoyn.Bus.Action" value="{v}"/>"#))
            .collect();
        format!(
            r#"<rules><node name="/a"><interface name="a.b"><{kind} name="m">{annotations}</{kind}></interface></node></rules>"#
        )
    }

    fn rejects(xml: &str, kind: ViolationKind) {
        let err = xml_to_rules(xml).unwrap_err();
        assert!(err.is_schema(kind), "expected {kind}, got {err}");
    }

    #[test]
    fn test_valid_rules_convert() {
        let rules = xml_to_rules(VALID_RULES).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].object_path, "/control");
        assert_eq!(rules[0].members.len(), 3);
        assert_eq!(
            rules[0].members[0].action_mask,
            ActionMask::MODIFY | ActionMask::PROVIDE
        );
        assert_eq!(rules[0].members[2].name, "*");
        assert!(rules[0].members[2].action_mask.is_deny());
        assert_eq!(rules[1].object_path, "*");
        assert_eq!(rules[1].interface_name, "*");
    }

    #[test]
    fn test_object_path_patterns() {
        for ok in ["*", "/", "/*", "/a", "/a/b_1", "/a/b*", "/a/b/*"] {
            assert!(is_valid_object_path(ok), "{ok}");
        }
        for bad in ["", "a", "/a/", "//a", "/a-b", "/a**", "*/a"] {
            assert!(!is_valid_object_path(bad), "{bad}");
        }
    }

    #[test]
    fn test_interface_name_patterns() {
        for ok in ["*", "org.example", "org.example.*", "org.*", "org*", "a.b.c"] {
            assert!(is_valid_interface_name(ok), "{ok}");
        }
        for bad in ["", "org", "1org.a", "org..a", "org.", ".org", "org.a-b"] {
            assert!(!is_valid_interface_name(bad), "{bad}");
        }
        let long = format!("a.{}", "b".repeat(MAX_NAME_LENGTH));
        assert!(!is_valid_interface_name(&long));
    }

    #[test]
    fn test_member_name_patterns() {
        for ok in ["*", "Toggle", "_x1", "Get*"] {
            assert!(is_valid_member_name(ok), "{ok}");
        }
        for bad in ["", "1abc", "a.b", "**", "*a"] {
            assert!(!is_valid_member_name(bad), "{bad}");
        }
    }

    #[test]
    fn test_wrong_root_and_empty_rules() {
        rejects("<manifest><node/></manifest>", ViolationKind::ElementName);
        rejects("<rules/>", ViolationKind::ChildCount);
        rejects(r#"<rules><node name="/a"/></rules>"#, ViolationKind::ChildCount);
    }

    #[test]
    fn test_duplicate_names() {
        rejects(
            r#"<rules>
                <node name="/a"><interface name="a.b"><method><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method></interface></node>
                <node name="/a"><interface name="a.b"><method><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method></interface></node>
            </rules>"#,
            ViolationKind::Duplicate,
        );
        rejects(
            r#"<rules><node name="/a">
                <interface name="a.b"><method><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method></interface>
                <interface name="a.b"><signal><annotation name="org.alljoyn.Bus.Action" value="Provide"/></signal></interface>
            </node></rules>"#,
            ViolationKind::Duplicate,
        );
        rejects(
            r#"<rules><node name="/a"><interface name="a.b">
                <method name="x"><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method>
                <method name="x"><annotation name="org.alljoyn.Bus.Action" value="Modify"/></method>
            </interface></node></rules>"#,
            ViolationKind::Duplicate,
        );
        xml_to_rules(
            r#"<rules><node name="/a"><interface name="a.b">
                <method name="x"><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method>
                <signal name="x"><annotation name="org.alljoyn.Bus.Action" value="Provide"/></signal>
            </interface></node></rules>"#,
        )
        .unwrap();
    }

    #[test]
    fn test_annotations_on_nodes_and_interfaces() {
        rejects(
            r#"<rules><node name="/a"><annotation name="org.alljoyn.Bus.Action" value="Provide"/>
                <interface name="a.b"><method><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method></interface>
            </node></rules>"#,
            ViolationKind::UnexpectedAnnotation,
        );
        rejects(
            r#"<rules><node name="/a"><interface name="a.b"><annotation name="org.alljoyn.Bus.Action" value="Provide"/>
                <method><annotation name="org.alljoyn.Bus.Action" value="Provide"/></method>
            </interface></node></rules>"#,
            ViolationKind::UnexpectedAnnotation,
        );
    }

    #[test]
    fn test_member_annotations() {
        rejects(&member_xml("method", &[]), ViolationKind::ChildCount);
        rejects(&member_xml("method", &["Observe"]), ViolationKind::InvalidValue);
        rejects(&member_xml("signal", &["Modify"]), ViolationKind::InvalidValue);
        rejects(&member_xml("property", &["Provide", "Provide"]), ViolationKind::Duplicate);
        rejects(&member_xml("method", &["Deny", "Provide"]), ViolationKind::InvalidValue);
        rejects(&member_xml("method", &["Provide", "Deny"]), ViolationKind::InvalidValue);
        rejects(&member_xml("event", &["Provide"]), ViolationKind::ElementName);
        xml_to_rules(&member_xml("property", &["Provide", "Modify", "Observe"])).unwrap();
        xml_to_rules(&member_xml("signal", &["Deny"])).unwrap();
    }

    #[test]
    fn test_annotation_must_be_action() {
        rejects(
            r#"<rules><node name="/a"><interface name="a.b"><method>
                <annotation name="org.example.Other" value="Provide"/>
            </method></interface></node></rules>"#,
            ViolationKind::InvalidName,
        );
    }

    #[test]
    fn test_validate_decoded_rules() {
        assert!(validate_rules(&[]).unwrap_err().is_schema(ViolationKind::Empty));

        let method = |mask| Member::new("M", MemberKind::Method, mask);
        let ok = Rule::new("/a", "a.b", vec![method(ActionMask::PROVIDE | ActionMask::MODIFY)]);
        validate_rules(std::slice::from_ref(&ok)).unwrap();

        let observe = Rule::new("/a", "a.b", vec![method(ActionMask::OBSERVE)]);
        assert!(validate_rules(&[observe]).unwrap_err().is_schema(ViolationKind::InvalidValue));

        let twin = Rule::new("/a", "a.b", vec![method(ActionMask::PROVIDE)]);
        assert!(validate_rules(&[ok.clone(), twin]).unwrap_err().is_schema(ViolationKind::Duplicate));

        let other_path = Rule::new("/b", "a.b", vec![method(ActionMask::PROVIDE)]);
        validate_rules(&[ok.clone(), other_path]).unwrap();

        let no_members = Rule::new("/a", "a.c", vec![]);
        assert!(validate_rules(&[no_members]).unwrap_err().is_schema(ViolationKind::Empty));

        let unspecified = Rule::new(
            "/a",
            "a.b",
            vec![Member::new("M", MemberKind::Unspecified, ActionMask::DENY)],
        );
        assert!(validate_rules(&[unspecified]).is_err());

        let bad_path = Rule::new("a", "a.b", vec![method(ActionMask::PROVIDE)]);
        assert!(validate_rules(&[bad_path]).unwrap_err().is_schema(ViolationKind::InvalidName));
    }

    #[test]
    fn test_rules_to_xml_groups_paths() {
        let fan = Rule::new(
            "/control",
            "org.example.Fan",
            vec![Member::new("Spin", MemberKind::Method, ActionMask::MODIFY)],
        );
        let mut rules = xml_to_rules(VALID_RULES).unwrap();
        rules.insert(1, fan.clone());
        let xml = rules_to_xml(&rules).unwrap();
        let root = XmlElement::parse(&xml).unwrap();
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].children().len(), 2);
        assert_eq!(xml_to_rules(&xml).unwrap(), rules);
    }

    #[test]
    fn test_split_object_path_rejected() {
        let rule = |path: &str, interface: &str| {
            Rule::new(
                path,
                interface,
                vec![Member::new("M", MemberKind::Method, ActionMask::PROVIDE)],
            )
        };
        let interleaved = [rule("/a", "x.One"), rule("/b", "x.Two"), rule("/a", "x.Three")];
        let err = validate_rules(&interleaved).unwrap_err();
        assert!(err.is_schema(ViolationKind::Duplicate), "got {err}");
        assert!(rules_to_xml(&interleaved).is_err());

        let adjacent = [rule("/a", "x.One"), rule("/a", "x.Three"), rule("/b", "x.Two")];
        let back = xml_to_rules(&rules_to_xml(&adjacent).unwrap()).unwrap();
        assert_eq!(back, adjacent);
    }

    #[test]
    fn test_rules_to_xml_rejects_invalid_rules() {
        assert!(rules_to_xml(&[]).is_err());
    }
}
