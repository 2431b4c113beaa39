//! Sample documents

use palisade_core::{Acl, ActionMask, Member, MemberKind, Peer, Policy, Rule, WILDCARD};

/// Manifest template granting control of one light
pub const MANIFEST_TEMPLATE: &str = r#"<rules>
  <node name="/light">
    <interface name="org.example.Light">
      <method name="Toggle">
        <annotation name="org.alljoyn.Bus.Action" value="Modify"/>
      </method>
      <property name="Brightness">
        <annotation name="org.alljoyn.Bus.Action" value="Modify"/>
        <annotation name="org.alljoyn.Bus.Action" value="Observe"/>
      </property>
      <signal name="Changed">
        <annotation name="org.alljoyn.Bus.Action" value="Observe"/>
      </signal>
    </interface>
  </node>
</rules>"#;

/// Second template, used when installing additional manifests
pub const SECOND_TEMPLATE: &str = r#"<rules>
  <node name="/thermostat">
    <interface name="org.example.Thermostat">
      <property name="*">
        <annotation name="org.alljoyn.Bus.Action" value="Observe"/>
      </property>
    </interface>
  </node>
</rules>"#;

/// Policy with serial `serial` letting any trusted peer observe everything
pub fn observe_policy(serial: u32) -> Policy {
    Policy::new(
        serial,
        vec![Acl::new(
            vec![Peer::any_trusted()],
            vec![Rule::new(
                WILDCARD,
                WILDCARD,
                vec![
                    Member::new(WILDCARD, MemberKind::Property, ActionMask::OBSERVE),
                    Member::new(WILDCARD, MemberKind::Signal, ActionMask::OBSERVE),
                ],
            )],
        )],
    )
}
