//! Schema validation through the public parse entry point
//!
//! Complements the unit tests in `model::parser` with the error paths a
//! hosting service actually relies on when rejecting uploaded definitions.

use simforge::core::error::SchemaError;
use simforge::model::parse;

fn wrap(extra: &str) -> String {
    format!(
        r#"{{
            "meta": {{"name": "n", "version": "v", "description": "d", "author": "a"}}{}{}
        }}"#,
        if extra.is_empty() { "" } else { "," },
        extra
    )
}

#[test]
fn test_effect_required_field_table() {
    // one probe per effect type that declares a required field
    let cases = [
        (r#"{"type": "set_var"}"#, "target", "set_var"),
        (r#"{"type": "modify_var", "operation": "add"}"#, "target", "modify_var"),
        (r#"{"type": "set_entity"}"#, "target", "set_entity"),
        (r#"{"type": "message"}"#, "message", "message"),
        (r#"{"type": "update_score"}"#, "playerId", "update_score"),
        (r#"{"type": "add_log"}"#, "message", "add_log"),
        (r#"{"type": "add_event"}"#, "eventType", "add_event"),
        (r#"{"type": "set_status"}"#, "status", "set_status"),
    ];

    for (effect, field, effect_type) in cases {
        let raw = wrap(&format!(
            r#""actions": [{{"name": "a", "effects": [{effect}]}}]"#
        ));
        let err = parse(&raw).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingEffectField {
                path: format!("action[0].effects[0].{field}"),
                effect_type,
            },
            "wrong error for {effect_type}"
        );
    }
}

#[test]
fn test_trigger_event_needs_no_fields() {
    let raw = wrap(r#""actions": [{"name": "a", "effects": [{"type": "trigger_event"}]}]"#);
    assert!(parse(&raw).is_ok());
}

#[test]
fn test_error_path_tracks_effect_index() {
    let raw = wrap(
        r#""actions": [
            {"name": "a", "effects": [
                {"type": "add_log", "message": "fine"},
                {"type": "set_var", "value": 1}
            ]},
            {"name": "b", "effects": [{"type": "set_var", "value": 1}]}
        ]"#,
    );
    let err = parse(&raw).unwrap_err();
    assert_eq!(err.path(), Some("action[0].effects[1].target"));
}

#[test]
fn test_error_path_tracks_action_index() {
    let raw = wrap(
        r#""actions": [
            {"name": "a", "effects": []},
            {"name": "b", "effects": [{"type": "modify_var", "target": "x"}]}
        ]"#,
    );
    let err = parse(&raw).unwrap_err();
    assert_eq!(err.path(), Some("action[1].effects[0].operation"));
}

#[test]
fn test_meta_fields_must_be_nonempty_strings() {
    for (field, raw) in [
        (
            "meta.name",
            r#"{"meta": {"name": "", "version": "v", "description": "d", "author": "a"}}"#
                .to_string(),
        ),
        (
            "meta.version",
            r#"{"meta": {"name": "n", "version": 2, "description": "d", "author": "a"}}"#
                .to_string(),
        ),
        (
            "meta.author",
            r#"{"meta": {"name": "n", "version": "v", "description": "d"}}"#.to_string(),
        ),
    ] {
        let err = parse(&raw).unwrap_err();
        assert_eq!(err.path(), Some(field));
    }
}

#[test]
fn test_effects_member_must_be_array() {
    let raw = wrap(r#""actions": [{"name": "a", "effects": {"type": "set_var"}}]"#);
    let err = parse(&raw).unwrap_err();
    assert_eq!(err.path(), Some("action[0].effects"));

    // an action without an effects member is rejected the same way
    let raw = wrap(r#""actions": [{"name": "a"}]"#);
    let err = parse(&raw).unwrap_err();
    assert_eq!(err.path(), Some("action[0].effects"));
}

#[test]
fn test_select_parameter_options_are_strings() {
    let raw = wrap(
        r#""actions": [{
            "name": "a",
            "parameters": [{"name": "mode", "type": "select", "options": ["fine", 3]}],
            "effects": []
        }]"#,
    );
    let err = parse(&raw).unwrap_err();
    assert_eq!(err.path(), Some("action[0].parameters[0].options[1]"));
}

#[test]
fn test_full_definition_round_trips_through_serde() {
    // a parsed definition serializes back out for the persistence layer
    let raw = wrap(
        r#""vars": {"power": {"value": 50, "min": 0, "max": 100}},
           "entities": {"reactor": {"status": "active"}},
           "actions": [{
               "name": "boost",
               "parameters": [{"name": "amount", "type": "number", "required": true}],
               "effects": [{"type": "modify_var", "target": "power", "operation": "add", "value": 5}],
               "requirements": [{"type": "var_range", "target": "power", "condition": "< 100"}]
           }],
           "rules": [{"trigger": "tick", "frequency": 4, "effects": [
               {"type": "add_log", "message": "pulse"}
           ]}],
           "random_events": [{
               "name": "spark", "description": "d", "probability": 0.25,
               "conditions": ["power > 10"],
               "effects": [{"type": "message", "message": "zap"}]
           }]"#,
    );
    let definition = parse(&raw).unwrap();
    let serialized = serde_json::to_string(&definition).unwrap();
    let reparsed: simforge::model::GameDefinition = serde_json::from_str(&serialized).unwrap();
    assert_eq!(reparsed.actions[0].name, "boost");
    assert_eq!(reparsed.rules[0].frequency, Some(4));
    assert_eq!(reparsed.random_events[0].probability, 0.25);
}
