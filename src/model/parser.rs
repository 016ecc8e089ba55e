//! Schema validation and normalization for game definitions
//!
//! Turns an untyped JSON document into a fully-defaulted [`GameDefinition`].
//! Every failure names the offending JSON path (`action[0].effects[0].target`)
//! so authors can fix definitions without reading engine code. The parser
//! performs no execution: it is pure validation plus normalization (string
//! trimming, boolean defaulting).

use ahash::AHashMap;
use serde_json::{Map, Value};

use crate::core::error::SchemaError;
use crate::core::types::GameStatus;
use crate::model::{
    ActionDef, Effect, EntityBag, GameDefinition, Meta, ModifyOperation, ParamDef, ParamKind,
    RandomEventDef, RandomInit, RandomVarInit, Requirement, RuleDef, Trigger, VariableDef,
};

type Result<T> = std::result::Result<T, SchemaError>;

const EFFECT_KINDS: &str =
    "set_var, modify_var, set_entity, trigger_event, message, update_score, add_log, add_event, set_status";
const REQUIREMENT_KINDS: &str = "var_range, entity_state, player_role, cooldown";
const TRIGGER_KINDS: &str = "tick, action, event, condition";
const PARAM_KINDS: &str = "string, number, boolean, select";
const OPERATION_KINDS: &str = "set, add, subtract, multiply, divide";
const STATUS_KINDS: &str = "running, paused, ended, waiting, finished";
const WIDGET_KINDS: &str = "bar, schematic, log, checklist, terminal, grid";

/// Parse and validate a JSON game definition
pub fn parse(raw: &str) -> Result<GameDefinition> {
    let data: Value =
        serde_json::from_str(raw).map_err(|err| SchemaError::Json(err.to_string()))?;
    let root = data.as_object().ok_or(SchemaError::NotAnObject)?;

    let meta = parse_meta(root.get("meta"))?;
    let variables = parse_variables(root.get("vars"))?;
    let entities = parse_entities(root.get("entities"))?;
    let actions = parse_actions(root.get("actions"))?;
    let rules = parse_rules(root.get("rules"))?;
    let init_random = match root.get("init_random") {
        Some(value) => Some(parse_random_init(value)?),
        None => None,
    };
    let random_events = match root.get("random_events") {
        Some(value) => parse_random_events(value)?,
        None => Vec::new(),
    };
    let ui = parse_ui(root.get("ui"))?;

    Ok(GameDefinition {
        meta,
        variables,
        entities,
        actions,
        rules,
        init_random,
        random_events,
        ui,
    })
}

// ============================================================================
// Sections
// ============================================================================

fn parse_meta(value: Option<&Value>) -> Result<Meta> {
    let meta = value
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("meta", "an object"))?;

    Ok(Meta {
        name: require_string(meta.get("name"), "meta.name")?,
        version: require_string(meta.get("version"), "meta.version")?,
        description: require_string(meta.get("description"), "meta.description")?,
        author: require_string(meta.get("author"), "meta.author")?,
        seed: match meta.get("seed") {
            Some(value) => Some(
                value
                    .as_u64()
                    .ok_or_else(|| invalid("meta.seed", "a non-negative integer"))?,
            ),
            None => None,
        },
        max_players: match meta.get("maxPlayers") {
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| invalid("meta.maxPlayers", "a non-negative integer"))?,
            ),
            None => None,
        },
    })
}

fn parse_variables(value: Option<&Value>) -> Result<AHashMap<String, VariableDef>> {
    let Some(value) = value else {
        return Ok(AHashMap::new());
    };
    let vars = value.as_object().ok_or_else(|| invalid("vars", "an object"))?;

    let mut result = AHashMap::with_capacity(vars.len());
    for (name, var) in vars {
        let path = format!("var.{name}");
        let var = var
            .as_object()
            .ok_or_else(|| invalid(&path, "an object"))?;

        result.insert(
            name.clone(),
            VariableDef {
                initial: require_number(var.get("value"), &format!("{path}.value"))?,
                min: require_number(var.get("min"), &format!("{path}.min"))?,
                max: require_number(var.get("max"), &format!("{path}.max"))?,
                unit: optional_string(var.get("unit"), &format!("{path}.unit"))?,
                label: optional_string(var.get("label"), &format!("{path}.label"))?,
                description: optional_string(
                    var.get("description"),
                    &format!("{path}.description"),
                )?,
            },
        );
    }

    Ok(result)
}

fn parse_entities(value: Option<&Value>) -> Result<AHashMap<String, EntityBag>> {
    let Some(value) = value else {
        return Ok(AHashMap::new());
    };
    let entities = value
        .as_object()
        .ok_or_else(|| invalid("entities", "an object"))?;

    let mut result = AHashMap::with_capacity(entities.len());
    for (name, bag) in entities {
        let bag = bag
            .as_object()
            .ok_or_else(|| invalid(format!("entity.{name}"), "an object"))?;
        result.insert(name.clone(), to_bag(bag));
    }

    Ok(result)
}

fn parse_actions(value: Option<&Value>) -> Result<Vec<ActionDef>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let actions = value
        .as_array()
        .ok_or_else(|| invalid("actions", "an array"))?;

    actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let path = format!("action[{index}]");
            let action = action
                .as_object()
                .ok_or_else(|| invalid(&path, "an object"))?;

            Ok(ActionDef {
                name: require_string(action.get("name"), &format!("{path}.name"))?,
                description: optional_string(
                    action.get("description"),
                    &format!("{path}.description"),
                )?,
                parameters: match action.get("parameters") {
                    Some(value) => parse_parameters(value, &path)?,
                    None => Vec::new(),
                },
                effects: parse_effects(action.get("effects"), &path)?,
                requirements: match action.get("requirements") {
                    Some(value) => parse_requirements(value, &path)?,
                    None => Vec::new(),
                },
                cooldown: optional_number(action.get("cooldown"), &format!("{path}.cooldown"))?,
            })
        })
        .collect()
}

fn parse_parameters(value: &Value, action_path: &str) -> Result<Vec<ParamDef>> {
    let parameters = value
        .as_array()
        .ok_or_else(|| invalid(format!("{action_path}.parameters"), "an array"))?;

    parameters
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let path = format!("{action_path}.parameters[{index}]");
            let param = param
                .as_object()
                .ok_or_else(|| invalid(&path, "an object"))?;

            let kind = match param.get("type").and_then(Value::as_str) {
                Some("string") => ParamKind::String,
                Some("number") => ParamKind::Number,
                Some("boolean") => ParamKind::Boolean,
                Some("select") => ParamKind::Select,
                _ => {
                    return Err(SchemaError::UnknownVariant {
                        path: format!("{path}.type"),
                        allowed: PARAM_KINDS,
                    })
                }
            };

            Ok(ParamDef {
                name: require_string(param.get("name"), &format!("{path}.name"))?,
                kind,
                required: param
                    .get("required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                options: match param.get("options") {
                    Some(value) => Some(parse_string_array(value, &format!("{path}.options"))?),
                    None => None,
                },
            })
        })
        .collect()
}

fn parse_effects(value: Option<&Value>, owner_path: &str) -> Result<Vec<Effect>> {
    let effects = value
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(format!("{owner_path}.effects"), "an array"))?;

    effects
        .iter()
        .enumerate()
        .map(|(index, effect)| parse_effect(effect, &format!("{owner_path}.effects[{index}]")))
        .collect()
}

fn parse_effect(value: &Value, path: &str) -> Result<Effect> {
    let effect = value
        .as_object()
        .ok_or_else(|| invalid(path, "an object"))?;

    let kind = effect.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "set_var" => Ok(Effect::SetVar {
            target: require_effect_field(effect, "target", path, "set_var")?,
            value: effect.get("value").cloned(),
        }),
        "modify_var" => Ok(Effect::ModifyVar {
            target: require_effect_field(effect, "target", path, "modify_var")?,
            operation: parse_operation(effect.get("operation"), path)?,
            value: effect.get("value").cloned(),
        }),
        "set_entity" => Ok(Effect::SetEntity {
            target: require_effect_field(effect, "target", path, "set_entity")?,
            value: effect.get("value").cloned(),
        }),
        "trigger_event" => Ok(Effect::TriggerEvent {
            target: optional_string(effect.get("target"), &format!("{path}.target"))?,
        }),
        "message" => Ok(Effect::Message {
            message: require_effect_field(effect, "message", path, "message")?,
        }),
        "update_score" => Ok(Effect::UpdateScore {
            player_id: require_effect_field(effect, "playerId", path, "update_score")?,
            value: effect.get("value").cloned(),
        }),
        "add_log" => Ok(Effect::AddLog {
            message: require_effect_field(effect, "message", path, "add_log")?,
        }),
        "add_event" => Ok(Effect::AddEvent {
            event_type: require_effect_field(effect, "eventType", path, "add_event")?,
            message: optional_string(effect.get("message"), &format!("{path}.message"))?,
        }),
        "set_status" => Ok(Effect::SetStatus {
            status: parse_status(effect.get("status"), path)?,
        }),
        _ => Err(SchemaError::UnknownVariant {
            path: format!("{path}.type"),
            allowed: EFFECT_KINDS,
        }),
    }
}

fn parse_operation(value: Option<&Value>, effect_path: &str) -> Result<ModifyOperation> {
    let Some(value) = value else {
        return Err(SchemaError::MissingEffectField {
            path: format!("{effect_path}.operation"),
            effect_type: "modify_var",
        });
    };
    match value.as_str() {
        Some("set") => Ok(ModifyOperation::Set),
        Some("add") => Ok(ModifyOperation::Add),
        Some("subtract") => Ok(ModifyOperation::Subtract),
        Some("multiply") => Ok(ModifyOperation::Multiply),
        Some("divide") => Ok(ModifyOperation::Divide),
        _ => Err(SchemaError::UnknownVariant {
            path: format!("{effect_path}.operation"),
            allowed: OPERATION_KINDS,
        }),
    }
}

fn parse_status(value: Option<&Value>, effect_path: &str) -> Result<GameStatus> {
    let Some(value) = value else {
        return Err(SchemaError::MissingEffectField {
            path: format!("{effect_path}.status"),
            effect_type: "set_status",
        });
    };
    match value.as_str() {
        Some("running") => Ok(GameStatus::Running),
        Some("paused") => Ok(GameStatus::Paused),
        Some("waiting") => Ok(GameStatus::Waiting),
        // "ended" is accepted for definition compatibility; the state
        // machine has a single terminal state
        Some("ended") | Some("finished") => Ok(GameStatus::Finished),
        _ => Err(SchemaError::UnknownVariant {
            path: format!("{effect_path}.status"),
            allowed: STATUS_KINDS,
        }),
    }
}

fn parse_requirements(value: &Value, action_path: &str) -> Result<Vec<Requirement>> {
    let requirements = value
        .as_array()
        .ok_or_else(|| invalid(format!("{action_path}.requirements"), "an array"))?;

    requirements
        .iter()
        .enumerate()
        .map(|(index, requirement)| {
            let path = format!("{action_path}.requirements[{index}]");
            let requirement = requirement
                .as_object()
                .ok_or_else(|| invalid(&path, "an object"))?;

            let target = require_string(requirement.get("target"), &format!("{path}.target"))?;
            let kind = requirement.get("type").and_then(Value::as_str).unwrap_or("");
            match kind {
                "var_range" => Ok(Requirement::VarRange {
                    target,
                    condition: require_string(
                        requirement.get("condition"),
                        &format!("{path}.condition"),
                    )?,
                }),
                "entity_state" => Ok(Requirement::EntityState {
                    target,
                    condition: require_string(
                        requirement.get("condition"),
                        &format!("{path}.condition"),
                    )?,
                }),
                "player_role" => Ok(Requirement::PlayerRole {
                    target,
                    condition: require_string(
                        requirement.get("condition"),
                        &format!("{path}.condition"),
                    )?,
                }),
                "cooldown" => Ok(Requirement::Cooldown {
                    target,
                    millis: requirement
                        .get("value")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0)
                        .max(0.0) as u64,
                }),
                _ => Err(SchemaError::UnknownVariant {
                    path: format!("{path}.type"),
                    allowed: REQUIREMENT_KINDS,
                }),
            }
        })
        .collect()
}

fn parse_rules(value: Option<&Value>) -> Result<Vec<RuleDef>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let rules = value.as_array().ok_or_else(|| invalid("rules", "an array"))?;

    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let path = format!("rule[{index}]");
            let rule = rule.as_object().ok_or_else(|| invalid(&path, "an object"))?;

            let trigger = match rule.get("trigger").and_then(Value::as_str) {
                Some("tick") => Trigger::Tick,
                Some("action") => Trigger::Action,
                Some("event") => Trigger::Event,
                Some("condition") => Trigger::Condition,
                _ => {
                    return Err(SchemaError::UnknownVariant {
                        path: format!("{path}.trigger"),
                        allowed: TRIGGER_KINDS,
                    })
                }
            };

            Ok(RuleDef {
                trigger,
                condition: optional_string(rule.get("condition"), &format!("{path}.condition"))?,
                effects: parse_effects(rule.get("effects"), &path)?,
                frequency: optional_number(rule.get("frequency"), &format!("{path}.frequency"))?
                    .filter(|f| *f > 0.0)
                    .map(|f| f as u64),
            })
        })
        .collect()
}

fn parse_random_events(value: &Value) -> Result<Vec<RandomEventDef>> {
    let events = value
        .as_array()
        .ok_or_else(|| invalid("random_events", "an array"))?;

    events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let path = format!("random_events[{index}]");
            let event = event
                .as_object()
                .ok_or_else(|| invalid(&path, "an object"))?;

            Ok(RandomEventDef {
                name: require_string(event.get("name"), &format!("{path}.name"))?,
                description: require_string(
                    event.get("description"),
                    &format!("{path}.description"),
                )?,
                probability: require_number(
                    event.get("probability"),
                    &format!("{path}.probability"),
                )?,
                conditions: match event.get("conditions") {
                    Some(value) => parse_string_array(value, &format!("{path}.conditions"))?,
                    None => Vec::new(),
                },
                effects: parse_effects(event.get("effects"), &path)?,
            })
        })
        .collect()
}

fn parse_random_init(value: &Value) -> Result<RandomInit> {
    let init = value
        .as_object()
        .ok_or_else(|| invalid("init_random", "an object"))?;

    let mut result = RandomInit::default();

    if let Some(vars) = init.get("vars") {
        let vars = vars
            .as_object()
            .ok_or_else(|| invalid("init_random.vars", "an object"))?;
        for (name, range) in vars {
            let path = format!("init_random.vars.{name}");
            let range = range
                .as_object()
                .ok_or_else(|| invalid(&path, "an object"))?;
            result.vars.insert(
                name.clone(),
                RandomVarInit {
                    min: require_number(range.get("min"), &format!("{path}.min"))?,
                    max: require_number(range.get("max"), &format!("{path}.max"))?,
                },
            );
        }
    }

    if let Some(entities) = init.get("entities") {
        let entities = entities
            .as_object()
            .ok_or_else(|| invalid("init_random.entities", "an object"))?;
        for (name, bag) in entities {
            let bag = bag
                .as_object()
                .ok_or_else(|| invalid(format!("init_random.entities.{name}"), "an object"))?;
            result.entities.insert(name.clone(), to_bag(bag));
        }
    }

    Ok(result)
}

/// Validate widget types, pass everything else through untouched
fn parse_ui(value: Option<&Value>) -> Result<Value> {
    let Some(value) = value else {
        return Ok(Value::Object(Map::new()));
    };
    let ui = value.as_object().ok_or_else(|| invalid("ui", "an object"))?;

    if let Some(panels) = ui.get("panels") {
        let panels = panels
            .as_array()
            .ok_or_else(|| invalid("ui.panels", "an array"))?;
        for (panel_index, panel) in panels.iter().enumerate() {
            let panel_path = format!("ui.panels[{panel_index}]");
            let panel = panel
                .as_object()
                .ok_or_else(|| invalid(&panel_path, "an object"))?;

            let Some(widgets) = panel.get("widgets") else {
                continue;
            };
            let widgets = widgets
                .as_array()
                .ok_or_else(|| invalid(format!("{panel_path}.widgets"), "an array"))?;
            for (widget_index, widget) in widgets.iter().enumerate() {
                let widget_path = format!("{panel_path}.widgets[{widget_index}]");
                let widget = widget
                    .as_object()
                    .ok_or_else(|| invalid(&widget_path, "an object"))?;
                match widget.get("type").and_then(Value::as_str) {
                    Some("bar") | Some("schematic") | Some("log") | Some("checklist")
                    | Some("terminal") | Some("grid") => {}
                    _ => {
                        return Err(SchemaError::UnknownVariant {
                            path: format!("{widget_path}.type"),
                            allowed: WIDGET_KINDS,
                        })
                    }
                }
            }
        }
    }

    Ok(value.clone())
}

// ============================================================================
// Field helpers
// ============================================================================

fn invalid(path: impl Into<String>, expected: impl Into<String>) -> SchemaError {
    SchemaError::Invalid {
        path: path.into(),
        expected: expected.into(),
    }
}

/// Field the effect-type table marks required: absent is a
/// `MissingEffectField`, present-but-invalid is an `Invalid`
fn require_effect_field(
    effect: &Map<String, Value>,
    key: &str,
    effect_path: &str,
    effect_type: &'static str,
) -> Result<String> {
    match effect.get(key) {
        Some(value) => require_string(Some(value), &format!("{effect_path}.{key}")),
        None => Err(SchemaError::MissingEffectField {
            path: format!("{effect_path}.{key}"),
            effect_type,
        }),
    }
}

/// Required non-empty string, trimmed
fn require_string(value: Option<&Value>, path: &str) -> Result<String> {
    let text = value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(path, "a non-empty string"))?;
    Ok(text.to_owned())
}

/// Optional string; if present it must be a non-empty string
fn optional_string(value: Option<&Value>, path: &str) -> Result<Option<String>> {
    match value {
        Some(_) => require_string(value, path).map(Some),
        None => Ok(None),
    }
}

fn require_number(value: Option<&Value>, path: &str) -> Result<f64> {
    value
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid(path, "a valid number"))
}

fn optional_number(value: Option<&Value>, path: &str) -> Result<Option<f64>> {
    match value {
        Some(_) => require_number(value, path).map(Some),
        None => Ok(None),
    }
}

fn parse_string_array(value: &Value, path: &str) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| invalid(path, "an array"))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| require_string(Some(item), &format!("{path}[{index}]")))
        .collect()
}

fn to_bag(map: &Map<String, Value>) -> EntityBag {
    map.iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
