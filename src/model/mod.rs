//! Typed game definition
//!
//! The immutable, validated description of a simulation: variables,
//! entities, actions, rules, and random events. Effects and requirements
//! are closed sum types so every consumer matches exhaustively; nothing
//! downstream dispatches on strings.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::GameStatus;

pub mod parser;

pub use parser::parse;

/// Untyped property bag backing an entity
pub type EntityBag = AHashMap<String, Value>;

/// Descriptive metadata for a game definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    /// RNG seed for reproducible rooms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Advisory player cap; admission control belongs to the transport layer
    #[serde(rename = "maxPlayers", skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
}

/// Bounded numeric variable
///
/// `min <= initial <= max` is not checked at load time; every write clamps,
/// so an out-of-range initial value is corrected on the first write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    #[serde(rename = "value")]
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declared type of an action parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Select,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Select => "select",
        }
    }
}

/// A typed action parameter declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub required: bool,
    /// Allowed values for `select` parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Arithmetic applied by a `modify_var` effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyOperation {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// One atomic state mutation instruction
///
/// The first five kinds degrade to a no-op on bad runtime input; the last
/// four surface an explicit error (see the effect interpreter).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    SetVar {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    ModifyVar {
        target: String,
        operation: ModifyOperation,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    SetEntity {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    TriggerEvent {
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Message {
        message: String,
    },
    UpdateScore {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    AddLog {
        message: String,
    },
    AddEvent {
        #[serde(rename = "eventType")]
        event_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    SetStatus {
        status: GameStatus,
    },
}

impl Effect {
    /// Effect kind name as it appears in definitions
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetVar { .. } => "set_var",
            Self::ModifyVar { .. } => "modify_var",
            Self::SetEntity { .. } => "set_entity",
            Self::TriggerEvent { .. } => "trigger_event",
            Self::Message { .. } => "message",
            Self::UpdateScore { .. } => "update_score",
            Self::AddLog { .. } => "add_log",
            Self::AddEvent { .. } => "add_event",
            Self::SetStatus { .. } => "set_status",
        }
    }
}

/// A precondition an action must satisfy before its effects run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// Comparator check (`"> 50"`) against a live variable
    VarRange { target: String, condition: String },
    /// Equality/inequality check (`"status == active"`) on an entity property
    EntityState { target: String, condition: String },
    /// Exact match against the acting player's role
    PlayerRole { target: String, condition: String },
    /// Minimum elapsed time since this player last fired the target action
    Cooldown { target: String, millis: u64 },
}

/// A player-invocable, validated, cooldown-able group of effects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParamDef>,
    pub effects: Vec<Effect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    /// Advisory cooldown window in milliseconds, reported to clients;
    /// enforcement runs through the `cooldown` requirement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<f64>,
}

impl ActionDef {
    /// The cooldown requirement governing this action, if declared
    pub fn cooldown_requirement(&self) -> Option<(&str, u64)> {
        self.requirements.iter().find_map(|req| match req {
            Requirement::Cooldown { target, millis } if target == &self.name => {
                Some((target.as_str(), *millis))
            }
            _ => None,
        })
    }
}

/// What causes a rule to be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Tick,
    Action,
    Event,
    Condition,
}

/// A guarded, possibly frequency-limited group of effects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub trigger: Trigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub effects: Vec<Effect>,
    /// For tick rules: apply only every N ticks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
}

/// A probabilistic, optionally condition-gated group of effects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomEventDef {
    pub name: String,
    pub description: String,
    /// Draw threshold per tick; values outside [0, 1] simply never or
    /// always fire
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    pub effects: Vec<Effect>,
}

/// Uniform range for a randomized initial variable value
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RandomVarInit {
    pub min: f64,
    pub max: f64,
}

/// Randomized initialization applied when state is created or reset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomInit {
    #[serde(default)]
    pub vars: AHashMap<String, RandomVarInit>,
    #[serde(default)]
    pub entities: AHashMap<String, EntityBag>,
}

/// Immutable, validated description of a simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDefinition {
    pub meta: Meta,
    #[serde(rename = "vars")]
    pub variables: AHashMap<String, VariableDef>,
    pub entities: AHashMap<String, EntityBag>,
    pub actions: Vec<ActionDef>,
    pub rules: Vec<RuleDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_random: Option<RandomInit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub random_events: Vec<RandomEventDef>,
    /// UI layout metadata, passed through untouched for the presentation
    /// layer (widget types are still validated at parse time)
    pub ui: Value,
}

impl GameDefinition {
    /// Look up an action by name
    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|action| action.name == name)
    }

    /// Rules evaluated by the tick loop
    pub fn tick_rules(&self) -> impl Iterator<Item = (usize, &RuleDef)> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.trigger == Trigger::Tick)
    }
}
