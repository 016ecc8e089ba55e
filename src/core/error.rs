//! Error taxonomy for the engine
//!
//! Load-time schema violations are the only errors surfaced as `Err` to
//! callers. Action failures are folded into the returned `ActionExecution`,
//! effect failures abort the rest of an action's effect list, and tick-time
//! failures are routed to error callbacks without ever stopping the loop.

use thiserror::Error;

use crate::core::types::Tick;

/// Load-time validation failure, naming the offending JSON path
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("game definition must be a JSON object")]
    NotAnObject,

    #[error("{path} must be {expected}")]
    Invalid { path: String, expected: String },

    #[error("{path} is required for {effect_type} effects")]
    MissingEffectField {
        path: String,
        effect_type: &'static str,
    },

    #[error("{path} must be one of: {allowed}")]
    UnknownVariant { path: String, allowed: &'static str },
}

impl SchemaError {
    /// JSON path of the offending element, where one exists
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Json(_) | Self::NotAnObject => None,
            Self::Invalid { path, .. }
            | Self::MissingEffectField { path, .. }
            | Self::UnknownVariant { path, .. } => Some(path),
        }
    }
}

/// Why a single effect could not be applied
///
/// Only the effect kinds with an explicit-error policy produce these; the
/// resilient kinds degrade to skipped outcomes instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    #[error("update_score requires a numeric value for player '{player_id}'")]
    ScoreValue { player_id: String },

    #[error("add_event '{event_type}' requires a message")]
    EventMessage { event_type: String },
}

/// Why a player action failed
///
/// Never returned as `Err`: the action processor records the failure on the
/// `ActionExecution` it returns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Action '{0}' not found")]
    ActionNotFound(String),

    #[error("Player '{0}' not found")]
    PlayerNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{reason}")]
    RequirementNotMet {
        reason: String,
        /// Remaining wait when the failed requirement was a cooldown
        remaining_ms: Option<u64>,
    },

    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// A failure inside tick processing, routed to error callbacks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TickError {
    #[error("rule {rule_index} effect failed at tick {tick}: {source}")]
    Rule {
        tick: Tick,
        rule_index: usize,
        source: EffectError,
    },

    #[error("random event '{event}' effect failed at tick {tick}: {source}")]
    RandomEvent {
        tick: Tick,
        event: String,
        source: EffectError,
    },
}
