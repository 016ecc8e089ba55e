//! Action processing pipeline
//!
//! Validates a player-submitted action against the definition, checks its
//! requirements in declared order (including per-player cooldowns), applies
//! its effects through the shared interpreter, and records every attempt in
//! arrival order. Failures are folded into the returned `ActionExecution`;
//! nothing in this module returns `Err` to the caller.
//!
//! Cooldown stamps and action history grow without bound unless the caller
//! clears them explicitly.

use std::sync::Arc;

use ahash::AHashMap;
use serde_json::{Map, Value};

use crate::core::clock::Clock;
use crate::core::error::ActionError;
use crate::core::types::Millis;
use crate::effects::{self, EffectOutcome};
use crate::model::{ActionDef, GameDefinition, ParamDef, ParamKind, Requirement};
use crate::state::{ActionExecution, SimulationState};

/// Comparator parsed from a `var_range` condition string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

/// Processes player actions against one room's state
pub struct ActionProcessor {
    definition: Arc<GameDefinition>,
    clock: Arc<dyn Clock>,
    /// player id -> action name -> timestamp of last successful fire
    cooldowns: AHashMap<String, AHashMap<String, Millis>>,
    history: Vec<ActionExecution>,
}

impl ActionProcessor {
    pub fn new(definition: Arc<GameDefinition>, clock: Arc<dyn Clock>) -> Self {
        Self {
            definition,
            clock,
            cooldowns: AHashMap::new(),
            history: Vec::new(),
        }
    }

    /// Process one player action end to end
    ///
    /// The returned record is also appended to this processor's history and
    /// to the state store's history, success or failure.
    pub fn process_action(
        &mut self,
        state: &mut SimulationState,
        action_name: &str,
        player_id: &str,
        parameters: Map<String, Value>,
    ) -> ActionExecution {
        let timestamp = self.clock.now_ms();

        let execution = match self.run(state, action_name, player_id, &parameters) {
            Ok(results) => ActionExecution {
                action_name: action_name.to_owned(),
                player_id: player_id.to_owned(),
                parameters,
                timestamp,
                success: true,
                result: serde_json::to_value(&results).ok(),
                error: None,
            },
            Err(error) => {
                tracing::debug!(action = action_name, player = player_id, %error, "action failed");
                ActionExecution {
                    action_name: action_name.to_owned(),
                    player_id: player_id.to_owned(),
                    parameters,
                    timestamp,
                    success: false,
                    result: None,
                    error: Some(error.to_string()),
                }
            }
        };

        self.history.push(execution.clone());
        state.record_action(execution.clone());
        execution
    }

    fn run(
        &mut self,
        state: &mut SimulationState,
        action_name: &str,
        player_id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Vec<EffectOutcome>, ActionError> {
        let definition = Arc::clone(&self.definition);
        let action = definition
            .action(action_name)
            .ok_or_else(|| ActionError::ActionNotFound(action_name.to_owned()))?;

        if state.get_player(player_id).is_none() {
            return Err(ActionError::PlayerNotFound(player_id.to_owned()));
        }

        validate_parameters(&action.parameters, parameters)?;

        for requirement in &action.requirements {
            self.check_requirement(state, requirement, player_id)?;
        }

        // effects run in declared order; the first explicit error stops the
        // list, but effects already applied stay committed
        let mut results = Vec::with_capacity(action.effects.len());
        for effect in &action.effects {
            results.push(effects::apply(effect, state)?);
        }

        if action.cooldown_requirement().is_some() {
            self.stamp_cooldown(action_name, player_id);
        }

        Ok(results)
    }

    // ========================================================================
    // Requirements
    // ========================================================================

    fn check_requirement(
        &self,
        state: &SimulationState,
        requirement: &Requirement,
        player_id: &str,
    ) -> Result<(), ActionError> {
        match requirement {
            Requirement::VarRange { target, condition } => {
                let value = state.get_variable(target).ok_or_else(|| not_met(
                    format!("Variable '{target}' not found"),
                ))?;
                let (comparator, threshold) = parse_comparator(condition)
                    .ok_or_else(|| not_met(format!("Invalid condition format: {condition}")))?;
                if !compare(comparator, value, threshold) {
                    return Err(not_met(format!(
                        "Variable '{target}' ({value}) does not meet condition: {condition}"
                    )));
                }
                Ok(())
            }

            Requirement::EntityState { target, condition } => {
                let entity = state
                    .get_entity(target)
                    .ok_or_else(|| not_met(format!("Entity '{target}' not found")))?;
                let (property, negated, expected) = parse_entity_condition(condition)
                    .ok_or_else(|| {
                        not_met(format!("Invalid entity condition format: {condition}"))
                    })?;
                let actual = entity.get(property).ok_or_else(|| {
                    not_met(format!(
                        "Property '{property}' not found on entity '{target}'"
                    ))
                })?;
                let matches = property_equals(actual, expected);
                if matches == negated {
                    return Err(not_met(format!(
                        "Entity '{target}.{property}' ({actual}) does not meet condition: {condition}"
                    )));
                }
                Ok(())
            }

            Requirement::PlayerRole { condition, .. } => {
                let player = state
                    .get_player(player_id)
                    .ok_or_else(|| ActionError::PlayerNotFound(player_id.to_owned()))?;
                if player.role != *condition {
                    return Err(not_met(format!(
                        "Player role '{}' does not match required role '{condition}'",
                        player.role
                    )));
                }
                Ok(())
            }

            Requirement::Cooldown { target, millis } => {
                let Some(last) = self.last_fire(target, player_id) else {
                    return Ok(());
                };
                let elapsed = self.clock.now_ms().saturating_sub(last);
                if elapsed < *millis {
                    let remaining = millis - elapsed;
                    return Err(ActionError::RequirementNotMet {
                        reason: format!(
                            "Action '{target}' is on cooldown for {} more seconds",
                            remaining.div_ceil(1_000)
                        ),
                        remaining_ms: Some(remaining),
                    });
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Cooldown bookkeeping
    // ========================================================================

    fn last_fire(&self, action_name: &str, player_id: &str) -> Option<Millis> {
        self.cooldowns.get(player_id)?.get(action_name).copied()
    }

    /// Stamp the current time for (player, action)
    pub fn stamp_cooldown(&mut self, action_name: &str, player_id: &str) {
        let now = self.clock.now_ms();
        self.cooldowns
            .entry(player_id.to_owned())
            .or_default()
            .insert(action_name.to_owned(), now);
    }

    /// Remaining cooldown for (player, action), from its cooldown requirement
    pub fn cooldown_remaining(&self, action_name: &str, player_id: &str) -> Option<Millis> {
        let last = self.last_fire(action_name, player_id)?;
        let (_, window) = self.definition.action(action_name)?.cooldown_requirement()?;
        let elapsed = self.clock.now_ms().saturating_sub(last);
        let remaining = window.saturating_sub(elapsed);
        (remaining > 0).then_some(remaining)
    }

    /// Remaining cooldowns in whole seconds for every stamped action of a
    /// player, using each action's advisory `cooldown` window
    pub fn player_cooldowns(&self, player_id: &str) -> AHashMap<String, u64> {
        let Some(stamps) = self.cooldowns.get(player_id) else {
            return AHashMap::new();
        };

        let now = self.clock.now_ms();
        let mut result = AHashMap::new();
        for (action_name, last) in stamps {
            let Some(action) = self.definition.action(action_name) else {
                continue;
            };
            let Some(window) = action.cooldown else {
                continue;
            };
            let remaining = (window - now.saturating_sub(*last) as f64).max(0.0);
            if remaining > 0.0 {
                result.insert(action_name.clone(), (remaining / 1_000.0).ceil() as u64);
            }
        }
        result
    }

    pub fn clear_cooldown(&mut self, action_name: &str, player_id: &str) {
        if let Some(stamps) = self.cooldowns.get_mut(player_id) {
            stamps.remove(action_name);
        }
    }

    pub fn clear_player_cooldowns(&mut self, player_id: &str) {
        self.cooldowns.remove(player_id);
    }

    pub fn clear_all_cooldowns(&mut self) {
        self.cooldowns.clear();
    }

    // ========================================================================
    // History and queries
    // ========================================================================

    pub fn action_history(&self) -> &[ActionExecution] {
        &self.history
    }

    pub fn player_action_history(&self, player_id: &str) -> Vec<ActionExecution> {
        self.history
            .iter()
            .filter(|execution| execution.player_id == player_id)
            .cloned()
            .collect()
    }

    /// Last `count` executions, oldest first
    pub fn recent_actions(&self, count: usize) -> &[ActionExecution] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn clear_action_history(&mut self) {
        self.history.clear();
    }

    /// Actions whose requirements this player currently satisfies
    pub fn available_actions(&self, state: &SimulationState, player_id: &str) -> Vec<ActionDef> {
        if state.get_player(player_id).is_none() {
            return Vec::new();
        }
        self.definition
            .actions
            .iter()
            .filter(|action| {
                action
                    .requirements
                    .iter()
                    .all(|req| self.check_requirement(state, req, player_id).is_ok())
            })
            .cloned()
            .collect()
    }
}

fn not_met(reason: String) -> ActionError {
    ActionError::RequirementNotMet {
        reason,
        remaining_ms: None,
    }
}

// ============================================================================
// Parameter validation
// ============================================================================

fn validate_parameters(
    declared: &[ParamDef],
    supplied: &Map<String, Value>,
) -> Result<(), ActionError> {
    for param in declared {
        let value = supplied.get(&param.name).filter(|v| !v.is_null());

        let Some(value) = value else {
            if param.required {
                return Err(ActionError::Validation(format!(
                    "Required parameter '{}' is missing",
                    param.name
                )));
            }
            continue;
        };

        match param.kind {
            ParamKind::String => {
                if !value.is_string() {
                    return Err(ActionError::Validation(format!(
                        "Parameter '{}' must be a string",
                        param.name
                    )));
                }
            }
            ParamKind::Number => {
                if value.as_f64().is_none() {
                    return Err(ActionError::Validation(format!(
                        "Parameter '{}' must be a number",
                        param.name
                    )));
                }
            }
            ParamKind::Boolean => {
                if !value.is_boolean() {
                    return Err(ActionError::Validation(format!(
                        "Parameter '{}' must be a boolean",
                        param.name
                    )));
                }
            }
            ParamKind::Select => {
                if let Some(options) = &param.options {
                    let valid = value
                        .as_str()
                        .map_or(false, |v| options.iter().any(|o| o == v));
                    if !valid {
                        return Err(ActionError::Validation(format!(
                            "Parameter '{}' must be one of: {}",
                            param.name,
                            options.join(", ")
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Condition string parsing
// ============================================================================

/// Parse a comparator condition like `"> 50"` or `"<=100"`
fn parse_comparator(condition: &str) -> Option<(Comparator, f64)> {
    let trimmed = condition.trim();
    let table = [
        (">=", Comparator::Ge),
        ("<=", Comparator::Le),
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        (">", Comparator::Gt),
        ("<", Comparator::Lt),
    ];
    for (text, comparator) in table {
        if let Some(rest) = trimmed.strip_prefix(text) {
            return rest.trim().parse().ok().map(|v| (comparator, v));
        }
    }
    None
}

fn compare(comparator: Comparator, value: f64, threshold: f64) -> bool {
    match comparator {
        Comparator::Gt => value > threshold,
        Comparator::Ge => value >= threshold,
        Comparator::Lt => value < threshold,
        Comparator::Le => value <= threshold,
        Comparator::Eq => value == threshold,
        Comparator::Ne => value != threshold,
    }
}

/// Parse an entity condition like `"status == active"`; returns
/// (property, negated, expected)
fn parse_entity_condition(condition: &str) -> Option<(&str, bool, &str)> {
    let (position, negated) = match (condition.find("!="), condition.find("==")) {
        (Some(ne), Some(eq)) if ne < eq => (ne, true),
        (_, Some(eq)) => (eq, false),
        (Some(ne), None) => (ne, true),
        (None, None) => return None,
    };

    let property = condition[..position].trim();
    let expected = condition[position + 2..].trim();
    if property.is_empty()
        || expected.is_empty()
        || !property.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return None;
    }
    Some((property, negated, expected))
}

/// Loose equality between an entity property and condition text
fn property_equals(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s == expected,
        Value::Number(n) => expected
            .parse::<f64>()
            .map_or(false, |e| n.as_f64() == Some(e)),
        Value::Bool(b) => expected.parse::<bool>().map_or(false, |e| *b == e),
        Value::Null => expected == "null",
        Value::Array(_) | Value::Object(_) => false,
    }
}
