//! Simulation state store
//!
//! The single mutable owner of all live simulation data: variables,
//! entities, players, scores, logs, events, tick counter, and status. Every
//! other component reads and writes through this store, never around it, so
//! serializing access to one `SimulationState` serializes the whole room.
//!
//! Each store is an explicit owned instance created from a definition;
//! there are no process-wide singletons, so many rooms (and tests) run
//! independently in one process.

use std::sync::Arc;

use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::types::{GameStatus, Millis, Tick};
use crate::expr;
use crate::model::{EntityBag, GameDefinition, ModifyOperation};

/// A player in the room; ids are generated by the store, never supplied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub alias: String,
    pub role: String,
    #[serde(rename = "joinedAt")]
    pub joined_at: Millis,
    #[serde(rename = "lastSeen")]
    pub last_seen: Millis,
    /// Names of actions this player has taken, in order
    pub actions: Vec<String>,
    /// Convenience copy; the canonical score lives in the state score index
    pub score: f64,
}

/// Identity supplied by the caller when joining a room
#[derive(Debug, Clone, Default)]
pub struct PlayerProfile {
    pub alias: String,
    pub role: String,
}

/// Partial player update; unset fields are left alone
#[derive(Debug, Clone, Default)]
pub struct PlayerUpdate {
    pub alias: Option<String>,
    pub role: Option<String>,
    pub score: Option<f64>,
}

/// Structured entry in the append-only event feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
    pub timestamp: Millis,
}

/// Record of one processed action, success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecution {
    #[serde(rename = "actionName")]
    pub action_name: String,
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub parameters: serde_json::Map<String, Value>,
    pub timestamp: Millis,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only copy of the live state for callbacks and the transport layer
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub vars: AHashMap<String, f64>,
    pub entities: AHashMap<String, EntityBag>,
    pub players: AHashMap<String, Player>,
    pub score: AHashMap<String, f64>,
    pub events: Vec<GameEvent>,
    pub logs: Vec<String>,
    pub tick: Tick,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(rename = "lastAction", skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
    #[serde(rename = "lastActionTime", skip_serializing_if = "Option::is_none")]
    pub last_action_time: Option<Millis>,
}

/// Mutable per-room simulation state
pub struct SimulationState {
    definition: Arc<GameDefinition>,
    clock: Arc<dyn Clock>,
    vars: AHashMap<String, f64>,
    entities: AHashMap<String, EntityBag>,
    players: AHashMap<String, Player>,
    score: AHashMap<String, f64>,
    events: Vec<GameEvent>,
    logs: Vec<String>,
    tick: Tick,
    status: GameStatus,
    winner: Option<String>,
    last_action: Option<String>,
    last_action_time: Option<Millis>,
    history: Vec<ActionExecution>,
    rng: ChaCha8Rng,
}

impl SimulationState {
    /// Create state from a definition, applying any randomized initialization
    pub fn new(definition: Arc<GameDefinition>, clock: Arc<dyn Clock>) -> Self {
        let rng = match definition.meta.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut state = Self {
            definition,
            clock,
            vars: AHashMap::new(),
            entities: AHashMap::new(),
            players: AHashMap::new(),
            score: AHashMap::new(),
            events: Vec::new(),
            logs: Vec::new(),
            tick: 0,
            status: GameStatus::Waiting,
            winner: None,
            last_action: None,
            last_action_time: None,
            history: Vec::new(),
            rng,
        };
        state.initialize();
        state
    }

    /// Rebuild variables and entities from the definition
    fn initialize(&mut self) {
        let definition = Arc::clone(&self.definition);

        self.vars = definition
            .variables
            .iter()
            .map(|(name, var)| (name.clone(), var.initial))
            .collect();
        self.entities = definition.entities.clone();

        if let Some(init) = &definition.init_random {
            for (name, range) in &init.vars {
                if !definition.variables.contains_key(name) {
                    continue;
                }
                let (lo, hi) = if range.min <= range.max {
                    (range.min, range.max)
                } else {
                    (range.max, range.min)
                };
                if lo.is_finite() && hi.is_finite() {
                    self.vars.insert(name.clone(), self.rng.gen_range(lo..=hi));
                }
            }
            for (name, overrides) in &init.entities {
                if let Some(bag) = self.entities.get_mut(name) {
                    for (key, value) in overrides {
                        bag.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// Reset back to the definition's initial snapshot
    ///
    /// Discards all players, scores, logs, events, history, and ticks.
    /// Cooldowns are owned by the action processor and must be cleared
    /// separately by the caller.
    pub fn reset(&mut self) {
        self.players.clear();
        self.score.clear();
        self.events.clear();
        self.logs.clear();
        self.history.clear();
        self.tick = 0;
        self.status = GameStatus::Waiting;
        self.winner = None;
        self.last_action = None;
        self.last_action_time = None;
        self.initialize();
    }

    pub fn definition(&self) -> &Arc<GameDefinition> {
        &self.definition
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// Write a variable, clamped to its declared bounds
    ///
    /// NaN restores the definition's initial value; positive/negative
    /// infinity clamp to max/min. Unknown names are a no-op and return
    /// `false`.
    pub fn set_variable(&mut self, name: &str, value: f64) -> bool {
        let Some((initial, min, max)) = self
            .definition
            .variables
            .get(name)
            .map(|var| (var.initial, var.min, var.max))
        else {
            return false;
        };

        let processed = if value.is_nan() {
            initial
        } else if value == f64::INFINITY {
            max
        } else if value == f64::NEG_INFINITY {
            min
        } else {
            value
        };

        self.vars.insert(name.to_owned(), processed.min(max).max(min));
        true
    }

    /// Arithmetic update on a variable, delegating clamping to
    /// [`set_variable`](Self::set_variable)
    ///
    /// Division by zero leaves the value unchanged. `Set` is not a modify
    /// operation and returns `false`.
    pub fn modify_variable(&mut self, name: &str, operation: ModifyOperation, amount: f64) -> bool {
        if !self.definition.variables.contains_key(name) {
            return false;
        }
        let current = self.vars.get(name).copied().unwrap_or(0.0);

        let next = match operation {
            ModifyOperation::Add => current + amount,
            ModifyOperation::Subtract => current - amount,
            ModifyOperation::Multiply => current * amount,
            ModifyOperation::Divide => {
                if amount != 0.0 {
                    current / amount
                } else {
                    current
                }
            }
            ModifyOperation::Set => return false,
        };

        self.set_variable(name, next)
    }

    pub fn get_variable(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }

    pub fn variables(&self) -> &AHashMap<String, f64> {
        &self.vars
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Overwrite one entity property, creating the entity bag if absent
    pub fn set_entity_property(&mut self, entity: &str, property: &str, value: Value) {
        self.entities
            .entry(entity.to_owned())
            .or_default()
            .insert(property.to_owned(), value);
    }

    pub fn get_entity(&self, entity: &str) -> Option<&EntityBag> {
        self.entities.get(entity)
    }

    pub fn get_entity_property(&self, entity: &str, property: &str) -> Option<&Value> {
        self.entities.get(entity).and_then(|bag| bag.get(property))
    }

    // ========================================================================
    // Players
    // ========================================================================

    /// Add a player, generating a fresh unique id
    ///
    /// Always succeeds; duplicate aliases get distinct ids.
    pub fn add_player(&mut self, profile: PlayerProfile) -> Player {
        let now = self.clock.now_ms();
        let player = Player {
            id: Uuid::new_v4().to_string(),
            alias: profile.alias,
            role: profile.role,
            joined_at: now,
            last_seen: now,
            actions: Vec::new(),
            score: 0.0,
        };
        self.players.insert(player.id.clone(), player.clone());
        player
    }

    pub fn remove_player(&mut self, player_id: &str) -> bool {
        self.players.remove(player_id).is_some()
    }

    /// Apply a partial update and refresh `last_seen`
    pub fn update_player(&mut self, player_id: &str, update: PlayerUpdate) -> bool {
        let now = self.clock.now_ms();
        match self.players.get_mut(player_id) {
            Some(player) => {
                if let Some(alias) = update.alias {
                    player.alias = alias;
                }
                if let Some(role) = update.role {
                    player.role = role;
                }
                if let Some(score) = update.score {
                    player.score = score;
                }
                player.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn get_player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn players(&self) -> &AHashMap<String, Player> {
        &self.players
    }

    // ========================================================================
    // Scores
    // ========================================================================

    /// Set a player's score to an absolute value (not additive)
    pub fn update_score(&mut self, player_id: &str, score: f64) {
        self.score.insert(player_id.to_owned(), score);
    }

    pub fn get_score(&self, player_id: &str) -> f64 {
        self.score.get(player_id).copied().unwrap_or(0.0)
    }

    pub fn scores(&self) -> &AHashMap<String, f64> {
        &self.score
    }

    // ========================================================================
    // Status and clock
    // ========================================================================

    /// Drive the status machine; finished is terminal
    pub fn set_status(&mut self, status: GameStatus) {
        if self.status.is_terminal() && status != self.status {
            return;
        }
        self.status = status;
    }

    pub fn start_game(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = GameStatus::Running;
        self.tick = 0;
    }

    pub fn pause_game(&mut self) {
        self.set_status(GameStatus::Paused);
    }

    pub fn resume_game(&mut self) {
        self.set_status(GameStatus::Running);
    }

    pub fn end_game(&mut self, winner: Option<String>) {
        self.set_status(GameStatus::Finished);
        if winner.is_some() {
            self.winner = winner;
        }
    }

    pub fn increment_tick(&mut self) {
        self.tick += 1;
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    // ========================================================================
    // Logs, events, history
    // ========================================================================

    pub fn add_log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }

    pub fn add_event(&mut self, event_type: impl Into<String>, message: impl Into<String>) {
        self.events.push(GameEvent {
            event_type: event_type.into(),
            message: message.into(),
            timestamp: self.clock.now_ms(),
        });
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Append an execution record and update last-action bookkeeping
    ///
    /// Called for successes and failures alike; the action name is added to
    /// the acting player's list if that player still exists.
    pub fn record_action(&mut self, execution: ActionExecution) {
        self.last_action = Some(execution.action_name.clone());
        self.last_action_time = Some(execution.timestamp);
        if let Some(player) = self.players.get_mut(&execution.player_id) {
            player.actions.push(execution.action_name.clone());
        }
        self.history.push(execution);
    }

    pub fn action_history(&self) -> &[ActionExecution] {
        &self.history
    }

    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    // ========================================================================
    // Conditions and snapshots
    // ========================================================================

    /// Evaluate a condition against current values; never fails
    pub fn check_condition(&self, condition: &str) -> bool {
        expr::evaluate_condition(condition, &self.vars, &self.entities)
    }

    /// Clone the observable state for callbacks and broadcast
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            vars: self.vars.clone(),
            entities: self.entities.clone(),
            players: self.players.clone(),
            score: self.score.clone(),
            events: self.events.clone(),
            logs: self.logs.clone(),
            tick: self.tick,
            status: self.status,
            winner: self.winner.clone(),
            last_action: self.last_action.clone(),
            last_action_time: self.last_action_time,
        }
    }
}
