//! Engine facade
//!
//! One `GameEngine` per simulation room: it owns the definition, the state
//! store, the action processor, and the tick loop, and exposes the narrow
//! synchronous API the transport and persistence layers consume. Engines
//! share nothing; constructing two engines gives two fully independent
//! rooms.

use std::sync::Arc;

use ahash::AHashMap;
use serde_json::{Map, Value};

use crate::actions::ActionProcessor;
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::EngineConfig;
use crate::core::error::{SchemaError, TickError};
use crate::core::types::{GameStatus, Millis, Tick};
use crate::model::{parser, ActionDef, GameDefinition};
use crate::scheduler::TickLoop;
use crate::state::{
    ActionExecution, GameEvent, Player, PlayerProfile, PlayerUpdate, SimulationState, StateSnapshot,
};

/// A complete engine instance serving exactly one simulation room
pub struct GameEngine {
    definition: Arc<GameDefinition>,
    config: EngineConfig,
    state: SimulationState,
    processor: ActionProcessor,
    ticker: TickLoop,
    clock: Arc<dyn Clock>,
}

impl GameEngine {
    /// Parse a JSON game definition and build an engine for it
    pub fn from_json(raw: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(parser::parse(raw)?))
    }

    pub fn new(definition: GameDefinition) -> Self {
        Self::with_config(definition, EngineConfig::default(), Arc::new(SystemClock))
    }

    /// Build an engine with explicit configuration and clock
    pub fn with_config(
        definition: GameDefinition,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let definition = Arc::new(definition);
        let state = SimulationState::new(Arc::clone(&definition), Arc::clone(&clock));
        let processor = ActionProcessor::new(Arc::clone(&definition), Arc::clone(&clock));
        let ticker = TickLoop::new(Arc::clone(&definition), &config);
        tracing::info!(game = %definition.meta.name, "engine created");

        Self {
            definition,
            config,
            state,
            processor,
            ticker,
            clock,
        }
    }

    pub fn definition(&self) -> &Arc<GameDefinition> {
        &self.definition
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only access to the state store
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub fn process_action(
        &mut self,
        action_name: &str,
        player_id: &str,
        parameters: Map<String, Value>,
    ) -> ActionExecution {
        self.processor
            .process_action(&mut self.state, action_name, player_id, parameters)
    }

    pub fn available_actions(&self, player_id: &str) -> Vec<ActionDef> {
        self.processor.available_actions(&self.state, player_id)
    }

    pub fn get_action_history(&self) -> &[ActionExecution] {
        self.processor.action_history()
    }

    pub fn get_player_action_history(&self, player_id: &str) -> Vec<ActionExecution> {
        self.processor.player_action_history(player_id)
    }

    pub fn get_recent_actions(&self, count: usize) -> &[ActionExecution] {
        self.processor.recent_actions(count)
    }

    pub fn cooldown_remaining(&self, action_name: &str, player_id: &str) -> Option<Millis> {
        self.processor.cooldown_remaining(action_name, player_id)
    }

    pub fn get_action_cooldowns(&self, player_id: &str) -> AHashMap<String, u64> {
        self.processor.player_cooldowns(player_id)
    }

    pub fn clear_cooldown(&mut self, action_name: &str, player_id: &str) {
        self.processor.clear_cooldown(action_name, player_id);
    }

    pub fn clear_player_cooldowns(&mut self, player_id: &str) {
        self.processor.clear_player_cooldowns(player_id);
    }

    pub fn clear_all_cooldowns(&mut self) {
        self.processor.clear_all_cooldowns();
    }

    // ========================================================================
    // State reads and player management
    // ========================================================================

    pub fn get_variable(&self, name: &str) -> Option<f64> {
        self.state.get_variable(name)
    }

    pub fn get_entity_property(&self, entity: &str, property: &str) -> Option<&Value> {
        self.state.get_entity_property(entity, property)
    }

    pub fn get_score(&self, player_id: &str) -> f64 {
        self.state.get_score(player_id)
    }

    pub fn get_scores(&self) -> &AHashMap<String, f64> {
        self.state.scores()
    }

    /// Read-only snapshot of the whole observable state
    pub fn get_state(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn get_logs(&self) -> &[String] {
        self.state.logs()
    }

    pub fn get_events(&self) -> &[GameEvent] {
        self.state.events()
    }

    pub fn add_player(&mut self, profile: PlayerProfile) -> Player {
        self.state.add_player(profile)
    }

    pub fn remove_player(&mut self, player_id: &str) -> bool {
        self.state.remove_player(player_id)
    }

    pub fn update_player(&mut self, player_id: &str, update: PlayerUpdate) -> bool {
        self.state.update_player(player_id, update)
    }

    pub fn check_condition(&self, condition: &str) -> bool {
        self.state.check_condition(condition)
    }

    /// Reset to the definition's initial snapshot, clearing cooldowns and
    /// all history
    pub fn reset(&mut self) {
        self.state.reset();
        self.processor.clear_all_cooldowns();
        self.processor.clear_action_history();
        tracing::info!(game = %self.definition.meta.name, "engine reset");
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    pub fn start(&mut self) {
        self.ticker.start(&mut self.state);
    }

    pub fn stop(&mut self) {
        self.ticker.stop(&mut self.state);
    }

    pub fn pause(&mut self) {
        self.ticker.pause(&mut self.state);
    }

    pub fn resume(&mut self) {
        self.ticker.resume(&mut self.state);
    }

    pub fn force_tick(&mut self) {
        self.ticker.force_tick(&mut self.state);
    }

    /// Credit elapsed wall time from this engine's clock and run any due
    /// ticks; hosts call this from their scheduling loop
    pub fn pump(&mut self) {
        let now = self.clock.now_ms() as f64;
        self.ticker.pump(&mut self.state, now);
    }

    pub fn on_tick(&mut self, callback: impl FnMut(Tick, &StateSnapshot) + Send + 'static) {
        self.ticker.on_tick(callback);
    }

    pub fn on_error(&mut self, callback: impl FnMut(&TickError) + Send + 'static) {
        self.ticker.on_error(callback);
    }

    pub fn get_status_string(&self) -> &'static str {
        self.ticker.status_string()
    }

    pub fn get_current_tick(&self) -> Tick {
        self.state.tick()
    }

    pub fn status(&self) -> GameStatus {
        self.state.status()
    }

    pub fn set_fixed_timestep(&mut self, timestep_ms: f64) {
        self.ticker.set_fixed_timestep(timestep_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    const DEFINITION: &str = r#"{
        "meta": {"name": "Facade", "version": "1.0", "description": "d", "author": "a"},
        "vars": {"power": {"value": 50, "min": 0, "max": 100}},
        "actions": [{
            "name": "boost",
            "effects": [{"type": "modify_var", "target": "power", "operation": "add", "value": 10}]
        }]
    }"#;

    #[test]
    fn test_from_json_builds_working_engine() {
        let mut engine = GameEngine::from_json(DEFINITION).unwrap();
        let player = engine.add_player(PlayerProfile {
            alias: "op".into(),
            role: "engineer".into(),
        });
        let execution = engine.process_action("boost", &player.id, Map::new());
        assert!(execution.success);
        assert_eq!(engine.get_variable("power"), Some(60.0));
    }

    #[test]
    fn test_from_json_surfaces_schema_errors() {
        assert!(GameEngine::from_json("{}").is_err());
    }

    #[test]
    fn test_rooms_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let definition = parser::parse(DEFINITION).unwrap();
        let mut a =
            GameEngine::with_config(definition.clone(), EngineConfig::default(), clock.clone());
        let mut b = GameEngine::with_config(definition, EngineConfig::default(), clock);

        let player = a.add_player(PlayerProfile::default());
        a.process_action("boost", &player.id, Map::new());

        assert_eq!(a.get_variable("power"), Some(60.0));
        assert_eq!(b.get_variable("power"), Some(50.0));
        assert_eq!(b.get_state().players.len(), 0);
        b.force_tick();
        assert_eq!(a.get_current_tick(), 0);
        assert_eq!(b.get_current_tick(), 1);
    }

    #[test]
    fn test_reset_clears_cooldowns_and_history() {
        let clock = Arc::new(ManualClock::new(1_000));
        let raw = r#"{
            "meta": {"name": "n", "version": "v", "description": "d", "author": "a"},
            "vars": {"power": {"value": 50, "min": 0, "max": 100}},
            "actions": [{
                "name": "vent",
                "effects": [],
                "requirements": [
                    {"type": "cooldown", "target": "vent", "condition": "cooldown", "value": 60000}
                ]
            }]
        }"#;
        let mut engine = GameEngine::with_config(
            parser::parse(raw).unwrap(),
            EngineConfig::default(),
            clock,
        );
        let player = engine.add_player(PlayerProfile::default());
        let player_id = player.id.clone();
        assert!(engine.process_action("vent", &player_id, Map::new()).success);
        assert!(engine.cooldown_remaining("vent", &player_id).is_some());

        engine.reset();
        assert!(engine.get_action_history().is_empty());
        assert!(engine.cooldown_remaining("vent", &player_id).is_none());
        // players were discarded by the reset
        assert!(!engine.process_action("vent", &player_id, Map::new()).success);
    }
}
