//! Fixed-timestep tick loop
//!
//! Drives autonomous simulation progress: tick-triggered rules and
//! probabilistic random events. The accumulator converts variable
//! wall-clock deltas into a whole number of uniform simulation steps, so
//! per-tick work is deterministic regardless of host scheduling jitter;
//! frame time is clamped to bound catch-up work after a stall.
//!
//! The loop itself never owns the clock: a host (or the room driver) calls
//! [`TickLoop::pump`] with the current time. Errors raised while applying
//! effects are routed to error callbacks and never stop the loop.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use crate::core::config::{EngineConfig, EventGate};
use crate::core::error::TickError;
use crate::core::types::Tick;
use crate::effects;
use crate::model::GameDefinition;
use crate::state::{SimulationState, StateSnapshot};

/// Decorrelates the event-sampling stream from the state-init stream when
/// both derive from the same definition seed
const EVENT_RNG_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

pub type TickCallback = Box<dyn FnMut(Tick, &StateSnapshot) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&TickError) + Send>;

/// Fixed-timestep scheduler for one room
pub struct TickLoop {
    definition: Arc<GameDefinition>,
    fixed_timestep_ms: f64,
    max_frame_ms: f64,
    event_gate: Option<EventGate>,
    accumulator: f64,
    last_time_ms: Option<f64>,
    running: bool,
    rng: ChaCha8Rng,
    tick_callbacks: Vec<TickCallback>,
    error_callbacks: Vec<ErrorCallback>,
}

impl TickLoop {
    pub fn new(definition: Arc<GameDefinition>, config: &EngineConfig) -> Self {
        let rng = match definition.meta.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ EVENT_RNG_STREAM),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            definition,
            fixed_timestep_ms: config.fixed_timestep_ms,
            max_frame_ms: config.max_frame_ms,
            event_gate: config.event_gate.clone(),
            accumulator: 0.0,
            last_time_ms: None,
            running: false,
            rng,
            tick_callbacks: Vec::new(),
            error_callbacks: Vec::new(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start ticking; idempotent while already running
    pub fn start(&mut self, state: &mut SimulationState) {
        if self.running {
            return;
        }
        self.running = true;
        self.accumulator = 0.0;
        self.last_time_ms = None;
        state.resume_game();
        tracing::info!(timestep_ms = self.fixed_timestep_ms, "tick loop started");
    }

    /// Stop ticking, discarding the unspent accumulator; idempotent
    pub fn stop(&mut self, state: &mut SimulationState) {
        if !self.running {
            return;
        }
        self.running = false;
        self.accumulator = 0.0;
        self.last_time_ms = None;
        state.pause_game();
        tracing::info!("tick loop stopped");
    }

    pub fn pause(&mut self, state: &mut SimulationState) {
        self.stop(state);
    }

    pub fn resume(&mut self, state: &mut SimulationState) {
        self.start(state);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn status_string(&self) -> &'static str {
        if self.running {
            "running"
        } else {
            "stopped"
        }
    }

    /// Clamped between 1 ms and 100 ms
    pub fn set_fixed_timestep(&mut self, timestep_ms: f64) {
        self.fixed_timestep_ms = timestep_ms.clamp(1.0, 100.0);
    }

    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep_ms
    }

    pub fn on_tick(&mut self, callback: impl FnMut(Tick, &StateSnapshot) + Send + 'static) {
        self.tick_callbacks.push(Box::new(callback));
    }

    pub fn on_error(&mut self, callback: impl FnMut(&TickError) + Send + 'static) {
        self.error_callbacks.push(Box::new(callback));
    }

    // ========================================================================
    // Accumulator
    // ========================================================================

    /// Credit elapsed wall time and run however many whole ticks it buys
    ///
    /// The first pump after a start only establishes the reference time.
    pub fn pump(&mut self, state: &mut SimulationState, now_ms: f64) {
        if !self.running {
            return;
        }

        let frame = match self.last_time_ms {
            Some(last) => (now_ms - last).max(0.0).min(self.max_frame_ms),
            None => 0.0,
        };
        self.last_time_ms = Some(now_ms);
        self.accumulator += frame;

        while self.accumulator >= self.fixed_timestep_ms {
            self.execute_tick(state);
            self.accumulator -= self.fixed_timestep_ms;
        }
    }

    /// Execute one discrete tick immediately, bypassing the accumulator
    pub fn force_tick(&mut self, state: &mut SimulationState) {
        self.execute_tick(state);
    }

    // ========================================================================
    // Discrete tick
    // ========================================================================

    fn execute_tick(&mut self, state: &mut SimulationState) {
        state.increment_tick();
        let tick = state.tick();

        self.process_tick_rules(state, tick);
        self.process_random_events(state, tick);
        self.notify_tick(tick, state);
    }

    fn process_tick_rules(&mut self, state: &mut SimulationState, tick: Tick) {
        let definition = Arc::clone(&self.definition);
        for (index, rule) in definition.tick_rules() {
            if let Some(frequency) = rule.frequency {
                if frequency > 0 && tick % frequency != 0 {
                    continue;
                }
            }
            if let Some(condition) = &rule.condition {
                if !state.check_condition(condition) {
                    continue;
                }
            }

            for effect in &rule.effects {
                if let Err(source) = effects::apply(effect, state) {
                    let error = TickError::Rule {
                        tick,
                        rule_index: index,
                        source,
                    };
                    tracing::warn!(%error, "tick rule effect failed");
                    self.notify_error(&error);
                }
            }
        }
    }

    fn process_random_events(&mut self, state: &mut SimulationState, tick: Tick) {
        if self.events_suppressed(state) {
            return;
        }

        let definition = Arc::clone(&self.definition);
        for event in &definition.random_events {
            if event.probability <= 0.0 {
                continue;
            }
            if event.probability < 1.0 && self.rng.gen::<f64>() >= event.probability {
                continue;
            }
            if !event
                .conditions
                .iter()
                .all(|condition| state.check_condition(condition))
            {
                continue;
            }

            tracing::info!(event = %event.name, tick, "random event triggered");
            for effect in &event.effects {
                if let Err(source) = effects::apply(effect, state) {
                    let error = TickError::RandomEvent {
                        tick,
                        event: event.name.clone(),
                        source,
                    };
                    tracing::warn!(%error, "random event effect failed");
                    self.notify_error(&error);
                }
            }
        }
    }

    /// Random events are suppressed entirely while the gate flag is truthy
    fn events_suppressed(&self, state: &SimulationState) -> bool {
        let Some(gate) = &self.event_gate else {
            return false;
        };
        state
            .get_entity_property(&gate.entity, &gate.property)
            .map_or(false, is_truthy)
    }

    fn notify_tick(&mut self, tick: Tick, state: &SimulationState) {
        if self.tick_callbacks.is_empty() {
            return;
        }
        let snapshot = state.snapshot();
        for callback in &mut self.tick_callbacks {
            callback(tick, &snapshot);
        }
    }

    fn notify_error(&mut self, error: &TickError) {
        for callback in &mut self.error_callbacks {
            callback(error);
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::error::EffectError;
    use crate::core::types::GameStatus;
    use crate::model::parser;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    fn build(raw: &str) -> (TickLoop, SimulationState) {
        let definition = Arc::new(parser::parse(raw).unwrap());
        let state = SimulationState::new(Arc::clone(&definition), Arc::new(ManualClock::new(0)));
        let ticker = TickLoop::new(definition, &EngineConfig::default());
        (ticker, state)
    }

    fn minimal_with(extra: &str) -> String {
        format!(
            r#"{{
                "meta": {{"name": "n", "version": "v", "description": "d", "author": "a", "seed": 7}},
                "vars": {{
                    "power": {{"value": 50, "min": 0, "max": 1000}},
                    "ticks_seen": {{"value": 0, "min": 0, "max": 1000000}}
                }},
                "entities": {{"reactor": {{"emergency_shutdown": false}}}}{}{}
            }}"#,
            if extra.is_empty() { "" } else { "," },
            extra
        )
    }

    const COUNT_RULE: &str = r#""rules": [{
        "trigger": "tick",
        "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
    }]"#;

    #[test]
    fn test_accumulator_runs_whole_timesteps() {
        let (mut ticker, mut state) = build(&minimal_with(COUNT_RULE));
        ticker.start(&mut state);

        ticker.pump(&mut state, 0.0); // establishes the reference time
        assert_eq!(state.tick(), 0);

        // 48 ms at a 16 ms step buys exactly 3 ticks
        ticker.pump(&mut state, 48.0);
        assert_eq!(state.tick(), 3);
        assert_eq!(state.get_variable("ticks_seen"), Some(3.0));

        // 8 ms buys nothing; the remainder carries over
        ticker.pump(&mut state, 56.0);
        assert_eq!(state.tick(), 3);
        ticker.pump(&mut state, 64.0);
        assert_eq!(state.tick(), 4);
    }

    #[test]
    fn test_frame_time_is_clamped() {
        let (mut ticker, mut state) = build(&minimal_with(COUNT_RULE));
        ticker.start(&mut state);
        ticker.pump(&mut state, 0.0);

        // a 10 s stall credits only max_frame_ms (50 ms) -> 3 ticks, not 625
        ticker.pump(&mut state, 10_000.0);
        assert_eq!(state.tick(), 3);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut ticker, mut state) = build(&minimal_with(COUNT_RULE));
        ticker.start(&mut state);
        ticker.pump(&mut state, 0.0);
        ticker.start(&mut state); // must not reset the reference time

        ticker.pump(&mut state, 32.0);
        assert_eq!(state.tick(), 2);
    }

    #[test]
    fn test_stop_discards_accumulator_and_is_idempotent() {
        let (mut ticker, mut state) = build(&minimal_with(COUNT_RULE));
        ticker.start(&mut state);
        ticker.pump(&mut state, 0.0);
        ticker.pump(&mut state, 15.0); // under one timestep, accumulates

        ticker.stop(&mut state);
        ticker.stop(&mut state);
        assert_eq!(ticker.status_string(), "stopped");
        assert_eq!(state.status(), GameStatus::Paused);

        // pumping while stopped does nothing
        ticker.pump(&mut state, 1_000.0);
        assert_eq!(state.tick(), 0);

        // restarting does not spend the discarded 15 ms
        ticker.resume(&mut state);
        ticker.pump(&mut state, 1_000.0);
        ticker.pump(&mut state, 1_015.0);
        assert_eq!(state.tick(), 0);
    }

    #[test]
    fn test_rule_frequency_fires_on_multiples() {
        let raw = minimal_with(
            r#""rules": [{
                "trigger": "tick",
                "frequency": 2,
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);

        for _ in 0..4 {
            ticker.force_tick(&mut state);
        }
        // ticks 1,2,3,4 -> fires on 2 and 4
        assert_eq!(state.get_variable("ticks_seen"), Some(2.0));
    }

    #[test]
    fn test_rule_condition_gates_effects() {
        let raw = minimal_with(
            r#""rules": [{
                "trigger": "tick",
                "condition": "power > 100",
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);

        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(0.0));

        state.set_variable("power", 200.0);
        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(1.0));
    }

    #[test]
    fn test_non_tick_rules_are_not_run() {
        let raw = minimal_with(
            r#""rules": [{
                "trigger": "event",
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);
        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(0.0));
    }

    #[test]
    fn test_certain_event_fires_every_tick() {
        let raw = minimal_with(
            r#""random_events": [{
                "name": "surge", "description": "d", "probability": 1.0,
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);
        for _ in 0..5 {
            ticker.force_tick(&mut state);
        }
        assert_eq!(state.get_variable("ticks_seen"), Some(5.0));
    }

    #[test]
    fn test_impossible_event_never_fires() {
        let raw = minimal_with(
            r#""random_events": [{
                "name": "surge", "description": "d", "probability": 0.0,
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);
        for _ in 0..100 {
            ticker.force_tick(&mut state);
        }
        assert_eq!(state.get_variable("ticks_seen"), Some(0.0));
    }

    #[test]
    fn test_event_condition_blocks_firing() {
        let raw = minimal_with(
            r#""random_events": [{
                "name": "surge", "description": "d", "probability": 1.0,
                "conditions": ["power > 500"],
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);
        for _ in 0..10 {
            ticker.force_tick(&mut state);
        }
        assert_eq!(state.get_variable("ticks_seen"), Some(0.0));

        state.set_variable("power", 600.0);
        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(1.0));
    }

    #[test]
    fn test_event_conditions_are_and_combined() {
        let raw = minimal_with(
            r#""random_events": [{
                "name": "surge", "description": "d", "probability": 1.0,
                "conditions": ["power > 10", "power < 20"],
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);

        state.set_variable("power", 50.0); // satisfies first, fails second
        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(0.0));

        state.set_variable("power", 15.0);
        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(1.0));
    }

    #[test]
    fn test_emergency_shutdown_gate_suppresses_events() {
        let raw = minimal_with(
            r#""random_events": [{
                "name": "surge", "description": "d", "probability": 1.0,
                "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
            }]"#,
        );
        let (mut ticker, mut state) = build(&raw);

        state.set_entity_property("reactor", "emergency_shutdown", Value::from(true));
        for _ in 0..5 {
            ticker.force_tick(&mut state);
        }
        assert_eq!(state.get_variable("ticks_seen"), Some(0.0));

        state.set_entity_property("reactor", "emergency_shutdown", Value::from(false));
        ticker.force_tick(&mut state);
        assert_eq!(state.get_variable("ticks_seen"), Some(1.0));
    }

    #[test]
    fn test_tick_callbacks_receive_snapshot() {
        let (mut ticker, mut state) = build(&minimal_with(COUNT_RULE));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ticker.on_tick(move |tick, snapshot| {
            sink.lock().unwrap().push((tick, snapshot.tick));
        });

        ticker.force_tick(&mut state);
        ticker.force_tick(&mut state);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn test_effect_errors_reach_error_callbacks_and_do_not_stop_ticking() {
        // update_score with a non-numeric value is an explicit effect error
        let raw = minimal_with(
            r#""rules": [
                {
                    "trigger": "tick",
                    "effects": [{"type": "update_score", "playerId": "p1", "value": "broken"}]
                },
                {
                    "trigger": "tick",
                    "effects": [{"type": "modify_var", "target": "ticks_seen", "operation": "add", "value": 1}]
                }
            ]"#,
        );
        let (mut ticker, mut state) = build(&raw);

        let errors = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&errors);
        ticker.on_error(move |error| {
            assert!(matches!(
                error,
                TickError::Rule {
                    rule_index: 0,
                    source: EffectError::ScoreValue { .. },
                    ..
                }
            ));
            sink.fetch_add(1, Ordering::SeqCst);
        });

        ticker.force_tick(&mut state);
        ticker.force_tick(&mut state);

        assert_eq!(errors.load(Ordering::SeqCst), 2);
        // the second rule kept running despite the first rule's error
        assert_eq!(state.get_variable("ticks_seen"), Some(2.0));
    }

    #[test]
    fn test_set_fixed_timestep_clamps() {
        let (mut ticker, _) = build(&minimal_with(""));
        ticker.set_fixed_timestep(0.0);
        assert_eq!(ticker.fixed_timestep(), 1.0);
        ticker.set_fixed_timestep(500.0);
        assert_eq!(ticker.fixed_timestep(), 100.0);
        ticker.set_fixed_timestep(20.0);
        assert_eq!(ticker.fixed_timestep(), 20.0);
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&Value::from(false)));
        assert!(!is_truthy(&Value::from(0)));
        assert!(!is_truthy(&Value::from("")));
        assert!(is_truthy(&Value::from(true)));
        assert!(is_truthy(&Value::from(1)));
        assert!(is_truthy(&Value::from("yes")));
    }
}
