//! Per-room serialization and the pump driver
//!
//! Two call sources mutate one room's state: player actions arriving from
//! the transport layer and the scheduler's autonomous ticks. A room wraps
//! its engine in a single mutex so an action's effect list and a tick's
//! rule pass each run to completion without interleaving; lock acquisition
//! order is application order, so first-submitted actions apply first.
//!
//! The optional driver task pumps the tick accumulator from the system
//! clock; hosts with their own scheduling loop can skip it and call
//! [`SimulationRoom::pump`] themselves.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::engine::GameEngine;
use crate::state::{ActionExecution, Player, PlayerProfile, StateSnapshot};

/// Shared handle to one room's engine
///
/// Clones refer to the same room.
#[derive(Clone)]
pub struct SimulationRoom {
    engine: Arc<Mutex<GameEngine>>,
    driver: Arc<Mutex<Option<JoinHandle<()>>>>,
    pump_interval: Duration,
}

impl SimulationRoom {
    pub fn new(engine: GameEngine) -> Self {
        let pump_interval = Duration::from_millis(engine.config().pump_interval_ms);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            driver: Arc::new(Mutex::new(None)),
            pump_interval,
        }
    }

    pub fn with_pump_interval(engine: GameEngine, pump_interval: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            driver: Arc::new(Mutex::new(None)),
            pump_interval,
        }
    }

    /// Run a closure against the engine under the room lock
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut GameEngine) -> R) -> R {
        let mut engine = self.engine.lock();
        f(&mut engine)
    }

    /// Submit a player action; actions are applied in lock-acquisition order
    pub fn process_action(
        &self,
        action_name: &str,
        player_id: &str,
        parameters: Map<String, Value>,
    ) -> ActionExecution {
        self.with_engine(|engine| engine.process_action(action_name, player_id, parameters))
    }

    pub fn add_player(&self, profile: PlayerProfile) -> Player {
        self.with_engine(|engine| engine.add_player(profile))
    }

    pub fn remove_player(&self, player_id: &str) -> bool {
        self.with_engine(|engine| engine.remove_player(player_id))
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.with_engine(|engine| engine.get_state())
    }

    pub fn start(&self) {
        self.with_engine(|engine| engine.start());
    }

    pub fn stop(&self) {
        self.with_engine(|engine| engine.stop());
    }

    /// Pump the tick accumulator once; for hosts driving the clock themselves
    pub fn pump(&self) {
        self.with_engine(|engine| engine.pump());
    }

    // ========================================================================
    // Driver task
    // ========================================================================

    /// Spawn a background task that pumps the accumulator periodically
    ///
    /// Replaces any previously spawned driver. Must be called from within a
    /// tokio runtime. The driver only moves time forward; starting and
    /// stopping the loop itself stays with `start`/`stop`.
    pub fn spawn_driver(&self) {
        let engine = Arc::clone(&self.engine);
        let interval = self.pump_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.lock().pump();
            }
        });

        if let Some(previous) = self.driver.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(interval_ms = interval.as_millis() as u64, "room driver spawned");
    }

    /// Stop the driver task; idempotent, the unspent accumulator is
    /// discarded with the next `stop`/`start` cycle
    pub fn stop_driver(&self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
            tracing::debug!("room driver stopped");
        }
    }
}

impl Drop for SimulationRoom {
    fn drop(&mut self) {
        // last handle out stops the driver
        if Arc::strong_count(&self.driver) == 1 {
            self.stop_driver();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use crate::core::config::EngineConfig;
    use crate::model::parser;
    use std::sync::Arc;

    const DEFINITION: &str = r#"{
        "meta": {"name": "Room", "version": "1.0", "description": "d", "author": "a"},
        "vars": {"power": {"value": 50, "min": 0, "max": 1000}},
        "rules": [{
            "trigger": "tick",
            "effects": [{"type": "modify_var", "target": "power", "operation": "add", "value": 1}]
        }]
    }"#;

    fn room() -> SimulationRoom {
        let engine = GameEngine::with_config(
            parser::parse(DEFINITION).unwrap(),
            EngineConfig::default(),
            Arc::new(SystemClock),
        );
        SimulationRoom::new(engine)
    }

    #[test]
    fn test_clones_share_one_room() {
        let room = room();
        let other = room.clone();
        let player = room.add_player(PlayerProfile::default());
        assert_eq!(other.snapshot().players.len(), 1);
        assert!(other.remove_player(&player.id));
        assert_eq!(room.snapshot().players.len(), 0);
    }

    #[tokio::test]
    async fn test_driver_advances_ticks() {
        let room = room();
        room.start();
        room.spawn_driver();

        tokio::time::sleep(Duration::from_millis(120)).await;
        room.stop_driver();
        let ticks = room.snapshot().tick;
        assert!(ticks > 0, "driver should have produced ticks, got {ticks}");

        // no further progress after the driver stops
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(room.snapshot().tick, ticks);
    }

    #[tokio::test]
    async fn test_driver_respects_stopped_loop() {
        let room = room();
        room.spawn_driver();
        tokio::time::sleep(Duration::from_millis(60)).await;
        room.stop_driver();
        // the loop was never started, so pumping moved nothing
        assert_eq!(room.snapshot().tick, 0);
    }
}
