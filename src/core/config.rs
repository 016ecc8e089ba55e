//! Engine configuration with documented constants
//!
//! Collects the scheduling knobs and the random-event gate in one place.
//! One config is handed to each engine instance; there is no global config,
//! so rooms can run with different settings in the same process.

/// Entity flag that suppresses random events while truthy
///
/// Generalizes the emergency-shutdown check: while
/// `entities[entity][property]` holds a truthy value, the scheduler skips
/// random-event processing entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGate {
    pub entity: String,
    pub property: String,
}

impl EventGate {
    pub fn new(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
        }
    }
}

/// Configuration for one engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Length of one discrete simulation step in milliseconds
    ///
    /// At the default (16 ms) the simulation advances at roughly 60 ticks
    /// per second of wall time. Game definitions that want slower pacing
    /// use rule `frequency` rather than a longer timestep.
    pub fixed_timestep_ms: f64,

    /// Maximum wall-clock delta credited to the accumulator per pump
    ///
    /// Caps catch-up work after a host stall: a frame longer than this is
    /// clamped, trading simulated time for bounded per-pump work (the
    /// "spiral of death" guard). Must be at least one timestep.
    pub max_frame_ms: f64,

    /// How often the room driver pumps the accumulator, in milliseconds
    ///
    /// Only used by the optional `room` driver task; hosts that drive
    /// `pump` themselves can ignore it. Smaller values reduce tick jitter
    /// at the cost of more wakeups.
    pub pump_interval_ms: u64,

    /// Entity flag that suppresses random events while truthy
    ///
    /// Defaults to `reactor.emergency_shutdown`, which stock reactor
    /// definitions rely on. Set to `None` to always process random events.
    pub event_gate: Option<EventGate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_timestep_ms: 16.0,
            max_frame_ms: 50.0,
            pump_interval_ms: 5,
            event_gate: Some(EventGate::new("reactor", "emergency_shutdown")),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if !(self.fixed_timestep_ms > 0.0) {
            return Err(format!(
                "fixed_timestep_ms ({}) must be positive",
                self.fixed_timestep_ms
            ));
        }

        if self.max_frame_ms < self.fixed_timestep_ms {
            return Err(format!(
                "max_frame_ms ({}) must be >= fixed_timestep_ms ({})",
                self.max_frame_ms, self.fixed_timestep_ms
            ));
        }

        if self.pump_interval_ms == 0 {
            return Err("pump_interval_ms must be at least 1".into());
        }

        Ok(())
    }
}
