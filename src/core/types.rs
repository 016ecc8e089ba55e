//! Core type definitions used throughout the engine

use serde::{Deserialize, Serialize};

/// Simulation tick counter (discrete simulation time unit)
pub type Tick = u64;

/// Wall-clock timestamp in milliseconds, as reported by a [`Clock`](crate::core::clock::Clock)
pub type Millis = u64;

/// Lifecycle state of a simulation room
///
/// Transitions: `waiting -> running <-> paused -> finished`. Finished is
/// terminal; only a full reset leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Running,
    Paused,
    Finished,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }

    /// Returns true once the game can no longer leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl Default for GameStatus {
    fn default() -> Self {
        Self::Waiting
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        let json = serde_json::to_string(&GameStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let back: GameStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GameStatus::Running);
    }

    #[test]
    fn test_only_finished_is_terminal() {
        assert!(GameStatus::Finished.is_terminal());
        assert!(!GameStatus::Waiting.is_terminal());
        assert!(!GameStatus::Running.is_terminal());
        assert!(!GameStatus::Paused.is_terminal());
    }
}
