//! Simforge - declarative game-simulation engine
//!
//! Loads a JSON game definition (variables, entities, actions, rules,
//! random events) and turns it into a live, mutable simulation that players
//! drive through discrete actions and a fixed-timestep clock. One
//! [`engine::GameEngine`] serves one room; wrap it in a
//! [`room::SimulationRoom`] to serialize concurrent access.

pub mod actions;
pub mod core;
pub mod effects;
pub mod engine;
pub mod expr;
pub mod model;
pub mod room;
pub mod scheduler;
pub mod state;
