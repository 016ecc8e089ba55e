pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, EventGate};
pub use error::{ActionError, EffectError, SchemaError, TickError};
pub use types::{GameStatus, Millis, Tick};
