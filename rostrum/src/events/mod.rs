//! Observer events: types, bus, and replay projection.

pub mod bus;
pub mod replay;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use replay::SessionProjection;
pub use types::{DebateEvent, SequencedEvent};
