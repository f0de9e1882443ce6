//! Runs the two protocol roles over a pluggable clock and transport: state
//! machines, key-rotation schedulers, and the inbound dispatch pipeline
//! that ties `shdc-codec`, `shdc-crypto`, `shdc-keystore`, and
//! `shdc-replay` together into something you can actually point at a
//! socket.

#![warn(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod effects;
pub mod envelope;
pub mod handlers;
mod hub;
mod sensor;

pub use config::{DiscoveryConfig, EngineConfig, RotationConfig};
pub use effects::{ClockEffects, PeerAddr, SystemClock, TransportEffects};
pub use handlers::{HubHandlers, SensorHandlers};
pub use hub::{spawn_broadcast_rotation_scheduler, spawn_session_rotation_scheduler, HubEngine};
pub use sensor::{SensorEngine, SensorState};

#[cfg(feature = "testing")]
pub use effects::{FakeClock, InMemoryNetwork, InMemoryTransport};
