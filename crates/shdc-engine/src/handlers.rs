//! Callback surfaces the engine drives. Everything past "a sensor joined"
//! or "this event arrived" — routing to automations, persistence, UI — is
//! the caller's business; these are the seams where that business starts.

use shdc_core::{DeviceId, ShdcError};

/// Callbacks a hub invokes as sensors join, report, and leave.
pub struct HubHandlers {
    /// A sensor completed JOIN_REQUEST/JOIN_RESPONSE and is now active.
    pub on_device_joined: Box<dyn Fn(DeviceId) + Send + Sync>,
    /// An authenticated event report arrived from an active sensor, with
    /// its application-defined event type tag.
    pub on_event: Box<dyn Fn(DeviceId, u8, Vec<u8>) + Send + Sync>,
    /// A sensor was administratively reset or dropped for repeated
    /// authentication failures.
    pub on_device_left: Box<dyn Fn(DeviceId) + Send + Sync>,
    /// A per-packet error occurred (decode, crypto, replay, protocol). The
    /// packet was dropped; this is purely informational.
    pub on_error: Box<dyn Fn(ShdcError) + Send + Sync>,
    /// Admission policy evaluated against a joining sensor's Ed25519 public
    /// key before it is issued a device id and session key. Returning
    /// `false` refuses the join (surfaced to `on_error` as
    /// `ProtocolError::JoinRefused`) instead of registering the sensor.
    /// Defaults to admitting everyone, since spec.md names no identity
    /// allow/blacklist source of truth.
    pub accept_join: Box<dyn Fn(&[u8; 32]) -> bool + Send + Sync>,
}

impl Default for HubHandlers {
    fn default() -> Self {
        Self {
            on_device_joined: Box::new(|_| {}),
            on_event: Box::new(|_, _, _| {}),
            on_device_left: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
            accept_join: Box::new(|_| true),
        }
    }
}

/// Callbacks a sensor invokes as it discovers, joins, and hears from its
/// hub.
pub struct SensorHandlers {
    /// JOIN_RESPONSE was accepted; the sensor is now active with the given
    /// hub-allocated device id.
    pub on_joined: Box<dyn Fn(DeviceId) + Send + Sync>,
    /// An authenticated broadcast command arrived from the joined hub,
    /// with its application-defined command type tag.
    pub on_command: Box<dyn Fn(u8, Vec<u8>) + Send + Sync>,
    /// The hub explicitly refused a join attempt.
    pub on_join_refused: Box<dyn Fn(String) + Send + Sync>,
    /// A per-packet error occurred. The packet was dropped; this is purely
    /// informational.
    pub on_error: Box<dyn Fn(ShdcError) + Send + Sync>,
}

impl Default for SensorHandlers {
    fn default() -> Self {
        Self {
            on_joined: Box::new(|_| {}),
            on_command: Box::new(|_, _| {}),
            on_join_refused: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }
}
