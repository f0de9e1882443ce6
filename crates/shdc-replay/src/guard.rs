//! Replay and freshness checking: invariant 1 (±30s clock skew) and
//! invariant 2 (no repeated `(DeviceId, Nonce3)` within the retention
//! window) from the protocol design.

use parking_lot::Mutex;
use shdc_core::constants::{FRESHNESS_WINDOW, REPLAY_RETENTION};
use shdc_core::{DeviceId, Nonce3, ReplayError};
use std::collections::HashMap;
use tracing::trace;

/// Lazily swept every this many inserts, to avoid paying sweep cost on
/// every single packet.
const DEFAULT_SWEEP_INTERVAL: u64 = 64;

struct State {
    seen: HashMap<(DeviceId, Nonce3), u32>,
    inserts_since_sweep: u64,
}

/// Thread-safe replay guard, one per hub (keyed by device) or one per
/// sensor (tracking its hub and broadcast senders).
pub struct ReplayGuard {
    state: Mutex<State>,
    sweep_interval: u64,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl ReplayGuard {
    /// Build a guard that sweeps stale entries every `sweep_interval`
    /// inserts.
    pub fn new(sweep_interval: u64) -> Self {
        Self {
            state: Mutex::new(State {
                seen: HashMap::new(),
                inserts_since_sweep: 0,
            }),
            sweep_interval: sweep_interval.max(1),
        }
    }

    /// Check `(device_id, nonce)` at header `timestamp` against the
    /// current time `now` (both epoch seconds). On success the pair is
    /// recorded so a later replay of the same packet is rejected.
    pub fn check(
        &self,
        device_id: DeviceId,
        nonce: Nonce3,
        timestamp: u32,
        now: u32,
    ) -> Result<(), ReplayError> {
        let skew = timestamp.abs_diff(now);
        if skew as u64 > FRESHNESS_WINDOW.as_secs() {
            return Err(ReplayError::StaleTimestamp);
        }

        let mut state = self.state.lock();
        let key = (device_id, nonce);
        if state.seen.contains_key(&key) {
            return Err(ReplayError::ReplayedNonce);
        }
        state.seen.insert(key, now);
        state.inserts_since_sweep += 1;

        if state.inserts_since_sweep >= self.sweep_interval {
            sweep(&mut state, now);
        }

        Ok(())
    }

    /// Forget every nonce recorded for `device_id` (administrative reset).
    pub fn forget_device(&self, device_id: DeviceId) {
        self.state
            .lock()
            .seen
            .retain(|(id, _), _| *id != device_id);
    }

    /// Number of entries currently retained, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.state.lock().seen.len()
    }

    /// True if no entries are currently retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(state: &mut State, now: u32) {
    let retention = REPLAY_RETENTION.as_secs() as u32;
    let before = state.seen.len();
    state
        .seen
        .retain(|_, seen_at| now.saturating_sub(*seen_at) <= retention);
    state.inserts_since_sweep = 0;
    trace!(removed = before - state.seen.len(), "replay guard swept");
}
