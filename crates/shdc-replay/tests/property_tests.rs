//! P4 (freshness) and P5 (replay) property tests.

use proptest::prelude::*;
use shdc_core::constants::FRESHNESS_WINDOW;
use shdc_core::{DeviceId, Nonce3};
use shdc_replay::ReplayGuard;

proptest! {
    /// P4: a packet is accepted only when its timestamp is within the
    /// freshness window of `now`.
    #[test]
    fn freshness_window_is_respected(
        device_id in any::<u32>(),
        nonce in any::<[u8; 3]>(),
        timestamp in any::<u32>(),
        now in any::<u32>(),
    ) {
        let guard = ReplayGuard::default();
        let result = guard.check(DeviceId(device_id), Nonce3(nonce), timestamp, now);

        let skew = timestamp.abs_diff(now) as u64;
        if skew > FRESHNESS_WINDOW.as_secs() {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }

    /// P5: the same `(device_id, nonce)` pair is never accepted twice.
    #[test]
    fn repeated_nonce_is_always_rejected_on_second_use(
        device_id in any::<u32>(),
        nonce in any::<[u8; 3]>(),
        timestamp in any::<u32>(),
    ) {
        let guard = ReplayGuard::default();
        let first = guard.check(DeviceId(device_id), Nonce3(nonce), timestamp, timestamp);
        prop_assert!(first.is_ok());

        let second = guard.check(DeviceId(device_id), Nonce3(nonce), timestamp, timestamp);
        prop_assert!(second.is_err());
    }
}
