//! Clock synchronization against the host time base.
//!
//! The device's wall clock is never trusted for signing. One health call
//! per established connection anchors the host's reported unix time to a
//! local monotonic `Instant`; every later signature timestamp is the
//! anchor plus monotonic elapsed time. Skipping the sync produces
//! signatures the host may reject as outside its tolerance window.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::client::BridgeClient;
use crate::errors::BridgeError;

/// Host time anchored to a local monotonic instant.
#[derive(Clone, Copy, Debug)]
pub struct ClockOffset {
    host_time_at_sync: u64,
    synced_at: Instant,
}

impl ClockOffset {
    pub fn new(host_time: u64) -> Self {
        Self {
            host_time_at_sync: host_time,
            synced_at: Instant::now(),
        }
    }

    /// Current time on the host's clock, in unix seconds.
    pub fn now(&self) -> u64 {
        self.host_time_at_sync + self.synced_at.elapsed().as_secs()
    }
}

/// The device's own wall clock, used only to timestamp the sync call
/// itself before any host time base exists.
pub fn local_unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Query the host's current time once and build the offset. Must run
/// once per established connection (reconnects included) before the
/// first signed, non-pairing request.
pub async fn sync(client: &BridgeClient, auth_key: &[u8; 32]) -> Result<ClockOffset, BridgeError> {
    let health = client
        .health(auth_key, local_unix_now())
        .await
        .map_err(|e| BridgeError::ClockSyncFailed(e.to_string()))?;

    let offset = ClockOffset::new(health.now);
    debug!(host_time = health.now, "clock synced to host");
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_tracks_host_time() {
        let offset = ClockOffset::new(1_760_000_000);
        let now = offset.now();
        // Immediately after sync, no whole second has elapsed.
        assert!(now >= 1_760_000_000 && now <= 1_760_000_001);
    }

    #[test]
    fn test_offset_independent_of_wall_clock() {
        // A host far ahead of this machine's clock is followed verbatim.
        let far_future = local_unix_now() + 1_000_000;
        let offset = ClockOffset::new(far_future);
        assert!(offset.now() >= far_future);
    }
}
