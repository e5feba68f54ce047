use tracing::{info, warn};

use crate::error::TimingError;
use crate::events::epoch_ms;

// ---------------------------------------------------------------------------
// Phase timestamps
// ---------------------------------------------------------------------------

/// Milestone timestamps of one connection cycle, epoch milliseconds.
/// 0 means "not observed yet". Mutated only by [`LifecycleTimingTracker`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePhaseTimestamps {
    pub connected_at: i64,
    pub first_snapshot_at: i64,
    pub first_incremental_at: i64,
    pub last_snapshot_at: i64,
    pub disconnected_at: i64,
    pub last_heartbeat_at: i64,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Accumulates lifecycle phase timestamps and reports derived latency metrics
/// through the logging boundary.
///
/// The tracker keeps only the latest value per phase; no history survives a
/// disconnect or reset. It must tolerate out-of-order and duplicate signals:
/// ordering violations between phases are logged as consistency warnings and
/// never raised as errors, so a misbehaving provider cannot take the process
/// down while operators still get enough signal to spot a stall.
#[derive(Debug, Default)]
pub struct LifecycleTimingTracker {
    phases: LifecyclePhaseTimestamps,
}

impl LifecycleTimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the accumulated phase timestamps.
    pub fn phases(&self) -> &LifecyclePhaseTimestamps {
        &self.phases
    }

    /// Zero every phase timestamp.
    pub fn reset(&mut self) {
        self.phases = LifecyclePhaseTimestamps::default();
    }

    fn check(field: &'static str, ts: i64) -> Result<(), TimingError> {
        if ts <= 0 {
            return Err(TimingError::InvalidTimestamp { field, value: ts });
        }
        Ok(())
    }

    /// Always overwrites, so reconnection cycles restart the measurements.
    pub fn track_connected(&mut self, ts: i64) -> Result<(), TimingError> {
        Self::check("connected_at", ts)?;
        self.phases.connected_at = ts;
        Ok(())
    }

    /// A disconnect invalidates everything measured since the last connect,
    /// so this performs a full reset before recording the disconnect time.
    pub fn track_disconnected(&mut self, ts: i64) -> Result<(), TimingError> {
        Self::check("disconnected_at", ts)?;
        self.reset();
        self.phases.disconnected_at = ts;
        Ok(())
    }

    /// First-wins: later calls within a connection cycle are silent no-ops.
    pub fn track_first_snapshot(&mut self, ts: i64) -> Result<(), TimingError> {
        Self::check("first_snapshot_at", ts)?;

        if self.phases.first_snapshot_at != 0 {
            return Ok(());
        }
        self.phases.first_snapshot_at = ts;

        if self.phases.connected_at == 0 {
            // the completion of the connection phase wasn't tracked
            warn!("first snapshot data was tracked, but connection was not");
        } else {
            let elapsed_ms = self.phases.first_snapshot_at - self.phases.connected_at;
            info!(elapsed_ms, "time from the connection to the first snapshot data");
        }
        Ok(())
    }

    /// First-wins: later calls within a connection cycle are silent no-ops.
    pub fn track_first_incremental(&mut self, ts: i64) -> Result<(), TimingError> {
        Self::check("first_incremental_at", ts)?;

        if self.phases.first_incremental_at != 0 {
            return Ok(());
        }
        self.phases.first_incremental_at = ts;

        if self.phases.connected_at == 0 {
            warn!("first incremental data was tracked, but connection was not");
        } else {
            let elapsed_ms = self.phases.first_incremental_at - self.phases.connected_at;
            info!(
                elapsed_ms,
                "time from the connection to the first incremental data"
            );
        }
        Ok(())
    }

    /// Always overwrites. An empty batch is only a heuristic end-of-snapshot
    /// signal and chunked delivery can repeat it, so consecutive calls are
    /// normal behavior rather than duplicates to reject.
    pub fn track_last_snapshot(&mut self, ts: i64) -> Result<(), TimingError> {
        Self::check("last_snapshot_at", ts)?;
        self.phases.last_snapshot_at = ts;

        if self.phases.first_snapshot_at == 0 {
            // last snapshot data can't go before the first snapshot data
            warn!("last snapshot data was tracked, but first snapshot data was not");
        } else {
            let snapshot_download_ms = self.phases.last_snapshot_at - self.phases.first_snapshot_at;
            info!(
                snapshot_download_ms,
                "time from the first snapshot data to the last snapshot data"
            );
        }

        if self.phases.connected_at == 0 {
            warn!("last snapshot data was tracked, but connection was not");
        } else {
            let elapsed_ms = self.phases.last_snapshot_at - self.phases.connected_at;
            info!(elapsed_ms, "time from the connection to the last snapshot data");
        }
        Ok(())
    }

    /// Records a provider heartbeat. The first heartbeat after a reset reports
    /// the connect-to-heartbeat latency; each following one reports the
    /// inter-heartbeat interval and a clock-skew estimate against local time.
    pub fn track_heartbeat(&mut self, ts: i64) -> Result<(), TimingError> {
        Self::check("last_heartbeat_at", ts)?;

        if self.phases.last_heartbeat_at != 0 {
            let interval_ms = ts - self.phases.last_heartbeat_at;
            let skew_ms = epoch_ms() - ts;
            info!(
                interval_ms,
                skew_ms, "interval between heartbeats and local/server time diff"
            );
        } else if self.phases.connected_at == 0 {
            warn!("first heartbeat was tracked, but connection was not");
        } else {
            let elapsed_ms = ts - self.phases.connected_at;
            info!(elapsed_ms, "time from the connection to the first heartbeat");
        }

        self.phases.last_heartbeat_at = ts;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_all_zero() {
        let tracker = LifecycleTimingTracker::new();
        assert_eq!(*tracker.phases(), LifecyclePhaseTimestamps::default());
    }

    #[test]
    fn test_track_connected_overwrites() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(100).unwrap();
        tracker.track_connected(500).unwrap();
        assert_eq!(tracker.phases().connected_at, 500);
    }

    #[test]
    fn test_first_snapshot_first_wins() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(50).unwrap();
        tracker.track_first_snapshot(100).unwrap();
        tracker.track_first_snapshot(200).unwrap();
        assert_eq!(tracker.phases().first_snapshot_at, 100);
    }

    #[test]
    fn test_first_incremental_first_wins() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_first_incremental(100).unwrap();
        tracker.track_first_incremental(999).unwrap();
        assert_eq!(tracker.phases().first_incremental_at, 100);
    }

    #[test]
    fn test_disconnect_zeroes_every_other_phase() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(10).unwrap();
        tracker.track_first_snapshot(20).unwrap();
        tracker.track_first_incremental(30).unwrap();
        tracker.track_last_snapshot(40).unwrap();
        tracker.track_heartbeat(50).unwrap();

        tracker.track_disconnected(60).unwrap();

        let phases = tracker.phases();
        assert_eq!(phases.disconnected_at, 60);
        assert_eq!(phases.connected_at, 0);
        assert_eq!(phases.first_snapshot_at, 0);
        assert_eq!(phases.first_incremental_at, 0);
        assert_eq!(phases.last_snapshot_at, 0);
        assert_eq!(phases.last_heartbeat_at, 0);
    }

    #[test]
    fn test_heartbeat_interval_path_no_error() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(100).unwrap();
        tracker.track_heartbeat(150).unwrap();
        // interval 250, logged only
        tracker.track_heartbeat(400).unwrap();
        assert_eq!(tracker.phases().last_heartbeat_at, 400);
    }

    #[test]
    fn test_heartbeat_without_connection_warns_only() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_heartbeat(150).unwrap();
        assert_eq!(tracker.phases().last_heartbeat_at, 150);
    }

    #[test]
    fn test_last_snapshot_without_first_does_not_mutate_first() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_last_snapshot(300).unwrap();
        assert_eq!(tracker.phases().last_snapshot_at, 300);
        assert_eq!(tracker.phases().first_snapshot_at, 0);
    }

    #[test]
    fn test_last_snapshot_overwrites_on_repeat() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(10).unwrap();
        tracker.track_first_snapshot(20).unwrap();
        tracker.track_last_snapshot(30).unwrap();
        tracker.track_last_snapshot(45).unwrap();
        assert_eq!(tracker.phases().last_snapshot_at, 45);
    }

    #[test]
    fn test_non_positive_timestamps_rejected_without_mutation() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(100).unwrap();

        assert!(tracker.track_connected(0).is_err());
        assert!(tracker.track_connected(-5).is_err());
        assert!(tracker.track_disconnected(0).is_err());
        assert!(tracker.track_first_snapshot(-1).is_err());
        assert!(tracker.track_first_incremental(0).is_err());
        assert!(tracker.track_last_snapshot(-10).is_err());
        assert!(tracker.track_heartbeat(0).is_err());

        // the failed calls left the state untouched
        assert_eq!(tracker.phases().connected_at, 100);
        assert_eq!(tracker.phases().first_snapshot_at, 0);
        assert_eq!(tracker.phases().disconnected_at, 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(10).unwrap();
        tracker.track_disconnected(20).unwrap();
        tracker.reset();
        assert_eq!(*tracker.phases(), LifecyclePhaseTimestamps::default());
    }

    #[test]
    fn test_reconnection_cycle_allows_new_first_snapshot() {
        let mut tracker = LifecycleTimingTracker::new();
        tracker.track_connected(10).unwrap();
        tracker.track_first_snapshot(20).unwrap();
        tracker.track_disconnected(30).unwrap();

        tracker.track_connected(40).unwrap();
        tracker.track_first_snapshot(50).unwrap();
        assert_eq!(tracker.phases().first_snapshot_at, 50);
    }
}
