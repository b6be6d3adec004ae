//! Throughput and ETA from periodic samples of bytes on disk.
//!
//! Single-stream transfers feed the tracker on every read; the parallel
//! supervisor feeds it the summed chunk-file sizes on each poll tick. Either
//! way a new rate is produced at most once per sampling interval.

use std::time::{Duration, Instant};

/// Percent complete in [0, 100]; 0 when `total` is unknown (0).
pub fn percent(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
}

/// Seconds until done at `bytes_per_sec`, or None when the size is unknown
/// or nothing is flowing.
pub fn eta_secs(downloaded: u64, total: u64, bytes_per_sec: f64) -> Option<f64> {
    if total == 0 || bytes_per_sec <= 0.0 {
        return None;
    }
    Some(total.saturating_sub(downloaded) as f64 / bytes_per_sec)
}

/// Result of one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub bytes_per_sec: f64,
    pub eta_secs: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    interval: Duration,
    last_sample_time: Instant,
    last_sample_size: u64,
}

impl ProgressTracker {
    pub fn new(interval: Duration, start_size: u64) -> Self {
        Self::starting_at(Instant::now(), start_size, interval)
    }

    pub fn starting_at(now: Instant, start_size: u64, interval: Duration) -> Self {
        Self {
            interval,
            last_sample_time: now,
            last_sample_size: start_size,
        }
    }

    /// Records `downloaded` at `now`. Returns a fresh throughput only when at
    /// least one interval has passed since the last accepted sample; a zero
    /// elapsed time never produces a rate.
    pub fn sample(&mut self, now: Instant, downloaded: u64, total: u64) -> Option<Throughput> {
        let elapsed = now.saturating_duration_since(self.last_sample_time);
        if elapsed.is_zero() || elapsed < self.interval {
            return None;
        }
        let delta = downloaded.saturating_sub(self.last_sample_size);
        let bytes_per_sec = delta as f64 / elapsed.as_secs_f64();
        self.last_sample_time = now;
        self.last_sample_size = downloaded;
        Some(Throughput {
            bytes_per_sec,
            eta_secs: eta_secs(downloaded, total, bytes_per_sec),
        })
    }

    /// Moves the baseline, e.g. after a transfer restarts from zero.
    pub fn rebase(&mut self, now: Instant, size: u64) {
        self.last_sample_time = now;
        self.last_sample_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped_and_safe() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(500, 0), 0.0);
        assert_eq!(percent(50, 200), 25.0);
        assert_eq!(percent(300, 200), 100.0);
    }

    #[test]
    fn eta_needs_size_and_speed() {
        assert_eq!(eta_secs(10, 0, 5.0), None);
        assert_eq!(eta_secs(10, 100, 0.0), None);
        assert_eq!(eta_secs(10, 100, 9.0), Some(10.0));
    }

    #[test]
    fn zero_elapsed_is_skipped() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 0, Duration::ZERO);
        assert_eq!(tracker.sample(t0, 4096, 8192), None);
    }

    #[test]
    fn samples_respect_interval() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 0, Duration::from_secs(1));
        assert_eq!(tracker.sample(t0 + Duration::from_millis(400), 100, 1000), None);
        let got = tracker
            .sample(t0 + Duration::from_secs(2), 400, 1000)
            .expect("sample after interval");
        assert_eq!(got.bytes_per_sec, 200.0);
        assert_eq!(got.eta_secs, Some(3.0));
    }

    #[test]
    fn stalled_transfer_has_no_eta() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 100, Duration::from_secs(1));
        let got = tracker.sample(t0 + Duration::from_secs(1), 100, 1000).unwrap();
        assert_eq!(got.bytes_per_sec, 0.0);
        assert_eq!(got.eta_secs, None);
    }

    #[test]
    fn rebase_after_restart() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::starting_at(t0, 5000, Duration::from_secs(1));
        tracker.rebase(t0, 0);
        let got = tracker.sample(t0 + Duration::from_secs(1), 1000, 0).unwrap();
        assert_eq!(got.bytes_per_sec, 1000.0);
        assert_eq!(got.eta_secs, None);
    }
}
