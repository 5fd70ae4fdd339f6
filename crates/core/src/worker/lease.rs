//! Visibility lease sizing.

use std::time::Duration;

/// Shortest lease ever handed to the transport.
pub const LEASE_FLOOR_SECS: u64 = 30;

/// Longest lease ever handed to the transport. Leases beyond this waste
/// the redelivery safety net: a crashed worker's messages stay invisible
/// until the lease lapses.
pub const LEASE_CEILING_SECS: u64 = 300;

/// Compute the visibility lease for one dequeued message.
///
/// Pure function of the configured estimate, the observed p95 processing
/// time, and the safety margin (clamped to 1.0-2.0). A lease that
/// expires mid-processing causes duplicate delivery and duplicate work,
/// so the result is never below the larger of estimate and p95, scaled
/// by the margin. With no estimate at all the stage-specific fallback
/// applies, not the transport maximum.
pub fn lease_seconds(
    estimate: Option<Duration>,
    observed_p95: Option<Duration>,
    safety_margin: f64,
    fallback: Duration,
) -> u64 {
    let margin = safety_margin.clamp(1.0, 2.0);

    let base = match (estimate, observed_p95) {
        (Some(est), Some(p95)) => est.max(p95),
        (Some(est), None) => est,
        (None, Some(p95)) => p95,
        (None, None) => {
            return fallback.as_secs().clamp(LEASE_FLOOR_SECS, LEASE_CEILING_SECS);
        }
    };

    let scaled = (base.as_secs_f64() * margin).ceil() as u64;
    scaled.clamp(LEASE_FLOOR_SECS, LEASE_CEILING_SECS)
}

/// Rolling window of observed per-item processing durations.
///
/// Worker-local: each StageWorker owns one and feeds it back into
/// `lease_seconds` so leases track reality instead of the configured
/// guess.
#[derive(Debug)]
pub struct ProcessingEstimator {
    samples: Vec<f64>,
    max_samples: usize,
    next: usize,
}

impl ProcessingEstimator {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples.min(1024)),
            max_samples: max_samples.max(1),
            next: 0,
        }
    }

    /// Record one observed processing duration, evicting the oldest
    /// sample once the window is full.
    pub fn record(&mut self, duration: Duration) {
        let secs = duration.as_secs_f64();
        if self.samples.len() < self.max_samples {
            self.samples.push(secs);
        } else {
            self.samples[self.next] = secs;
            self.next = (self.next + 1) % self.max_samples;
        }
    }

    /// 95th-percentile observed processing time, if any samples exist.
    pub fn p95(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        Some(Duration::from_secs_f64(sorted[idx]))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for ProcessingEstimator {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_scales_estimate_by_margin() {
        let lease = lease_seconds(
            Some(Duration::from_secs(60)),
            None,
            1.5,
            Duration::from_secs(120),
        );
        assert_eq!(lease, 90);
    }

    #[test]
    fn test_lease_never_below_p95_times_margin() {
        // Config says 40s but observed p95 is 100s
        let lease = lease_seconds(
            Some(Duration::from_secs(40)),
            Some(Duration::from_secs(100)),
            1.5,
            Duration::from_secs(120),
        );
        assert_eq!(lease, 150);
        assert!(lease as f64 >= 100.0 * 1.5);
    }

    #[test]
    fn test_lease_floor() {
        let lease = lease_seconds(
            Some(Duration::from_secs(2)),
            None,
            1.0,
            Duration::from_secs(120),
        );
        assert_eq!(lease, LEASE_FLOOR_SECS);
    }

    #[test]
    fn test_lease_ceiling() {
        let lease = lease_seconds(
            Some(Duration::from_secs(400)),
            None,
            2.0,
            Duration::from_secs(120),
        );
        assert_eq!(lease, LEASE_CEILING_SECS);
    }

    #[test]
    fn test_no_estimate_uses_fallback_not_ceiling() {
        let lease = lease_seconds(None, None, 1.5, Duration::from_secs(120));
        assert_eq!(lease, 120);
    }

    #[test]
    fn test_margin_clamped_to_sane_range() {
        // Margin below 1.0 must not shrink the lease under the estimate
        let lease = lease_seconds(
            Some(Duration::from_secs(60)),
            None,
            0.1,
            Duration::from_secs(120),
        );
        assert_eq!(lease, 60);

        // Margin above 2.0 is capped
        let lease = lease_seconds(
            Some(Duration::from_secs(60)),
            None,
            10.0,
            Duration::from_secs(120),
        );
        assert_eq!(lease, 120);
    }

    #[test]
    fn test_estimator_empty() {
        let estimator = ProcessingEstimator::new(10);
        assert!(estimator.p95().is_none());
        assert!(estimator.is_empty());
    }

    #[test]
    fn test_estimator_p95_tracks_slow_tail() {
        let mut estimator = ProcessingEstimator::new(100);
        for _ in 0..95 {
            estimator.record(Duration::from_secs(10));
        }
        for _ in 0..5 {
            estimator.record(Duration::from_secs(80));
        }

        let p95 = estimator.p95().unwrap();
        assert!(p95 >= Duration::from_secs(10));
        assert!(p95 <= Duration::from_secs(80));
    }

    #[test]
    fn test_estimator_single_sample() {
        let mut estimator = ProcessingEstimator::new(10);
        estimator.record(Duration::from_secs(42));
        assert_eq!(estimator.p95().unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn test_estimator_window_evicts_oldest() {
        let mut estimator = ProcessingEstimator::new(3);
        estimator.record(Duration::from_secs(100));
        estimator.record(Duration::from_secs(1));
        estimator.record(Duration::from_secs(1));
        // Window full; this evicts the 100s outlier
        estimator.record(Duration::from_secs(1));

        assert_eq!(estimator.len(), 3);
        assert!(estimator.p95().unwrap() < Duration::from_secs(2));
    }
}
