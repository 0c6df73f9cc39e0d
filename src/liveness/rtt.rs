//! Smoothed round-trip statistics across pings (RFC 6298 smoothing).

use std::time::Duration;

/// Weight of a new sample in the smoothed RTT (1/8).
const SRTT_ALPHA: f64 = 0.125;

/// Weight of a new deviation in the RTT variance (1/4).
const RTTVAR_BETA: f64 = 0.25;

/// Running estimate of the ping round trip.
///
/// The first sample seeds `srtt = sample` and `rttvar = sample / 2`; later
/// samples are folded in with the usual 1/8 and 1/4 gains.
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    srtt_ms: f64,
    rttvar_ms: f64,
    last: Option<Duration>,
    samples: u64,
}

impl RttEstimator {
    /// An estimator with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one measured round trip.
    pub fn record(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;

        if self.samples == 0 {
            self.srtt_ms = sample_ms;
            self.rttvar_ms = sample_ms / 2.0;
        } else {
            self.rttvar_ms =
                (1.0 - RTTVAR_BETA) * self.rttvar_ms + RTTVAR_BETA * (self.srtt_ms - sample_ms).abs();
            self.srtt_ms = (1.0 - SRTT_ALPHA) * self.srtt_ms + SRTT_ALPHA * sample_ms;
        }

        self.last = Some(sample);
        self.samples += 1;
    }

    /// Smoothed round trip, or `None` before the first sample.
    pub fn smoothed(&self) -> Option<Duration> {
        (self.samples > 0).then(|| Duration::from_secs_f64(self.srtt_ms / 1000.0))
    }

    /// Round-trip variance, or `None` before the first sample.
    pub fn variance(&self) -> Option<Duration> {
        (self.samples > 0).then(|| Duration::from_secs_f64(self.rttvar_ms / 1000.0))
    }

    /// Most recent sample.
    pub fn last_sample(&self) -> Option<Duration> {
        self.last
    }

    /// Number of samples recorded.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Option<Duration>) -> f64 {
        d.unwrap().as_secs_f64() * 1000.0
    }

    #[test]
    fn test_empty_estimator() {
        let rtt = RttEstimator::new();
        assert_eq!(rtt.smoothed(), None);
        assert_eq!(rtt.variance(), None);
        assert_eq!(rtt.samples(), 0);
    }

    #[test]
    fn test_first_sample_seeds_estimate() {
        let mut rtt = RttEstimator::new();
        rtt.record(Duration::from_millis(200));

        assert!((ms(rtt.smoothed()) - 200.0).abs() < 0.01);
        assert!((ms(rtt.variance()) - 100.0).abs() < 0.01);
        assert_eq!(rtt.last_sample(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_later_samples_move_estimate_gradually() {
        let mut rtt = RttEstimator::new();
        rtt.record(Duration::from_millis(100));
        rtt.record(Duration::from_millis(900));

        // 0.875 * 100 + 0.125 * 900
        assert!((ms(rtt.smoothed()) - 200.0).abs() < 0.01);
        assert_eq!(rtt.last_sample(), Some(Duration::from_millis(900)));
        assert_eq!(rtt.samples(), 2);
    }

    #[test]
    fn test_reset_forgets_samples() {
        let mut rtt = RttEstimator::new();
        rtt.record(Duration::from_millis(50));
        rtt.reset();
        assert_eq!(rtt.smoothed(), None);
        assert_eq!(rtt.last_sample(), None);
    }
}
