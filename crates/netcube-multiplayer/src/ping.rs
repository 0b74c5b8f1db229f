//! Ping measurement and the prediction window.
//!
//! Clients bounce their local timestamp off the authority every
//! `ping_interval_secs`. The echoed timestamp yields a round-trip sample that
//! feeds a [`PingEstimator`]. When the estimate changes the client reports it
//! to the authority, which stores it in a [`PeerPing`].

use std::collections::VecDeque;
use std::fmt::Debug;

use netcube_config::{NetworkConfig, PingEstimatorConfig};

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Turns round-trip samples into an "exact ping" in milliseconds.
pub trait PingEstimator: Debug + Send + Sync {
    /// Record one round trip, in seconds.
    fn record(&mut self, rtt_secs: f32);

    /// Current estimate in milliseconds (0 before any sample).
    fn exact_ping_ms(&self) -> f32;
}

/// Exponentially weighted moving average. The first sample is taken as-is.
#[derive(Debug, Clone)]
pub struct ExponentialPing {
    alpha: f32,
    exact_ms: f32,
    primed: bool,
}

impl ExponentialPing {
    /// `alpha` is the weight of the newest sample.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            exact_ms: 0.0,
            primed: false,
        }
    }
}

impl PingEstimator for ExponentialPing {
    fn record(&mut self, rtt_secs: f32) {
        let sample_ms = rtt_secs * 1000.0;
        if self.primed {
            self.exact_ms += self.alpha * (sample_ms - self.exact_ms);
        } else {
            self.exact_ms = sample_ms;
            self.primed = true;
        }
    }

    fn exact_ping_ms(&self) -> f32 {
        self.exact_ms
    }
}

/// Mean of the last `window` samples.
#[derive(Debug, Clone)]
pub struct MovingAveragePing {
    window: usize,
    samples_ms: VecDeque<f32>,
}

impl MovingAveragePing {
    /// Averages over at most `window` samples (at least one).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples_ms: VecDeque::with_capacity(window),
        }
    }
}

impl PingEstimator for MovingAveragePing {
    fn record(&mut self, rtt_secs: f32) {
        if self.samples_ms.len() >= self.window {
            self.samples_ms.pop_front();
        }
        self.samples_ms.push_back(rtt_secs * 1000.0);
    }

    fn exact_ping_ms(&self) -> f32 {
        if self.samples_ms.is_empty() {
            return 0.0;
        }
        self.samples_ms.iter().sum::<f32>() / self.samples_ms.len() as f32
    }
}

/// Builds the estimator selected in config.
pub fn estimator_from_config(config: &PingEstimatorConfig) -> Box<dyn PingEstimator> {
    match *config {
        PingEstimatorConfig::Exponential { alpha } => Box::new(ExponentialPing::new(alpha)),
        PingEstimatorConfig::MovingAverage { window } => Box::new(MovingAveragePing::new(window)),
    }
}

// ---------------------------------------------------------------------------
// PingTracker
// ---------------------------------------------------------------------------

/// What a returned ping did to the estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PingOutcome {
    /// Negative round trip (clock wraparound); the estimator was not touched.
    Discarded {
        /// The rejected sample, in seconds.
        rtt_secs: f32,
    },
    /// Sample recorded, estimate unchanged.
    Unchanged {
        /// Current estimate (ms).
        exact_ping_ms: f32,
    },
    /// Sample recorded and the estimate moved. The caller reports the new
    /// value and requests a fresh timestamp.
    Changed {
        /// Estimate before the sample (ms).
        previous_ms: f32,
        /// Estimate after the sample (ms).
        exact_ping_ms: f32,
    },
}

/// Client-side ping schedule and estimate.
#[derive(Debug)]
pub struct PingTracker {
    interval_secs: f64,
    last_ping_calc_secs: f64,
    estimator: Box<dyn PingEstimator>,
}

impl PingTracker {
    /// Tracker bouncing every `interval_secs`.
    pub fn new(interval_secs: f32, estimator: Box<dyn PingEstimator>) -> Self {
        Self {
            interval_secs: f64::from(interval_secs),
            last_ping_calc_secs: 0.0,
            estimator,
        }
    }

    /// Tracker configured from the network section.
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.ping_interval_secs,
            estimator_from_config(&config.ping_estimator),
        )
    }

    /// Returns the timestamp to bounce when more than the interval has
    /// elapsed since the last bounce or measurement.
    pub fn poll_bounce(&mut self, now_secs: f64) -> Option<f32> {
        if now_secs - self.last_ping_calc_secs > self.interval_secs {
            self.last_ping_calc_secs = now_secs;
            Some(now_secs as f32)
        } else {
            None
        }
    }

    /// Handle an echoed timestamp received at `now_secs`.
    pub fn on_return_ping(&mut self, now_secs: f32, timestamp: f32) -> PingOutcome {
        let rtt_secs = now_secs - timestamp;
        if rtt_secs < 0.0 {
            return PingOutcome::Discarded { rtt_secs };
        }

        let previous_ms = self.estimator.exact_ping_ms();
        self.estimator.record(rtt_secs);
        self.last_ping_calc_secs = f64::from(now_secs);

        let exact_ping_ms = self.estimator.exact_ping_ms();
        if exact_ping_ms != previous_ms {
            PingOutcome::Changed {
                previous_ms,
                exact_ping_ms,
            }
        } else {
            PingOutcome::Unchanged { exact_ping_ms }
        }
    }

    /// Current estimate (ms).
    pub fn exact_ping_ms(&self) -> f32 {
        self.estimator.exact_ping_ms()
    }
}

// ---------------------------------------------------------------------------
// PeerPing
// ---------------------------------------------------------------------------

/// Authority's record of a peer's reported ping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeerPing {
    /// Last reported exact ping (ms).
    pub exact_ping_ms: f32,
    /// `min(255, exact * 0.25)`, as replicated to other peers.
    pub compressed: u8,
}

impl PeerPing {
    /// Store a reported ping.
    pub fn update(&mut self, exact_ping_ms: f32) {
        self.exact_ping_ms = exact_ping_ms;
        self.compressed = (exact_ping_ms * 0.25).clamp(0.0, 255.0) as u8;
    }
}

// ---------------------------------------------------------------------------
// PredictionWindow
// ---------------------------------------------------------------------------

/// Negotiated cap on how far ahead a peer may predict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionWindow {
    /// Granted window (ms); 0 until negotiated.
    pub max_prediction_ping_ms: f32,
    /// Largest window the authority will grant (ms).
    pub server_max_prediction_ping_ms: f32,
    /// Subtracted from the exact ping before clamping (ms).
    pub fudge_factor_ms: f32,
}

impl PredictionWindow {
    /// Window bounds from config, nothing granted yet.
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            max_prediction_ping_ms: 0.0,
            server_max_prediction_ping_ms: config.server_max_prediction_ping_ms,
            fudge_factor_ms: config.prediction_fudge_factor_ms,
        }
    }

    /// Authority side: clamp and store a requested window. Returns the grant.
    pub fn negotiate(&mut self, desired_ms: f32) -> f32 {
        self.max_prediction_ping_ms = desired_ms.clamp(0.0, self.server_max_prediction_ping_ms);
        self.max_prediction_ping_ms
    }

    /// Seconds of prediction for `exact_ping_ms`; zero in standalone play.
    pub fn prediction_time_secs(&self, exact_ping_ms: f32, standalone: bool) -> f32 {
        if standalone {
            return 0.0;
        }
        0.0005
            * (exact_ping_ms - self.fudge_factor_ms).clamp(0.0, self.max_prediction_ping_ms.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PingTracker {
        PingTracker::new(0.5, Box::new(ExponentialPing::new(0.25)))
    }

    #[test]
    fn test_return_ping_measures_round_trip() {
        let mut tracker = tracker();
        let outcome = tracker.on_return_ping(100.08, 100.0);
        let PingOutcome::Changed { exact_ping_ms, .. } = outcome else {
            panic!("expected a changed estimate, got {outcome:?}");
        };
        assert!((exact_ping_ms - 80.0).abs() < 0.1, "got {exact_ping_ms}");
    }

    #[test]
    fn test_negative_round_trip_is_discarded() {
        let mut tracker = tracker();
        let outcome = tracker.on_return_ping(95.0, 100.0);
        assert_eq!(outcome, PingOutcome::Discarded { rtt_secs: -5.0 });
        assert_eq!(tracker.exact_ping_ms(), 0.0);
    }

    #[test]
    fn test_identical_sample_leaves_estimate_unchanged() {
        let mut tracker = PingTracker::new(0.5, Box::new(MovingAveragePing::new(4)));
        tracker.on_return_ping(1.5, 1.0);
        let outcome = tracker.on_return_ping(2.5, 2.0);
        assert_eq!(
            outcome,
            PingOutcome::Unchanged {
                exact_ping_ms: 500.0
            }
        );
    }

    #[test]
    fn test_bounce_interval() {
        let mut tracker = tracker();
        assert_eq!(tracker.poll_bounce(0.4), None);
        assert_eq!(tracker.poll_bounce(0.6), Some(0.6));
        assert_eq!(tracker.poll_bounce(1.0), None);
        assert_eq!(tracker.poll_bounce(1.2), Some(1.2));
    }

    #[test]
    fn test_return_ping_resets_bounce_timer() {
        let mut tracker = tracker();
        tracker.on_return_ping(0.45, 0.4);
        assert_eq!(tracker.poll_bounce(0.9), None);
        assert!(tracker.poll_bounce(1.0).is_some());
    }

    #[test]
    fn test_exponential_smoothing() {
        let mut estimator = ExponentialPing::new(0.5);
        estimator.record(0.1);
        assert_eq!(estimator.exact_ping_ms(), 100.0);
        estimator.record(0.2);
        assert_eq!(estimator.exact_ping_ms(), 150.0);
    }

    #[test]
    fn test_moving_average_window() {
        let mut estimator = MovingAveragePing::new(2);
        for rtt in [0.1, 0.2, 0.4] {
            estimator.record(rtt);
        }
        assert!((estimator.exact_ping_ms() - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_peer_ping_compression() {
        let mut peer = PeerPing::default();
        peer.update(100.0);
        assert_eq!(peer.compressed, 25);
        peer.update(2000.0);
        assert_eq!(peer.compressed, 255);
        assert_eq!(peer.exact_ping_ms, 2000.0);
    }

    #[test]
    fn test_negotiation_clamps_to_server_max() {
        let mut window = PredictionWindow::from_config(&NetworkConfig::default());
        assert_eq!(window.negotiate(500.0), 160.0);
        assert_eq!(window.negotiate(-10.0), 0.0);
        assert_eq!(window.negotiate(120.0), 120.0);
    }

    #[test]
    fn test_prediction_time() {
        let mut window = PredictionWindow::from_config(&NetworkConfig::default());
        // Nothing negotiated yet.
        assert_eq!(window.prediction_time_secs(100.0, false), 0.0);

        window.negotiate(120.0);
        // 0.0005 * clamp(100 - 15, 0, 120)
        assert!((window.prediction_time_secs(100.0, false) - 0.0425).abs() < 1e-6);
        // Capped by the window.
        assert!((window.prediction_time_secs(400.0, false) - 0.06).abs() < 1e-6);
        // Below the fudge factor.
        assert_eq!(window.prediction_time_secs(10.0, false), 0.0);
        assert_eq!(window.prediction_time_secs(100.0, true), 0.0);
    }

    #[test]
    fn test_estimator_from_config() {
        let estimator = estimator_from_config(&PingEstimatorConfig::MovingAverage { window: 3 });
        assert_eq!(estimator.exact_ping_ms(), 0.0);
    }
}
