//! Tracker configuration (spec §6 "Configuration").

use crate::error::{Error, Result};

/// Clamped, validated tracker parameters. Construct via
/// [`TrackerConfig::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    detection_probability: f64,
    survival_probability: f64,
    gating_percentage: f64,
    max_number_of_hypotheses: usize,
    num_of_desired_hypotheses: usize,
    max_murty_steps: Option<usize>,
    existence_probability_threshold: f64,
    track_history_length_threshold: usize,
    ppp_prune_threshold: f64,
    global_prune_threshold: f64,
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    pub fn detection_probability(&self) -> f64 {
        self.detection_probability
    }

    pub fn survival_probability(&self) -> f64 {
        self.survival_probability
    }

    pub fn gating_percentage(&self) -> f64 {
        self.gating_percentage
    }

    pub fn max_number_of_hypotheses(&self) -> usize {
        self.max_number_of_hypotheses
    }

    pub fn num_of_desired_hypotheses(&self) -> usize {
        self.num_of_desired_hypotheses
    }

    pub fn max_murty_steps(&self) -> Option<usize> {
        self.max_murty_steps
    }

    pub fn existence_probability_threshold(&self) -> f64 {
        self.existence_probability_threshold
    }

    pub fn track_history_length_threshold(&self) -> usize {
        self.track_history_length_threshold
    }

    /// In log-space already (see [`TrackerConfigBuilder::ppp_prune_threshold`]).
    pub fn ppp_prune_log_threshold(&self) -> f64 {
        self.ppp_prune_threshold
    }

    /// In log-space already (see [`TrackerConfigBuilder::global_prune_threshold`]).
    pub fn global_prune_log_threshold(&self) -> f64 {
        self.global_prune_threshold
    }
}

/// Builds a [`TrackerConfig`], clamping probabilities into their valid
/// ranges and rejecting structurally invalid combinations at `build()`.
#[derive(Debug, Clone)]
pub struct TrackerConfigBuilder {
    detection_probability: f64,
    survival_probability: f64,
    gating_percentage: f64,
    max_number_of_hypotheses: usize,
    num_of_desired_hypotheses: usize,
    max_murty_steps: Option<usize>,
    existence_probability_threshold: f64,
    track_history_length_threshold: usize,
    ppp_prune_threshold: f64,
    global_prune_threshold: f64,
}

impl Default for TrackerConfigBuilder {
    fn default() -> Self {
        TrackerConfigBuilder {
            detection_probability: 0.9,
            survival_probability: 0.99,
            gating_percentage: 0.999,
            max_number_of_hypotheses: 100,
            num_of_desired_hypotheses: 50,
            max_murty_steps: None,
            existence_probability_threshold: 0.5,
            track_history_length_threshold: 1,
            ppp_prune_threshold: 1e-4,
            global_prune_threshold: 1e-4,
        }
    }
}

impl TrackerConfigBuilder {
    pub fn detection_probability(mut self, p_d: f64) -> Self {
        self.detection_probability = p_d;
        self
    }

    pub fn survival_probability(mut self, p_s: f64) -> Self {
        self.survival_probability = p_s;
        self
    }

    /// Confidence level for the chi-squared gate, e.g. `0.999`.
    pub fn gating_percentage(mut self, gating_percentage: f64) -> Self {
        self.gating_percentage = gating_percentage;
        self
    }

    pub fn max_number_of_hypotheses(mut self, n: usize) -> Self {
        self.max_number_of_hypotheses = n;
        self
    }

    pub fn num_of_desired_hypotheses(mut self, n: usize) -> Self {
        self.num_of_desired_hypotheses = n;
        self
    }

    /// Overrides the weighted per-parent Murty-step allocation with a flat
    /// cap (spec §6).
    pub fn max_murty_steps(mut self, steps: usize) -> Self {
        self.max_murty_steps = Some(steps);
        self
    }

    pub fn existence_probability_threshold(mut self, r: f64) -> Self {
        self.existence_probability_threshold = r;
        self
    }

    pub fn track_history_length_threshold(mut self, n: usize) -> Self {
        self.track_history_length_threshold = n;
        self
    }

    /// Linear-scale threshold; stored internally in log-space.
    pub fn ppp_prune_threshold(mut self, threshold: f64) -> Self {
        self.ppp_prune_threshold = threshold;
        self
    }

    /// Linear-scale (normalized) threshold; stored internally in log-space.
    pub fn global_prune_threshold(mut self, threshold: f64) -> Self {
        self.global_prune_threshold = threshold;
        self
    }

    /// Clamps probabilities to `(0, 1)` and converts the two prune
    /// thresholds to log-space. Errors if `max_number_of_hypotheses == 0`
    /// or `num_of_desired_hypotheses == 0`, since both would make the
    /// tracker immediately discard every hypothesis.
    pub fn build(self) -> Result<TrackerConfig> {
        if self.max_number_of_hypotheses == 0 {
            return Err(Error::Parameters(
                "max_number_of_hypotheses must be at least 1".into(),
            ));
        }
        if self.num_of_desired_hypotheses == 0 {
            return Err(Error::Parameters(
                "num_of_desired_hypotheses must be at least 1".into(),
            ));
        }
        let clamp01 = |v: f64| v.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
        Ok(TrackerConfig {
            detection_probability: clamp01(self.detection_probability),
            survival_probability: clamp01(self.survival_probability),
            gating_percentage: self.gating_percentage.clamp(f64::EPSILON, 1.0 - f64::EPSILON),
            max_number_of_hypotheses: self.max_number_of_hypotheses,
            num_of_desired_hypotheses: self.num_of_desired_hypotheses,
            max_murty_steps: self.max_murty_steps,
            existence_probability_threshold: self.existence_probability_threshold.clamp(0.0, 1.0),
            track_history_length_threshold: self.track_history_length_threshold,
            ppp_prune_threshold: self.ppp_prune_threshold.ln(),
            global_prune_threshold: self.global_prune_threshold.ln(),
        })
    }
}
