//! Thresholds that govern pattern status and success-rate updates.

use serde::{Deserialize, Serialize};

/// How `success_rate` is recomputed on each application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessRatePolicy {
    /// `successes / times_applied`.
    #[default]
    SimpleRatio,
    /// Exponentially weighted: `decay × previous + (1 − decay) × outcome`.
    Decayed,
}

impl SuccessRatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuccessRatePolicy::SimpleRatio => "simple_ratio",
            SuccessRatePolicy::Decayed => "decayed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningPolicy {
    /// Experimental patterns need more applications than this to activate.
    pub activation_threshold: u64,
    /// Minimum success rate to activate or recover.
    pub activation_floor: f64,
    /// Success rate below which a pattern goes under review.
    pub review_floor: f64,
    /// One-update drop in success rate that sends a pattern to review.
    pub sharp_drop: f64,
    /// Applications an under-review pattern gets before deprecation.
    pub review_window: u64,
    /// Review rules only apply once a pattern has this many applications.
    pub review_min_applications: u64,
    pub success_rate_policy: SuccessRatePolicy,
    /// Weight of the previous rate under [`SuccessRatePolicy::Decayed`].
    pub decay: f64,
    /// Seed confidence used for overrides, which carry no researcher score.
    pub override_seed_confidence: f64,
}

impl Default for LearningPolicy {
    fn default() -> Self {
        Self {
            activation_threshold: 5,
            activation_floor: 0.6,
            review_floor: 0.4,
            sharp_drop: 0.2,
            review_window: 3,
            review_min_applications: 3,
            success_rate_policy: SuccessRatePolicy::SimpleRatio,
            decay: 0.8,
            override_seed_confidence: 0.8,
        }
    }
}
