//! Confidence update policies.
//!
//! A policy maps the current confidence, the qualitative result and the
//! test's discriminative power to the new confidence. Every policy must be
//! monotone for a fixed power: `Supports` never lowers confidence,
//! `Challenges` never raises it, `Neutral` leaves it unchanged.

use crate::session::{ConfidencePercent, DiscriminativePower, EvidenceResult};

/// Computes confidence-after from confidence-before.
///
/// The returned value is in percent. The ledger rejects anything outside
/// `[0, 100]` and rounds the rest to the nearest whole percent.
pub trait ConfidencePolicy: Send + Sync {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// New confidence, in percent.
    fn update(
        &self,
        before: ConfidencePercent,
        result: EvidenceResult,
        power: DiscriminativePower,
    ) -> f64;
}

/// Bayesian update with a likelihood ratio of `1 + power`.
///
/// A supporting result multiplies the odds by the ratio, a challenging
/// result divides them by it. Certainty (0% or 100%) never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct LikelihoodRatioPolicy;

impl LikelihoodRatioPolicy {
    /// Likelihood ratio for a test of the given power.
    pub fn ratio(power: DiscriminativePower) -> f64 {
        1.0 + f64::from(power.value())
    }
}

impl ConfidencePolicy for LikelihoodRatioPolicy {
    fn name(&self) -> &'static str {
        "likelihood_ratio"
    }

    fn update(
        &self,
        before: ConfidencePercent,
        result: EvidenceResult,
        power: DiscriminativePower,
    ) -> f64 {
        let p = f64::from(before.value());
        let q = 100.0 - p;
        let lr = Self::ratio(power);

        match result {
            EvidenceResult::Neutral => p,
            EvidenceResult::Supports => {
                if q == 0.0 {
                    100.0
                } else {
                    100.0 * p * lr / (p * lr + q)
                }
            }
            EvidenceResult::Challenges => {
                if p == 0.0 {
                    0.0
                } else {
                    100.0 * p / (p + q * lr)
                }
            }
        }
    }
}

/// Linear update: `step` points per unit of power, clamped to `[0, 100]`.
#[derive(Debug, Clone, Copy)]
pub struct FixedStepPolicy {
    step: u8,
}

impl FixedStepPolicy {
    /// Create a policy moving `step` points per unit of power.
    pub fn new(step: u8) -> Self {
        Self { step }
    }

    /// Points per unit of power.
    pub fn step(&self) -> u8 {
        self.step
    }
}

impl Default for FixedStepPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ConfidencePolicy for FixedStepPolicy {
    fn name(&self) -> &'static str {
        "fixed_step"
    }

    fn update(
        &self,
        before: ConfidencePercent,
        result: EvidenceResult,
        power: DiscriminativePower,
    ) -> f64 {
        let p = f64::from(before.value());
        let delta = f64::from(self.step) * f64::from(power.value());

        match result {
            EvidenceResult::Supports => (p + delta).min(100.0),
            EvidenceResult::Challenges => (p - delta).max(0.0),
            EvidenceResult::Neutral => p,
        }
    }
}
