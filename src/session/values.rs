//! Bounded value types used throughout the session model.
//!
//! Both types validate on construction and on deserialization, so an
//! out-of-range value in a persisted record is a parse failure rather than
//! silently corrupted state.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Confidence as a whole percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ConfidencePercent(u8);

impl ConfidencePercent {
    /// Lowest confidence.
    pub const MIN: Self = Self(0);
    /// Highest confidence.
    pub const MAX: Self = Self(100);
    /// Neutral starting point for a new hypothesis.
    pub const EVEN: Self = Self(50);

    /// Create a confidence value, rejecting anything above 100.
    pub fn new(value: u8) -> LedgerResult<Self> {
        if value > 100 {
            return Err(LedgerError::validation(
                "confidence",
                format!("{} is outside 0..=100", value),
            ));
        }
        Ok(Self(value))
    }

    /// Create a confidence value from a real number, rounding to the nearest
    /// percent. Non-finite values and values outside `[0, 100]` are rejected.
    pub fn from_f64(value: f64) -> LedgerResult<Self> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(LedgerError::validation(
                "confidence",
                format!("{} is outside 0..=100", value),
            ));
        }
        Ok(Self(value.round() as u8))
    }

    /// Percentage value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Probability in `[0, 1]`.
    pub fn as_probability(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for ConfidencePercent {
    fn default() -> Self {
        Self::EVEN
    }
}

impl TryFrom<u8> for ConfidencePercent {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfidencePercent> for u8 {
    fn from(value: ConfidencePercent) -> Self {
        value.0
    }
}

impl std::fmt::Display for ConfidencePercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// How strongly a test separates competing hypotheses, on a `1..=5` scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DiscriminativePower(u8);

impl DiscriminativePower {
    /// Barely distinguishes the hypotheses.
    pub const WEAK: Self = Self(1);
    /// Middle of the scale.
    pub const MODERATE: Self = Self(3);
    /// A decisive test.
    pub const DECISIVE: Self = Self(5);

    /// Create a rating, rejecting anything outside `1..=5`.
    pub fn new(value: u8) -> LedgerResult<Self> {
        if !(1..=5).contains(&value) {
            return Err(LedgerError::validation(
                "discriminative_power",
                format!("{} is outside 1..=5", value),
            ));
        }
        Ok(Self(value))
    }

    /// Rating value.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DiscriminativePower {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DiscriminativePower> for u8 {
    fn from(value: DiscriminativePower) -> Self {
        value.0
    }
}

impl std::fmt::Display for DiscriminativePower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}
