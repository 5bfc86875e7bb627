//! Unit-interval score value object.

use super::error::DomainError;
use serde::{Deserialize, Deserializer, Serialize};

/// A value guaranteed to lie in `[0, 1]`.
///
/// Confidence, quality, agreement and success-rate values all share this
/// invariant, so they are carried as `UnitScore` rather than a bare `f64`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct UnitScore(f64);

impl UnitScore {
    pub const ZERO: UnitScore = UnitScore(0.0);
    pub const ONE: UnitScore = UnitScore(1.0);

    /// Validate a raw value; NaN and out-of-range values are rejected.
    pub fn new(field: &'static str, value: f64) -> Result<Self, DomainError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::ScoreOutOfRange { field, value });
        }
        Ok(Self(value))
    }

    /// Clamp into range. NaN becomes 0.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Product of two scores, which stays in range.
    pub fn product(self, other: UnitScore) -> UnitScore {
        UnitScore(self.0 * other.0)
    }
}

impl<'de> Deserialize<'de> for UnitScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = f64::deserialize(deserializer)?;
        UnitScore::new("score", raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for UnitScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_bounds() {
        assert_eq!(UnitScore::new("c", 0.0).unwrap().value(), 0.0);
        assert_eq!(UnitScore::new("c", 1.0).unwrap().value(), 1.0);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(UnitScore::new("c", -0.01).is_err());
        assert!(UnitScore::new("c", 1.01).is_err());
        assert!(UnitScore::new("c", f64::NAN).is_err());
    }

    #[test]
    fn test_saturating() {
        assert_eq!(UnitScore::saturating(4.0), UnitScore::ONE);
        assert_eq!(UnitScore::saturating(-1.0), UnitScore::ZERO);
        assert_eq!(UnitScore::saturating(f64::NAN), UnitScore::ZERO);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<UnitScore>("0.4").is_ok());
        assert!(serde_json::from_str::<UnitScore>("1.4").is_err());
    }
}
