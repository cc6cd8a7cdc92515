//! Confidence score module

use serde::{Deserialize, Serialize};

/// Trust score attached to an extracted field
///
/// Always within [0.0, 1.0]. Construction clamps out-of-range input, so a
/// `Confidence` can never hold an invalid value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Full confidence
    pub const MAX: Confidence = Confidence(1.0);

    /// No confidence
    pub const MIN: Confidence = Confidence(0.0);

    /// Create a confidence, clamping into [0, 1]
    ///
    /// NaN maps to 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Create a confidence only if the value is already in range
    pub fn checked(value: f64) -> Option<Self> {
        if (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Raw value
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Subtract a fixed penalty, floored at zero
    pub fn penalize(self, penalty: f64) -> Self {
        Self::new(self.0 - penalty)
    }

    /// Multiply by a factor (e.g. 0.5 for a missing citation)
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.0 * factor)
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::MIN
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamps() {
        assert_eq!(Confidence::new(1.5).value(), 1.0);
        assert_eq!(Confidence::new(-0.2).value(), 0.0);
        assert_eq!(Confidence::new(f64::NAN).value(), 0.0);
        assert_eq!(Confidence::new(0.42).value(), 0.42);
    }

    #[test]
    fn test_checked_rejects_out_of_range() {
        assert!(Confidence::checked(1.01).is_none());
        assert!(Confidence::checked(-0.01).is_none());
        assert_eq!(Confidence::checked(0.7).unwrap().value(), 0.7);
    }

    #[test]
    fn test_penalize_floors_at_zero() {
        let c = Confidence::new(0.2).penalize(0.3);
        assert_eq!(c.value(), 0.0);

        let c = Confidence::new(0.9).penalize(0.3);
        assert!((c.value() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_scale() {
        assert_eq!(Confidence::new(0.8).scale(0.5).value(), 0.4);
    }

    #[test]
    fn test_serde_as_plain_number() {
        let json = serde_json::to_string(&Confidence::new(0.75)).unwrap();
        assert_eq!(json, "0.75");

        let parsed: Confidence = serde_json::from_str("3.0").unwrap();
        assert_eq!(parsed.value(), 1.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: any input lands in [0, 1]
        #[test]
        fn test_confidence_always_in_range(v in proptest::num::f64::ANY) {
            let c = Confidence::new(v).value();
            prop_assert!((0.0..=1.0).contains(&c));
        }

        /// Property: penalties never push the score below zero
        #[test]
        fn test_penalty_never_negative(v in 0.0f64..=1.0, p in 0.0f64..=2.0) {
            let c = Confidence::new(v).penalize(p).value();
            prop_assert!(c >= 0.0);
            prop_assert!((c - (v - p).max(0.0)).abs() < 1e-12);
        }
    }
}
