//! Multiplicative-decrease control law for split weights.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunable constants of the weight decay law.
///
/// Each recompute shrinks the weight of every interface that is not the
/// current shortest path:
///
/// ```text
/// new = clamp01(old - old * decay / scale / max(rate, min_rate))
/// ```
///
/// and gives the freed share to the shortest-path interface. The step is
/// inversely proportional to the destination's measured rate, so alternate
/// paths of lightly loaded destinations are phased out fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Decay constant.
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// Scale constant dividing the decay.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Floor applied to measured rates (KB/s) before dividing by them.
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,
}

fn default_decay() -> f64 {
    20.0
}
fn default_scale() -> f64 {
    1.0
}
fn default_min_rate() -> f64 {
    1.0
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            decay: default_decay(),
            scale: default_scale(),
            min_rate: default_min_rate(),
        }
    }
}

impl SplitConfig {
    /// Check that every constant is finite and positive.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("decay", self.decay),
            ("scale", self.scale),
            ("min_rate", self.min_rate),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "split.{name} must be finite and positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Measured rate as used by the law. Unknown (negative) or NaN rates
    /// count as the floor.
    pub fn effective_rate(&self, measured: f64) -> f64 {
        measured.max(self.min_rate)
    }

    /// One decay step applied to a non-shortest-path weight.
    pub fn decayed(&self, weight: f64, measured_rate: f64) -> f64 {
        let rate = self.effective_rate(measured_rate);
        clamp01(weight - weight * self.decay / self.scale / rate)
    }
}

/// Clamp to the unit interval.
pub(crate) fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let law = SplitConfig::default();
        assert_eq!(law.decay, 20.0);
        assert_eq!(law.scale, 1.0);
        assert_eq!(law.min_rate, 1.0);
        assert!(law.validate().is_ok());
    }

    #[test]
    fn test_low_rate_drops_alternate_immediately() {
        let law = SplitConfig::default();
        // decay / rate >= 1: the step overshoots and clamps to zero.
        assert_eq!(law.decayed(0.4, 5.0), 0.0);
        assert_eq!(law.decayed(0.4, -1.0), 0.0);
    }

    #[test]
    fn test_high_rate_decays_slowly() {
        let law = SplitConfig::default();
        let w = law.decayed(0.5, 200.0);
        assert!((w - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_rate_uses_floor() {
        let law = SplitConfig {
            decay: 0.5,
            ..Default::default()
        };
        assert_eq!(law.effective_rate(-1.0), 1.0);
        assert_eq!(law.effective_rate(f64::NAN), 1.0);
        assert!((law.decayed(0.8, -1.0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_constants() {
        let zero_scale = SplitConfig {
            scale: 0.0,
            ..Default::default()
        };
        assert!(zero_scale.validate().is_err());

        let nan_decay = SplitConfig {
            decay: f64::NAN,
            ..Default::default()
        };
        assert!(nan_decay.validate().is_err());
    }
}
