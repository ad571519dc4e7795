//! Two-proportion z-test
//!
//! Compares the conversion rates of two variants:
//!
//! ```text
//! p̂  = (p1·n1 + p2·n2) / (n1 + n2)
//! SE = √(p̂(1 − p̂)(1/n1 + 1/n2))
//! z  = |p1 − p2| / SE
//! p  = 2·(1 − Φ(z))
//! CI = (p2 − p1) ± z_crit·SE
//! ```
//!
//! Φ is evaluated with a closed-form rational polynomial approximation from
//! Abramowitz & Stegun. Both approximations are derived for x ≥ 0; negative
//! arguments go through Φ(−x) = 1 − Φ(x).
//!
//! References:
//! - Abramowitz & Stegun (1964), Handbook of Mathematical Functions, 26.2.17 / 26.2.19

use serde::{Deserialize, Serialize};

use crate::config::SignificanceConfig;
use crate::{Error, Result};

/// Closed-form approximation used for the standard normal CDF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CdfApproximation {
    /// A&S 26.2.17, five-term rational polynomial with the normal density, |ε| < 7.5e-8
    #[default]
    RationalPolynomial,
    /// A&S 26.2.19, six-term polynomial raised to the −16th power, |ε| < 1.5e-7
    Polynomial16,
}

impl CdfApproximation {
    /// Standard normal CDF Φ(x).
    #[must_use]
    pub fn cdf(self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        if x < 0.0 {
            return 1.0 - self.cdf(-x);
        }
        match self {
            Self::RationalPolynomial => {
                let t = 1.0 / (1.0 + 0.231_641_9 * x);
                let poly = t
                    * (0.319_381_530
                        + t * (-0.356_563_782
                            + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
                let density = (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt();
                1.0 - density * poly
            }
            Self::Polynomial16 => {
                let poly = 1.0
                    + x * (0.049_867_347_0
                        + x * (0.021_141_006_1
                            + x * (0.003_277_626_3
                                + x * (0.000_038_003_6 + x * (0.000_048_890_6 + x * 0.000_005_383_0)))));
                1.0 - 0.5 * poly.powi(-16)
            }
        }
    }
}

/// Successes out of trials for one variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proportion {
    /// Subjects that converted
    pub successes: u64,
    /// Subjects exposed
    pub trials: u64,
}

impl Proportion {
    /// Create a proportion.
    #[must_use]
    pub const fn new(successes: u64, trials: u64) -> Self {
        Self { successes, trials }
    }

    /// Observed rate, `0.0` when there are no trials.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.trials as f64
        }
    }
}

/// Outcome of a two-proportion z-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    /// Two-sided p-value
    pub p_value: f64,
    /// |z| statistic
    pub z_score: f64,
    /// `p_value < alpha`
    pub significant: bool,
    /// Interval around `treatment_rate − control_rate`
    pub confidence_interval: (f64, f64),
    /// Control conversion rate
    pub control_rate: f64,
    /// Treatment conversion rate
    pub treatment_rate: f64,
}

/// Two-proportion z-test with configurable threshold and CDF approximation.
#[derive(Debug, Clone, Copy)]
pub struct SignificanceCalculator {
    alpha: f64,
    z_critical: f64,
    approximation: CdfApproximation,
}

impl Default for SignificanceCalculator {
    fn default() -> Self {
        Self::from_config(&SignificanceConfig::default())
    }
}

impl SignificanceCalculator {
    /// Create a calculator from its configuration section.
    #[must_use]
    pub const fn from_config(config: &SignificanceConfig) -> Self {
        Self {
            alpha: config.alpha,
            z_critical: config.z_critical,
            approximation: config.cdf,
        }
    }

    /// Significance threshold.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Compare a control and a treatment proportion.
    ///
    /// # Errors
    /// Returns [`Error::Computation`] if either side has zero trials, reports
    /// more successes than trials, or the statistic is not finite.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(&self, control: Proportion, treatment: Proportion) -> Result<SignificanceResult> {
        for (label, side) in [("control", control), ("treatment", treatment)] {
            if side.trials == 0 {
                return Err(Error::Computation(format!(
                    "{label} has no trials; significance needs samples on both sides"
                )));
            }
            if side.successes > side.trials {
                return Err(Error::Computation(format!(
                    "{label} reports {} successes out of {} trials",
                    side.successes, side.trials
                )));
            }
        }

        let n1 = control.trials as f64;
        let n2 = treatment.trials as f64;
        let p1 = control.rate();
        let p2 = treatment.rate();

        let pooled = p1.mul_add(n1, p2 * n2) / (n1 + n2);
        let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
        let diff = p2 - p1;

        // Pooled rate of exactly 0 or 1 means both sides are identical
        let (z, p_value) = if se > 0.0 {
            let z = diff.abs() / se;
            (z, 2.0 * (1.0 - self.approximation.cdf(z)))
        } else {
            (0.0, 1.0)
        };
        let p_value = p_value.clamp(0.0, 1.0);
        let half_width = self.z_critical * se;

        if !(z.is_finite() && p_value.is_finite() && half_width.is_finite()) {
            return Err(Error::Computation(format!(
                "non-finite statistic (z = {z}, p = {p_value}, se = {se})"
            )));
        }

        Ok(SignificanceResult {
            p_value,
            z_score: z,
            significant: p_value < self.alpha,
            confidence_interval: (diff - half_width, diff + half_width),
            control_rate: p1,
            treatment_rate: p2,
        })
    }
}
