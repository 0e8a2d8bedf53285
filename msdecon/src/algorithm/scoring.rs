use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::algorithm::similarity::{cosine, kullback_leibler, spectral_contrast_angle, NormalizationScheme};
use crate::error::{DeconvolutionError, Result};

/// Correction added to every intensity before the divergence is taken, one order of magnitude
/// below the smallest template abundance.
pub const KL_CORRECTION: f64 = 1e-9;

/// Names of the comparators known to the configuration layer.
///
/// Only some of them can rank isotope envelopes, see [`ScoringEngine::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    DotProduct,
    SpectralContrastAngle,
    KullbackLeibler,
    PearsonCorrelation,
    SpectralEntropy,
    BrayCurtis,
    EuclideanDistance,
    Searle,
}

impl ScoringMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ScoringMethod::DotProduct => "dot_product",
            ScoringMethod::SpectralContrastAngle => "spectral_contrast_angle",
            ScoringMethod::KullbackLeibler => "kullback_leibler",
            ScoringMethod::PearsonCorrelation => "pearson_correlation",
            ScoringMethod::SpectralEntropy => "spectral_entropy",
            ScoringMethod::BrayCurtis => "bray_curtis",
            ScoringMethod::EuclideanDistance => "euclidean_distance",
            ScoringMethod::Searle => "searle",
        }
    }
}

impl Default for ScoringMethod {
    fn default() -> Self {
        ScoringMethod::SpectralContrastAngle
    }
}

impl Display for ScoringMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScoringMethod {
    type Err = DeconvolutionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dot_product" => Ok(ScoringMethod::DotProduct),
            "spectral_contrast_angle" => Ok(ScoringMethod::SpectralContrastAngle),
            "kullback_leibler" => Ok(ScoringMethod::KullbackLeibler),
            "pearson_correlation" => Ok(ScoringMethod::PearsonCorrelation),
            "spectral_entropy" => Ok(ScoringMethod::SpectralEntropy),
            "bray_curtis" => Ok(ScoringMethod::BrayCurtis),
            "euclidean_distance" => Ok(ScoringMethod::EuclideanDistance),
            "searle" => Ok(ScoringMethod::Searle),
            other => Err(DeconvolutionError::UnknownScoringMethod(other.to_string())),
        }
    }
}

/// Compares observed envelope intensities with the averagine prediction.
///
/// Each variant owns its direction, callers only ever ask [`ScoringEngine::is_better`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScoringEngine {
    /// Normalized dot product mapped onto the spectral contrast angle. In [0, 1], higher is better.
    SpectralAngle,
    /// Kullback-Leibler divergence of the observed from the predicted pattern. In [0, inf), lower is better.
    KullbackLeibler { correction: f64 },
}

impl Default for ScoringEngine {
    fn default() -> Self {
        ScoringEngine::SpectralAngle
    }
}

impl ScoringEngine {
    /// Selects the engine for a method, fails for methods that cannot rank envelopes.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::scoring::{ScoringEngine, ScoringMethod};
    ///
    /// assert!(ScoringEngine::new(ScoringMethod::DotProduct).is_ok());
    /// assert!(ScoringEngine::new(ScoringMethod::SpectralEntropy).is_err());
    /// ```
    pub fn new(method: ScoringMethod) -> Result<Self> {
        match method {
            ScoringMethod::DotProduct | ScoringMethod::SpectralContrastAngle => Ok(ScoringEngine::SpectralAngle),
            ScoringMethod::KullbackLeibler => Ok(ScoringEngine::KullbackLeibler { correction: KL_CORRECTION }),
            unsupported => Err(DeconvolutionError::UnsupportedScoringMethod(unsupported.to_string())),
        }
    }

    /// The value reported when there is nothing to compare.
    pub fn worst_score(&self) -> f64 {
        match self {
            ScoringEngine::SpectralAngle => 0.0,
            ScoringEngine::KullbackLeibler { .. } => f64::INFINITY,
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, ScoringEngine::SpectralAngle)
    }

    /// Scores aligned observed and theoretical intensity vectors.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::scoring::ScoringEngine;
    ///
    /// let angle = ScoringEngine::SpectralAngle;
    /// assert!((angle.score(&[100.0, 50.0], &[1.0, 0.5]) - 1.0).abs() < 1e-6);
    /// assert_eq!(angle.score(&[], &[]), 0.0);
    /// ```
    pub fn score(&self, observed: &[f64], theoretical: &[f64]) -> f64 {
        let n = observed.len().min(theoretical.len());
        let (observed, theoretical) = (&observed[..n], &theoretical[..n]);
        let observed_sum: f64 = observed.iter().sum();
        let theoretical_sum: f64 = theoretical.iter().sum();
        if n == 0 || observed_sum <= 0.0 || theoretical_sum <= 0.0 {
            return self.worst_score();
        }

        match self {
            ScoringEngine::SpectralAngle => spectral_contrast_angle(cosine(observed, theoretical)).max(0.0),
            ScoringEngine::KullbackLeibler { correction } => {
                let corrected = |values: &[f64]| -> Vec<f64> {
                    let shifted: Vec<f64> = values.iter().map(|v| v.max(0.0) + correction).collect();
                    NormalizationScheme::SpectrumSum.apply(&shifted)
                };
                kullback_leibler(&corrected(observed), &corrected(theoretical)).max(0.0)
            }
        }
    }

    /// Returns whether `a` beats `b`, and the better of the two.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::scoring::ScoringEngine;
    ///
    /// assert_eq!(ScoringEngine::SpectralAngle.is_better(0.9, 0.5), (true, 0.9));
    /// assert_eq!(ScoringEngine::KullbackLeibler { correction: 1e-9 }.is_better(0.9, 0.5), (false, 0.5));
    /// ```
    pub fn is_better(&self, a: f64, b: f64) -> (bool, f64) {
        let better = if self.higher_is_better() { a > b } else { a < b };
        if better { (true, a) } else { (false, b) }
    }

    /// Orders scores best first, usable with `sort_by`.
    pub fn compare_best_first(&self, a: f64, b: f64) -> std::cmp::Ordering {
        if self.higher_is_better() { b.total_cmp(&a) } else { a.total_cmp(&b) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for method in [
            ScoringMethod::DotProduct,
            ScoringMethod::SpectralContrastAngle,
            ScoringMethod::KullbackLeibler,
            ScoringMethod::PearsonCorrelation,
            ScoringMethod::SpectralEntropy,
            ScoringMethod::BrayCurtis,
            ScoringMethod::EuclideanDistance,
            ScoringMethod::Searle,
        ] {
            assert_eq!(method.name().parse::<ScoringMethod>().unwrap(), method);
        }
        assert_eq!(
            "cross_correlation".parse::<ScoringMethod>(),
            Err(DeconvolutionError::UnknownScoringMethod("cross_correlation".to_string()))
        );
    }

    #[test]
    fn test_unsupported_methods_fail_at_construction() {
        assert_eq!(
            ScoringEngine::new(ScoringMethod::PearsonCorrelation),
            Err(DeconvolutionError::UnsupportedScoringMethod("pearson_correlation".to_string()))
        );
        assert!(ScoringEngine::new(ScoringMethod::Searle).is_err());
        assert_eq!(ScoringEngine::new(ScoringMethod::KullbackLeibler), Ok(ScoringEngine::KullbackLeibler { correction: KL_CORRECTION }));
    }

    #[test]
    fn test_worst_scores() {
        let kl = ScoringEngine::KullbackLeibler { correction: KL_CORRECTION };
        assert_eq!(kl.score(&[0.0, 0.0], &[1.0, 0.5]), f64::INFINITY);
        assert_eq!(ScoringEngine::SpectralAngle.score(&[0.0], &[1.0]), 0.0);
        // nothing beats the worst score by being equal to it
        assert!(!kl.is_better(f64::INFINITY, f64::INFINITY).0);
    }

    #[test]
    fn test_divergence_prefers_closer_pattern() {
        let kl = ScoringEngine::KullbackLeibler { correction: KL_CORRECTION };
        let theoretical = [1.0, 0.55, 0.2];
        let close = kl.score(&[100.0, 56.0, 19.0], &theoretical);
        let far = kl.score(&[100.0, 10.0, 80.0], &theoretical);
        assert!(close < far);
        assert!(kl.is_better(close, far).0);
        assert!(close.abs() < 1e-3);
    }

    #[test]
    fn test_angle_prefers_closer_pattern() {
        let angle = ScoringEngine::SpectralAngle;
        let theoretical = [1.0, 0.55, 0.2];
        let close = angle.score(&[100.0, 56.0, 19.0], &theoretical);
        let far = angle.score(&[100.0, 10.0, 80.0], &theoretical);
        assert!(close > far);
        assert_eq!(angle.compare_best_first(close, far), std::cmp::Ordering::Less);
    }
}
