use serde::{Serialize, Deserialize};

use crate::algorithm::scoring::ScoringMethod;
use crate::error::{DeconvolutionError, Result};

/// Settings of the classic deconvolution.
///
/// Missing JSON fields fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeconvolutionParams {
    pub min_charge: i32,
    pub max_charge: i32,
    /// mass tolerance of isotope peaks, in ppm of the neutral mass
    pub tolerance_ppm: f64,
    /// allowed factor between observed and expected isotope intensity
    pub intensity_ratio_limit: f64,
    /// seeds below this fraction of the base peak intensity are skipped
    pub min_relative_intensity: f64,
    pub scoring_method: ScoringMethod,
    /// reject charge `z` unless `z / 5` adjacent charge states are observed too
    pub require_charge_state_support: bool,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self {
            min_charge: 1,
            max_charge: 10,
            tolerance_ppm: 5.0,
            intensity_ratio_limit: 3.0,
            min_relative_intensity: 0.01,
            scoring_method: ScoringMethod::SpectralContrastAngle,
            require_charge_state_support: false,
        }
    }
}

impl DeconvolutionParams {
    pub fn with_charge_range(mut self, min_charge: i32, max_charge: i32) -> Self {
        self.min_charge = min_charge;
        self.max_charge = max_charge;
        self
    }

    pub fn with_tolerance_ppm(mut self, tolerance_ppm: f64) -> Self {
        self.tolerance_ppm = tolerance_ppm;
        self
    }

    pub fn with_scoring_method(mut self, scoring_method: ScoringMethod) -> Self {
        self.scoring_method = scoring_method;
        self
    }

    pub fn with_charge_state_support(mut self, required: bool) -> Self {
        self.require_charge_state_support = required;
        self
    }

    /// Checked charge range as unsigned bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::params::DeconvolutionParams;
    ///
    /// assert_eq!(DeconvolutionParams::default().charge_range().unwrap(), (1, 10));
    /// assert!(DeconvolutionParams::default().with_charge_range(0, 3).charge_range().is_err());
    /// assert!(DeconvolutionParams::default().with_charge_range(4, 3).charge_range().is_err());
    /// ```
    pub fn charge_range(&self) -> Result<(u32, u32)> {
        if self.min_charge <= 0 || self.max_charge <= 0 || self.min_charge > self.max_charge {
            return Err(DeconvolutionError::InvalidChargeRange { min_charge: self.min_charge, max_charge: self.max_charge });
        }
        Ok((self.min_charge as u32, self.max_charge as u32))
    }
}

/// Settings of the cross-scan envelope aggregation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationParams {
    pub tolerance_ppm: f64,
    pub subgroup_tolerance_ppm: f64,
    /// scans a feature may go unseen before it is closed
    pub lag_scans: usize,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            tolerance_ppm: 5.0,
            subgroup_tolerance_ppm: 5.0,
            lag_scans: 0,
        }
    }
}
