use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use serde::{Serialize, Deserialize};

use msdecon::params::{AggregationParams, DeconvolutionParams};
use crate::error::Result;

/// Settings of XIC extraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceParams {
    pub tolerance_ppm: f64,
    pub max_missed_scans: usize,
    /// maximum retention time distance from the anchor peak, `None` is unlimited
    pub max_half_width: Option<f64>,
    /// shortest trace kept when all traces are extracted
    pub min_peaks: usize,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            tolerance_ppm: 10.0,
            max_missed_scans: 1,
            max_half_width: None,
            min_peaks: 3,
        }
    }
}

impl TraceParams {
    pub fn half_width_limit(&self) -> f64 {
        self.max_half_width.unwrap_or(f64::INFINITY)
    }
}

/// Settings of DIA index building and fragment extraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiaParams {
    pub isolation_window_tolerance_ppm: f64,
    pub fragment_tolerance_ppm: f64,
    /// worker threads of the extraction pool, 0 uses all cores
    pub max_parallelism: usize,
}

impl Default for DiaParams {
    fn default() -> Self {
        Self {
            isolation_window_tolerance_ppm: 10.0,
            fragment_tolerance_ppm: 20.0,
            max_parallelism: 0,
        }
    }
}

/// Everything the command line reads from a config file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub deconvolution: DeconvolutionParams,
    pub aggregation: AggregationParams,
    pub trace: TraceParams,
    pub dia: DiaParams,
}

impl EngineConfig {
    /// Parses a JSON config, absent fields keep their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use msindex::config::EngineConfig;
    ///
    /// let config = EngineConfig::from_json_str(r#"{"deconvolution": {"max_charge": 30}}"#).unwrap();
    /// assert_eq!(config.deconvolution.max_charge, 30);
    /// assert_eq!(config.deconvolution.min_charge, 1);
    /// assert_eq!(config.trace.max_half_width, None);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: EngineConfig = serde_json::from_reader(reader)?;
        log::debug!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }
}
