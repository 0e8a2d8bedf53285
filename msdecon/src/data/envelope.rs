use std::fmt;
use std::fmt::{Display, Formatter};
use bincode::{Decode, Encode};
use serde::{Serialize, Deserialize};
use statrs::statistics::{Data, Median};

use crate::chemistry::constants::mz_to_mass;
use crate::data::spectrum::Peak;

/// A deconvoluted isotope envelope: peaks of one scan explained as one charged species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct IsotopicEnvelope {
    /// neutral monoisotopic mass
    pub monoisotopic_mass: f64,
    pub charge: u32,
    /// matched peaks of the primary charge state, most intense first
    pub peaks: Vec<Peak>,
    pub most_abundant_mz: f64,
    pub most_abundant_mass: f64,
    pub total_intensity: f64,
    pub score: f64,
    pub template_index: usize,
    /// number of adjacent charge states that backed the assignment
    pub charge_states_observed: usize,
    /// one based number of the source scan, 0 until a run or a feature assigns it
    pub scan_index: usize,
}

impl IsotopicEnvelope {
    /// Creates an envelope whose first peak is the most abundant one.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::data::envelope::IsotopicEnvelope;
    /// use msdecon::data::spectrum::Peak;
    ///
    /// let envelope = IsotopicEnvelope::new(vec![Peak::new(500.0, 100.0), Peak::new(500.5, 60.0)], 997.98, 2, 0.9, 3);
    /// assert_eq!(envelope.total_intensity, 160.0);
    /// assert_eq!(envelope.most_abundant_mz, 500.0);
    /// ```
    pub fn new(peaks: Vec<Peak>, monoisotopic_mass: f64, charge: u32, score: f64, template_index: usize) -> Self {
        let most_abundant_mz = peaks.first().map_or(0.0, |p| p.mz);
        let total_intensity = peaks.iter().map(|p| p.intensity).sum();

        IsotopicEnvelope {
            monoisotopic_mass,
            charge,
            peaks,
            most_abundant_mz,
            most_abundant_mass: mz_to_mass(most_abundant_mz, charge),
            total_intensity,
            score,
            template_index,
            charge_states_observed: 0,
            scan_index: 0,
        }
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }

    pub fn with_scan_index(mut self, scan_index: usize) -> Self {
        self.scan_index = scan_index;
        self
    }

    /// Replaces the monoisotopic mass by the median of per-peak predictions,
    /// leaves it untouched when there are none.
    pub fn set_median_monoisotopic_mass(&mut self, predictions: &[f64]) {
        if let Some(median) = median(predictions) {
            self.monoisotopic_mass = median;
        }
    }

    pub fn contains_mz(&self, mz: f64) -> bool {
        self.peaks.iter().any(|p| p.mz == mz)
    }
}

/// Median of a slice, the mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(Data::new(values.to_vec()).median())
}

impl Display for IsotopicEnvelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "IsotopicEnvelope(mass: {:.4}, z: {}, peaks: {}, intensity: {:.1}, score: {:.4})",
               self.monoisotopic_mass, self.charge, self.peaks.len(), self.total_intensity, self.score)
    }
}
