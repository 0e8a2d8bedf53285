use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use bincode::{Decode, Encode};
use serde::{Serialize, Deserialize};

use crate::error::{DeconvolutionError, Result};

/// A single centroided peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64) -> Self {
        Peak { mz, intensity }
    }
}

/// Represents a mass spectrum with associated m/z values and intensities.
///
/// Uses Arc<Vec<T>> for efficient cloning - clone is O(1) instead of O(n).
/// The m/z values are expected to be sorted ascending, all lookups rely on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MzSpectrum {
    pub mz: Arc<Vec<f64>>,
    pub intensity: Arc<Vec<f64>>,
}

// Manual bincode implementation for Arc compatibility
impl Encode for MzSpectrum {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> std::result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&*self.mz, encoder)?;
        bincode::Encode::encode(&*self.intensity, encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for MzSpectrum {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, bincode::error::DecodeError> {
        let mz: Vec<f64> = bincode::Decode::decode(decoder)?;
        let intensity: Vec<f64> = bincode::Decode::decode(decoder)?;
        Ok(MzSpectrum::new(mz, intensity))
    }
}

impl<'de, Context> bincode::BorrowDecode<'de, Context> for MzSpectrum {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, bincode::error::DecodeError> {
        let mz: Vec<f64> = bincode::BorrowDecode::borrow_decode(decoder)?;
        let intensity: Vec<f64> = bincode::BorrowDecode::borrow_decode(decoder)?;
        Ok(MzSpectrum::new(mz, intensity))
    }
}

impl MzSpectrum {
    /// Constructs a new `MzSpectrum` from m/z-sorted arrays.
    ///
    /// # Arguments
    ///
    /// * `mz` - A vector of m/z values, sorted ascending.
    /// * `intensity` - A vector of intensity values corresponding to the m/z values.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use msdecon::data::spectrum::MzSpectrum;
    /// let spectrum = MzSpectrum::new(vec![100.0, 200.0], vec![10.0, 20.0]);
    /// assert_eq!(*spectrum.mz, vec![100.0, 200.0]);
    /// assert_eq!(*spectrum.intensity, vec![10.0, 20.0]);
    /// ```
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        MzSpectrum {
            mz: Arc::new(mz),
            intensity: Arc::new(intensity),
        }
    }

    /// Checked constructor, rejects arrays of different length and sorts peaks by m/z.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use msdecon::data::spectrum::MzSpectrum;
    /// let spectrum = MzSpectrum::try_new(vec![200.0, 100.0], vec![20.0, 10.0]).unwrap();
    /// assert_eq!(*spectrum.mz, vec![100.0, 200.0]);
    /// assert!(MzSpectrum::try_new(vec![100.0], vec![]).is_err());
    /// ```
    pub fn try_new(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if mz.len() != intensity.len() {
            return Err(DeconvolutionError::MismatchedArrays { mz: mz.len(), intensity: intensity.len() });
        }

        if mz.windows(2).all(|w| w[0] <= w[1]) {
            return Ok(MzSpectrum::new(mz, intensity));
        }

        let mut pairs: Vec<(f64, f64)> = mz.into_iter().zip(intensity).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (mz, intensity) = pairs.into_iter().unzip();
        Ok(MzSpectrum::new(mz, intensity))
    }

    pub fn from_peaks(peaks: &[Peak]) -> Result<Self> {
        Self::try_new(peaks.iter().map(|p| p.mz).collect(), peaks.iter().map(|p| p.intensity).collect())
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    pub fn peak(&self, index: usize) -> Peak {
        Peak::new(self.mz[index], self.intensity[index])
    }

    pub fn peaks(&self) -> impl Iterator<Item = Peak> + '_ {
        self.mz.iter().zip(self.intensity.iter()).map(|(&mz, &intensity)| Peak::new(mz, intensity))
    }

    /// Index of the peak whose m/z is closest to `mz`, `None` for an empty spectrum.
    /// Ties between the left and right neighbour go to the left one.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use msdecon::data::spectrum::MzSpectrum;
    /// let spectrum = MzSpectrum::new(vec![100.0, 101.0, 102.0], vec![1.0, 1.0, 1.0]);
    /// assert_eq!(spectrum.closest_peak_index(101.4), Some(1));
    /// assert_eq!(spectrum.closest_peak_index(500.0), Some(2));
    /// ```
    pub fn closest_peak_index(&self, mz: f64) -> Option<usize> {
        closest_index(&self.mz, mz)
    }

    /// Half-open index range `[start, end)` of the peaks with `min_mz <= mz <= max_mz`.
    pub fn index_range(&self, min_mz: f64, max_mz: f64) -> (usize, usize) {
        let start = self.mz.partition_point(|&x| x < min_mz);
        let end = self.mz.partition_point(|&x| x <= max_mz);
        (start, end.max(start))
    }

    pub fn filter_ranged(&self, mz_min: f64, mz_max: f64, intensity_min: f64, intensity_max: f64) -> Self {
        let mut mz_vec: Vec<f64> = Vec::new();
        let mut intensity_vec: Vec<f64> = Vec::new();

        for (mz, intensity) in self.mz.iter().zip(self.intensity.iter()) {
            if mz_min <= *mz && *mz <= mz_max && *intensity >= intensity_min && *intensity <= intensity_max {
                mz_vec.push(*mz);
                intensity_vec.push(*intensity);
            }
        }
        MzSpectrum::new(mz_vec, intensity_vec)
    }
}

/// Index of the element of a sorted slice closest to `target`.
pub fn closest_index(sorted: &[f64], target: f64) -> Option<usize> {
    if sorted.is_empty() {
        return None;
    }
    let right = sorted.partition_point(|&x| x < target);
    if right == 0 {
        return Some(0);
    }
    if right == sorted.len() {
        return Some(sorted.len() - 1);
    }
    let left = right - 1;
    if target - sorted[left] <= sorted[right] - target { Some(left) } else { Some(right) }
}

/// Formats the `MzSpectrum` for display.
impl Display for MzSpectrum {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let base_peak = self.mz.iter()
            .zip(self.intensity.iter())
            .max_by(|a, b| a.1.total_cmp(b.1));

        match base_peak {
            Some((mz, i)) => write!(f, "MzSpectrum(data points: {}, max  by intensity:({:.3}, {}))", self.mz.len(), mz, i),
            None => write!(f, "MzSpectrum(data points: 0)"),
        }
    }
}

/// Isolation window of a fragment scan, width is absent for some vendors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct IsolationWindow {
    pub target_mz: f64,
    pub width: Option<f64>,
}

/// One acquired scan as handed over by a reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MsScan {
    pub one_based_scan_number: usize,
    pub ms_level: u8,
    /// retention time in minutes
    pub retention_time: f64,
    pub spectrum: MzSpectrum,
    #[serde(default)]
    pub isolation: Option<IsolationWindow>,
}

impl MsScan {
    pub fn new(one_based_scan_number: usize, ms_level: u8, retention_time: f64, spectrum: MzSpectrum) -> Self {
        MsScan { one_based_scan_number, ms_level, retention_time, spectrum, isolation: None }
    }

    pub fn with_isolation(mut self, target_mz: f64, width: Option<f64>) -> Self {
        self.isolation = Some(IsolationWindow { target_mz, width });
        self
    }
}

impl Display for MsScan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MsScan(scan: {}, ms{}, rt: {:.3}, {})", self.one_based_scan_number, self.ms_level, self.retention_time, self.spectrum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_index_edges() {
        let sorted = vec![1.0, 2.0, 4.0];
        assert_eq!(closest_index(&sorted, 0.0), Some(0));
        assert_eq!(closest_index(&sorted, 3.1), Some(2));
        assert_eq!(closest_index(&sorted, 2.9), Some(1));
        assert_eq!(closest_index(&sorted, 3.0), Some(1));
        assert_eq!(closest_index(&sorted, 9.0), Some(2));
        assert_eq!(closest_index(&[], 9.0), None);
    }

    #[test]
    fn test_index_range() {
        let spectrum = MzSpectrum::new(vec![100.0, 200.0, 300.0, 400.0], vec![1.0; 4]);
        assert_eq!(spectrum.index_range(150.0, 300.0), (1, 3));
        assert_eq!(spectrum.index_range(0.0, f64::INFINITY), (0, 4));
        assert_eq!(spectrum.index_range(500.0, 600.0), (4, 4));
        assert_eq!(spectrum.index_range(250.0, 260.0), (2, 2));
    }

    #[test]
    fn test_display_empty_spectrum() {
        let spectrum = MzSpectrum::new(vec![], vec![]);
        assert_eq!(format!("{}", spectrum), "MzSpectrum(data points: 0)");
    }
}
