use bincode::{Decode, Encode};
use serde::{Serialize, Deserialize};

/// A peak of the index, with the scan it came from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct IndexedPeak {
    pub mz: f64,
    pub intensity: f64,
    pub retention_time: f64,
    pub scan_index: usize,
}

/// Peaks of one m/z over consecutive scans, sorted by retention time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedIonChromatogram {
    pub peaks: Vec<IndexedPeak>,
}

impl ExtractedIonChromatogram {
    pub fn new(mut peaks: Vec<IndexedPeak>) -> Self {
        peaks.sort_by(|a, b| a.retention_time.total_cmp(&b.retention_time).then(a.scan_index.cmp(&b.scan_index)));
        ExtractedIonChromatogram { peaks }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Most intense peak, the earliest one on ties.
    pub fn apex(&self) -> Option<&IndexedPeak> {
        self.peaks.iter().fold(None, |best: Option<&IndexedPeak>, peak| match best {
            Some(b) if b.intensity >= peak.intensity => Some(b),
            _ => Some(peak),
        })
    }

    pub fn start_rt(&self) -> Option<f64> {
        self.peaks.first().map(|p| p.retention_time)
    }

    pub fn end_rt(&self) -> Option<f64> {
        self.peaks.last().map(|p| p.retention_time)
    }

    pub fn total_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    /// Intensity weighted mean m/z.
    ///
    /// # Examples
    ///
    /// ```
    /// use msindex::index::xic::{ExtractedIonChromatogram, IndexedPeak};
    ///
    /// let xic = ExtractedIonChromatogram::new(vec![
    ///     IndexedPeak { mz: 500.0, intensity: 1.0, retention_time: 1.1, scan_index: 1 },
    ///     IndexedPeak { mz: 500.002, intensity: 3.0, retention_time: 1.0, scan_index: 0 },
    /// ]);
    /// assert!((xic.weighted_mz().unwrap() - 500.0015).abs() < 1e-9);
    /// assert_eq!(xic.start_rt(), Some(1.0));
    /// assert_eq!(xic.apex().unwrap().scan_index, 0);
    /// ```
    pub fn weighted_mz(&self) -> Option<f64> {
        let total = self.total_intensity();
        if self.peaks.is_empty() || total <= 0.0 {
            return None;
        }
        Some(self.peaks.iter().map(|p| p.mz * p.intensity).sum::<f64>() / total)
    }
}
