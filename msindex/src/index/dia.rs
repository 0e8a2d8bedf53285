use std::time::Instant;
use bincode::{Decode, Encode};

use msdecon::chemistry::constants::ppm_error;
use msdecon::data::spectrum::{closest_index, MsScan};

use crate::error::{IndexError, Result};
use crate::persist::{decode_blob, encode_blob, DIA_INDEX_MAGIC};

/// Fragment scans of a DIA run grouped by isolation window, flat f32 arrays.
///
/// Window ids are assigned in ascending order of the window centre. Within a window the
/// scans are sorted by retention time, within a scan the m/z values are sorted ascending.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct DiaScanIndex {
    mz: Vec<f32>,
    intensity: Vec<f32>,
    scan_offsets: Vec<u32>,
    scan_lengths: Vec<u32>,
    scan_window_ids: Vec<u32>,
    scan_rts: Vec<f32>,
    scan_numbers: Vec<u32>,
    // (first scan, scan count) per window id
    window_ranges: Vec<(u32, u32)>,
    window_lower: Vec<f32>,
    window_upper: Vec<f32>,
    window_centers: Vec<f64>,
}

impl DiaScanIndex {
    pub fn scan_count(&self) -> usize {
        self.scan_offsets.len()
    }

    pub fn peak_count(&self) -> usize {
        self.mz.len()
    }

    pub fn window_count(&self) -> usize {
        self.window_ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan_offsets.is_empty()
    }

    /// Window ids, ascending.
    pub fn window_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.window_ranges.len()).map(|id| id as u32)
    }

    /// First scan and scan count of a window, `None` for an unknown id.
    pub fn try_get_scan_range_for_window(&self, window_id: u32) -> Option<(usize, usize)> {
        self.window_ranges.get(window_id as usize).map(|&(start, count)| (start as usize, count as usize))
    }

    pub fn scan_mz(&self, scan_index: usize) -> &[f32] {
        let offset = self.scan_offsets[scan_index] as usize;
        &self.mz[offset..offset + self.scan_lengths[scan_index] as usize]
    }

    pub fn scan_intensity(&self, scan_index: usize) -> &[f32] {
        let offset = self.scan_offsets[scan_index] as usize;
        &self.intensity[offset..offset + self.scan_lengths[scan_index] as usize]
    }

    pub fn scan_rt(&self, scan_index: usize) -> f32 {
        self.scan_rts[scan_index]
    }

    pub fn scan_window_id(&self, scan_index: usize) -> u32 {
        self.scan_window_ids[scan_index]
    }

    pub fn scan_number(&self, scan_index: usize) -> u32 {
        self.scan_numbers[scan_index]
    }

    pub fn scan_peak_count(&self, scan_index: usize) -> usize {
        self.scan_lengths[scan_index] as usize
    }

    /// Lower and upper isolation bound of a window.
    pub fn window_bounds(&self, window_id: u32) -> Option<(f32, f32)> {
        let id = window_id as usize;
        if id >= self.window_count() {
            return None;
        }
        Some((self.window_lower[id], self.window_upper[id]))
    }

    pub fn window_center(&self, window_id: u32) -> Option<f64> {
        self.window_centers.get(window_id as usize).copied()
    }

    /// Window isolating `precursor_mz`, the one with the nearest centre if windows overlap.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::data::spectrum::{MsScan, MzSpectrum};
    /// use msindex::index::dia::DiaScanIndexBuilder;
    ///
    /// let scans = vec![
    ///     MsScan::new(1, 2, 0.1, MzSpectrum::new(vec![200.0], vec![1.0])).with_isolation(412.5, Some(25.0)),
    ///     MsScan::new(2, 2, 0.1, MzSpectrum::new(vec![300.0], vec![1.0])).with_isolation(437.5, Some(25.0)),
    /// ];
    /// let index = DiaScanIndexBuilder::default().build(&scans).unwrap();
    /// assert_eq!(index.find_window_for_precursor_mz(430.0), Some(1));
    /// assert_eq!(index.find_window_for_precursor_mz(390.0), None);
    /// ```
    pub fn find_window_for_precursor_mz(&self, precursor_mz: f64) -> Option<u32> {
        let mut best: Option<(u32, f64)> = None;
        for id in self.window_ids() {
            let (lower, upper) = (self.window_lower[id as usize] as f64, self.window_upper[id as usize] as f64);
            if precursor_mz < lower || precursor_mz > upper {
                continue;
            }
            let distance = (self.window_centers[id as usize] - precursor_mz).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn global_rt_min(&self) -> Option<f32> {
        self.scan_rts.iter().cloned().reduce(f32::min)
    }

    pub fn global_rt_max(&self) -> Option<f32> {
        self.scan_rts.iter().cloned().reduce(f32::max)
    }

    /// Largest number of scans of any window, the data point capacity one query needs.
    pub fn max_scans_per_window(&self) -> usize {
        self.window_ranges.iter().map(|&(_, count)| count as usize).max().unwrap_or(0)
    }

    pub fn serialize_index(&self) -> Result<Vec<u8>> {
        encode_blob(DIA_INDEX_MAGIC, self)
    }

    pub fn deserialize_index(bytes: &[u8]) -> Result<Self> {
        decode_blob(DIA_INDEX_MAGIC, bytes)
    }
}

/// Builds a [`DiaScanIndex`] from MS2 scans with an isolation window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiaScanIndexBuilder {
    /// isolation targets closer than this belong to the same window
    pub isolation_window_tolerance_ppm: f64,
}

impl Default for DiaScanIndexBuilder {
    fn default() -> Self {
        Self { isolation_window_tolerance_ppm: 10.0 }
    }
}

impl DiaScanIndexBuilder {
    pub fn new(isolation_window_tolerance_ppm: f64) -> Self {
        Self { isolation_window_tolerance_ppm }
    }

    /// Groups the eligible scans into windows and copies their peaks into flat arrays.
    ///
    /// Scans that are not MS2, have no isolation target or no peaks are skipped.
    /// Fails with `TooManyPeaks` if the peaks cannot be addressed with 32 bit offsets.
    pub fn build(&self, scans: &[MsScan]) -> Result<DiaScanIndex> {
        let start = Instant::now();

        let eligible: Vec<(&MsScan, f64)> = scans.iter()
            .filter(|scan| scan.ms_level == 2 && !scan.spectrum.is_empty())
            .filter_map(|scan| scan.isolation.map(|window| (scan, window.target_mz)))
            .collect();

        if eligible.is_empty() {
            log::warn!("no MS2 scans with an isolation window, DIA index is empty");
            return Ok(DiaScanIndex::default());
        }

        let total_peaks: u64 = eligible.iter().map(|(scan, _)| scan.spectrum.len() as u64).sum();
        if total_peaks > u32::MAX as u64 {
            return Err(IndexError::TooManyPeaks { count: total_peaks });
        }

        // centres in first seen order, the width of the scan that opened the window
        let mut windows: Vec<(f64, f64)> = Vec::new();
        for (scan, target) in &eligible {
            if windows.iter().all(|&(center, _)| ppm_error(*target, center) >= self.isolation_window_tolerance_ppm) {
                let width = scan.isolation.and_then(|window| window.width).unwrap_or(0.0);
                windows.push((*target, width));
            }
        }
        windows.sort_by(|a, b| a.0.total_cmp(&b.0));
        let centers: Vec<f64> = windows.iter().map(|&(center, _)| center).collect();

        let mut assigned: Vec<(u32, &MsScan)> = Vec::with_capacity(eligible.len());
        for (scan, target) in &eligible {
            let window_id = closest_index(&centers, *target).unwrap_or(0) as u32;
            assigned.push((window_id, *scan));
        }
        assigned.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.retention_time.total_cmp(&b.1.retention_time)));

        let mut index = DiaScanIndex {
            mz: Vec::with_capacity(total_peaks as usize),
            intensity: Vec::with_capacity(total_peaks as usize),
            window_lower: windows.iter().map(|&(center, width)| (center - width / 2.0) as f32).collect(),
            window_upper: windows.iter().map(|&(center, width)| (center + width / 2.0) as f32).collect(),
            window_centers: centers,
            window_ranges: vec![(0, 0); windows.len()],
            ..DiaScanIndex::default()
        };

        for (scan_index, (window_id, scan)) in assigned.iter().enumerate() {
            let spectrum = &scan.spectrum;
            index.scan_offsets.push(index.mz.len() as u32);
            index.scan_lengths.push(spectrum.len() as u32);
            index.scan_window_ids.push(*window_id);
            index.scan_rts.push(scan.retention_time as f32);
            index.scan_numbers.push(scan.one_based_scan_number as u32);

            let mut peaks: Vec<(f32, f32)> = spectrum.peaks().map(|p| (p.mz as f32, p.intensity as f32)).collect();
            if !peaks.windows(2).all(|w| w[0].0 <= w[1].0) {
                peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
            }
            for (mz, intensity) in peaks {
                index.mz.push(mz);
                index.intensity.push(intensity);
            }

            let range = &mut index.window_ranges[*window_id as usize];
            if range.1 == 0 {
                range.0 = scan_index as u32;
            }
            range.1 += 1;
        }

        log::info!(
            "indexed {} DIA scans with {} peaks in {} windows in {:?}",
            index.scan_count(), index.peak_count(), index.window_count(), start.elapsed()
        );

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msdecon::data::spectrum::MzSpectrum;

    fn dia_scans() -> Vec<MsScan> {
        let mut scans = Vec::new();
        let mut number = 1;
        for cycle in 0..4 {
            let rt = cycle as f64 * 0.5;
            scans.push(MsScan::new(number, 1, rt, MzSpectrum::new(vec![450.0], vec![1e4])));
            number += 1;
            // targets drift by 1 ppm between cycles, windows are acquired high to low
            for target in [462.5, 437.5, 412.5] {
                let target = target * (1.0 + cycle as f64 * 1e-6);
                let spectrum = MzSpectrum::new(vec![200.0, 300.0 + cycle as f64, 400.0], vec![10.0, 20.0, 30.0]);
                scans.push(MsScan::new(number, 2, rt + 0.01, spectrum).with_isolation(target, Some(25.0)));
                number += 1;
            }
        }
        scans
    }

    #[test]
    fn test_windows_sorted_and_grouped() {
        let index = DiaScanIndexBuilder::default().build(&dia_scans()).unwrap();
        assert_eq!(index.window_count(), 3);
        assert_eq!(index.scan_count(), 12);
        assert_eq!(index.peak_count(), 36);
        assert_eq!(index.window_bounds(0), Some((400.0, 425.0)));
        assert_eq!(index.window_bounds(2), Some((450.0, 475.0)));
        assert_eq!(index.max_scans_per_window(), 4);

        for id in index.window_ids() {
            let (start, count) = index.try_get_scan_range_for_window(id).unwrap();
            assert_eq!(count, 4);
            for scan in start..start + count {
                assert_eq!(index.scan_window_id(scan), id);
            }
            assert!((start + 1..start + count).all(|s| index.scan_rt(s - 1) <= index.scan_rt(s)));
        }
        assert_eq!(index.try_get_scan_range_for_window(3), None);
    }

    #[test]
    fn test_first_scan_numbers_per_window() {
        let index = DiaScanIndexBuilder::default().build(&dia_scans()).unwrap();
        // window 0 is 412.5, acquired third in every cycle
        assert_eq!(index.scan_number(0), 4);
        assert_eq!(index.scan_mz(0), &[200.0, 300.0, 400.0]);
        assert_eq!(index.global_rt_min(), Some(0.01));
        assert!((index.global_rt_max().unwrap() - 1.51).abs() < 1e-6);
    }

    #[test]
    fn test_tolerance_splits_windows() {
        let index = DiaScanIndexBuilder::new(0.5).build(&dia_scans()).unwrap();
        assert_eq!(index.window_count(), 12);
    }

    #[test_log::test]
    fn test_no_eligible_scans() {
        let scans = vec![
            MsScan::new(1, 1, 0.0, MzSpectrum::new(vec![450.0], vec![1.0])),
            MsScan::new(2, 2, 0.0, MzSpectrum::new(vec![450.0], vec![1.0])),
            MsScan::new(3, 2, 0.0, MzSpectrum::new(vec![], vec![])).with_isolation(400.0, Some(20.0)),
        ];
        let index = DiaScanIndexBuilder::default().build(&scans).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.max_scans_per_window(), 0);
        assert_eq!(index.global_rt_min(), None);
    }

    #[test]
    fn test_serialization_round_trip() {
        let index = DiaScanIndexBuilder::default().build(&dia_scans()).unwrap();
        let blob = index.serialize_index().unwrap();
        assert_eq!(&blob[..4], b"MSDI");
        let restored = DiaScanIndex::deserialize_index(&blob).unwrap();
        assert_eq!(restored, index);
        assert_eq!(restored.serialize_index().unwrap(), blob);
        assert!(crate::index::peak_index::PeakIndex::deserialize_index(&blob).is_err());
    }
}
