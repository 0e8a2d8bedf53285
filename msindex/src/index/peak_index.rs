use std::time::Instant;
use bincode::{Decode, Encode};
use serde::{Serialize, Deserialize};

use msdecon::chemistry::constants::ppm_error;
use msdecon::data::spectrum::{closest_index, MsScan};

use crate::error::Result;
use crate::index::xic::{ExtractedIonChromatogram, IndexedPeak};
use crate::persist::{decode_blob, encode_blob, PEAK_INDEX_MAGIC};

/// Per scan metadata of a [`PeakIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    pub one_based_scan_number: usize,
    pub retention_time: f64,
    pub ms_level: u8,
    pub peak_count: usize,
}

/// Flat, structure of arrays peak index over a run, for ion chromatogram extraction.
///
/// Scans keep the order they were handed in, which is expected to be ascending retention time.
/// Within a scan the m/z values are sorted ascending.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct PeakIndex {
    mz: Vec<f64>,
    intensity: Vec<f64>,
    scan_offsets: Vec<usize>,
    scan_lengths: Vec<usize>,
    retention_times: Vec<f64>,
    scan_numbers: Vec<usize>,
    ms_levels: Vec<u8>,
}

impl PeakIndex {
    /// Indexes every scan.
    pub fn build(scans: &[MsScan]) -> Self {
        Self::build_filtered(scans, |_| true)
    }

    /// Indexes the scans passing `filter`, for example MS1 only.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::data::spectrum::{MsScan, MzSpectrum};
    /// use msindex::index::peak_index::PeakIndex;
    ///
    /// let scans = vec![
    ///     MsScan::new(1, 1, 0.1, MzSpectrum::new(vec![400.0, 500.0], vec![1.0, 2.0])),
    ///     MsScan::new(2, 2, 0.2, MzSpectrum::new(vec![300.0], vec![1.0])),
    ///     MsScan::new(3, 1, 0.3, MzSpectrum::new(vec![500.001], vec![4.0])),
    /// ];
    /// let index = PeakIndex::build_filtered(&scans, |scan| scan.ms_level == 1);
    /// assert_eq!(index.scan_count(), 2);
    /// assert_eq!(index.peak_count(), 3);
    /// assert_eq!(index.scan_info(1).unwrap().one_based_scan_number, 3);
    /// ```
    pub fn build_filtered<F>(scans: &[MsScan], filter: F) -> Self
    where
        F: Fn(&MsScan) -> bool,
    {
        let start = Instant::now();
        let selected: Vec<&MsScan> = scans.iter().filter(|scan| filter(scan)).collect();
        let total_peaks: usize = selected.iter().map(|scan| scan.spectrum.len()).sum();

        let mut index = PeakIndex {
            mz: Vec::with_capacity(total_peaks),
            intensity: Vec::with_capacity(total_peaks),
            scan_offsets: Vec::with_capacity(selected.len()),
            scan_lengths: Vec::with_capacity(selected.len()),
            retention_times: Vec::with_capacity(selected.len()),
            scan_numbers: Vec::with_capacity(selected.len()),
            ms_levels: Vec::with_capacity(selected.len()),
        };

        for scan in selected {
            let spectrum = &scan.spectrum;
            index.scan_offsets.push(index.mz.len());
            index.scan_lengths.push(spectrum.len());
            index.retention_times.push(scan.retention_time);
            index.scan_numbers.push(scan.one_based_scan_number);
            index.ms_levels.push(scan.ms_level);

            if spectrum.mz.windows(2).all(|w| w[0] <= w[1]) {
                index.mz.extend_from_slice(&spectrum.mz);
                index.intensity.extend_from_slice(&spectrum.intensity);
            } else {
                let mut pairs: Vec<(f64, f64)> = spectrum.mz.iter().cloned().zip(spectrum.intensity.iter().cloned()).collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (mz, intensity) in pairs {
                    index.mz.push(mz);
                    index.intensity.push(intensity);
                }
            }
        }

        log::info!("indexed {} peaks of {} scans in {:?}", index.peak_count(), index.scan_count(), start.elapsed());

        index
    }

    pub fn scan_count(&self) -> usize {
        self.scan_offsets.len()
    }

    pub fn peak_count(&self) -> usize {
        self.mz.len()
    }

    pub fn scan_info(&self, scan_index: usize) -> Option<ScanInfo> {
        if scan_index >= self.scan_count() {
            return None;
        }
        Some(ScanInfo {
            one_based_scan_number: self.scan_numbers[scan_index],
            retention_time: self.retention_times[scan_index],
            ms_level: self.ms_levels[scan_index],
            peak_count: self.scan_lengths[scan_index],
        })
    }

    pub fn scan_mz(&self, scan_index: usize) -> &[f64] {
        let offset = self.scan_offsets[scan_index];
        &self.mz[offset..offset + self.scan_lengths[scan_index]]
    }

    pub fn scan_intensity(&self, scan_index: usize) -> &[f64] {
        let offset = self.scan_offsets[scan_index];
        &self.intensity[offset..offset + self.scan_lengths[scan_index]]
    }

    /// Index of the last scan eluting before `retention_time`, 0 if there is none.
    pub fn start_scan_for_rt(&self, retention_time: f64) -> usize {
        self.retention_times.partition_point(|&rt| rt < retention_time).saturating_sub(1)
    }

    /// Closest peak to `mz` in one scan, if within `tolerance_ppm`.
    pub fn closest_indexed_peak(&self, mz: f64, scan_index: usize, tolerance_ppm: f64) -> Option<IndexedPeak> {
        self.closest_position(mz, scan_index, tolerance_ppm)
            .map(|position| self.indexed_peak(position, scan_index))
    }

    fn closest_position(&self, mz: f64, scan_index: usize, tolerance_ppm: f64) -> Option<usize> {
        if scan_index >= self.scan_count() {
            return None;
        }
        let local = closest_index(self.scan_mz(scan_index), mz)?;
        let position = self.scan_offsets[scan_index] + local;
        if ppm_error(self.mz[position], mz) <= tolerance_ppm { Some(position) } else { None }
    }

    fn indexed_peak(&self, position: usize, scan_index: usize) -> IndexedPeak {
        IndexedPeak {
            mz: self.mz[position],
            intensity: self.intensity[position],
            retention_time: self.retention_times[scan_index],
            scan_index,
        }
    }

    /// Follows `mz` from the last scan before `center_rt` in both directions.
    ///
    /// Arguments:
    ///
    /// * `mz` - target m/z
    /// * `center_rt` - retention time the walk starts at
    /// * `tolerance_ppm` - m/z tolerance per scan
    /// * `max_missed_scans` - consecutive scans without a peak a direction may cross
    /// * `max_half_width` - maximum retention time distance from the first peak found
    ///
    /// Returns:
    ///
    /// * `Vec<IndexedPeak>` - at most one peak per scan, sorted by retention time
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::data::spectrum::{MsScan, MzSpectrum};
    /// use msindex::index::peak_index::PeakIndex;
    ///
    /// let scans: Vec<MsScan> = (0..5)
    ///     .map(|i| MsScan::new(i + 1, 1, i as f64, MzSpectrum::new(vec![500.0], vec![10.0])))
    ///     .collect();
    /// let index = PeakIndex::build(&scans);
    /// assert_eq!(index.extract_trace(500.0, 2.5, 10.0, 1, f64::INFINITY).len(), 5);
    /// assert_eq!(index.extract_trace(500.0, 2.5, 10.0, 1, 1.0).len(), 3);
    /// ```
    pub fn extract_trace(&self, mz: f64, center_rt: f64, tolerance_ppm: f64, max_missed_scans: usize, max_half_width: f64) -> Vec<IndexedPeak> {
        if self.scan_count() == 0 {
            return Vec::new();
        }
        self.extract_trace_from_scan(mz, self.start_scan_for_rt(center_rt), tolerance_ppm, max_missed_scans, max_half_width)
    }

    /// Like [`Self::extract_trace`], starting at a known scan.
    pub fn extract_trace_from_scan(&self, mz: f64, start_scan: usize, tolerance_ppm: f64, max_missed_scans: usize, max_half_width: f64) -> Vec<IndexedPeak> {
        let mut peaks: Vec<IndexedPeak> = self.trace_positions(mz, start_scan, tolerance_ppm, max_missed_scans, max_half_width, None)
            .into_iter()
            .map(|(position, scan_index)| self.indexed_peak(position, scan_index))
            .collect();
        peaks.sort_by(|a, b| a.retention_time.total_cmp(&b.retention_time).then(a.scan_index.cmp(&b.scan_index)));
        peaks
    }

    /// Flat positions and scans of a trace. Claimed peaks count as misses.
    fn trace_positions(
        &self,
        mz: f64,
        start_scan: usize,
        tolerance_ppm: f64,
        max_missed_scans: usize,
        max_half_width: f64,
        claimed: Option<&[bool]>,
    ) -> Vec<(usize, usize)> {
        if start_scan >= self.scan_count() {
            return Vec::new();
        }

        let lookup = |scan_index: usize| {
            self.closest_position(mz, scan_index, tolerance_ppm)
                .filter(|&position| claimed.map_or(true, |c| !c[position]))
        };

        let mut trace = Vec::new();
        let mut anchor_rt: Option<f64> = None;

        if let Some(position) = lookup(start_scan) {
            trace.push((position, start_scan));
            anchor_rt = Some(self.retention_times[start_scan]);
        }

        let down = (0..start_scan).rev();
        let up = start_scan + 1..self.scan_count();
        let directions: [Box<dyn Iterator<Item = usize>>; 2] = [Box::new(down), Box::new(up)];

        for direction in directions {
            let mut missed = 0;
            for scan_index in direction {
                let rt = self.retention_times[scan_index];
                if let Some(anchor) = anchor_rt {
                    if (rt - anchor).abs() > max_half_width {
                        break;
                    }
                }

                match lookup(scan_index) {
                    Some(position) => {
                        trace.push((position, scan_index));
                        anchor_rt.get_or_insert(rt);
                        missed = 0;
                    }
                    None => {
                        missed += 1;
                        if missed > max_missed_scans {
                            break;
                        }
                    }
                }
            }
        }

        trace
    }

    /// Traces every peak that is not part of an earlier trace, lowest intensity first.
    ///
    /// Traces shorter than `min_peaks` are dropped. Their seed peak stays claimed, the other peaks do not.
    pub fn all_traces(&self, tolerance_ppm: f64, max_missed_scans: usize, max_half_width: f64, min_peaks: usize) -> Vec<ExtractedIonChromatogram> {
        let start = Instant::now();

        let mut scan_of_peak = vec![0usize; self.peak_count()];
        for scan_index in 0..self.scan_count() {
            let offset = self.scan_offsets[scan_index];
            scan_of_peak[offset..offset + self.scan_lengths[scan_index]].fill(scan_index);
        }

        let mut order: Vec<usize> = (0..self.peak_count()).collect();
        order.sort_by(|&a, &b| self.intensity[a].total_cmp(&self.intensity[b]).then(a.cmp(&b)));

        let mut claimed = vec![false; self.peak_count()];
        let mut traces = Vec::new();

        for position in order {
            if claimed[position] {
                continue;
            }

            let trace = self.trace_positions(self.mz[position], scan_of_peak[position], tolerance_ppm, max_missed_scans, max_half_width, Some(&claimed));
            if trace.is_empty() || trace.len() < min_peaks {
                // the seed stays claimed, later traces count it as a miss
                claimed[position] = true;
                continue;
            }

            for &(member, _) in &trace {
                claimed[member] = true;
            }
            traces.push(ExtractedIonChromatogram::new(
                trace.into_iter().map(|(member, scan_index)| self.indexed_peak(member, scan_index)).collect(),
            ));
        }

        log::debug!("extracted {} traces from {} peaks in {:?}", traces.len(), self.peak_count(), start.elapsed());

        traces
    }

    pub fn serialize_index(&self) -> Result<Vec<u8>> {
        encode_blob(PEAK_INDEX_MAGIC, self)
    }

    pub fn deserialize_index(bytes: &[u8]) -> Result<Self> {
        decode_blob(PEAK_INDEX_MAGIC, bytes)
    }
}
