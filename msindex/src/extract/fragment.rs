use serde::{Serialize, Deserialize};

use crate::error::{IndexError, Result};
use crate::index::dia::DiaScanIndex;

/// One fragment ion chromatogram to extract from a DIA window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentQuery {
    pub query_id: u32,
    pub window_id: u32,
    pub target_mz: f32,
    /// absent in JSON means 0, which callers replace with their default tolerance
    #[serde(default)]
    pub tolerance_ppm: f32,
    pub rt_min: f32,
    pub rt_max: f32,
}

/// Where the data points of a query ended up in the output buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentResult {
    pub query_id: u32,
    pub data_point_count: usize,
    pub rt_buffer_offset: usize,
    pub intensity_buffer_offset: usize,
    pub total_intensity: f32,
}

/// Extracts fragment chromatograms into caller owned buffers.
///
/// `rt_buffer` and `intensity_buffer` need room for every data point of the batch,
/// `queries.len() * index.max_scans_per_window()` is always enough. Smaller buffers
/// are a caller error and panic.
pub trait FragmentExtractor {
    /// Writes the data points of all queries back to back and returns how many were written.
    fn extract_batch(
        &mut self,
        queries: &[FragmentQuery],
        results: &mut [FragmentResult],
        rt_buffer: &mut [f32],
        intensity_buffer: &mut [f32],
    ) -> Result<usize>;
}

/// Smallest index whose value is not below `target`, the length if there is none.
///
/// # Examples
///
/// ```
/// use msindex::extract::fragment::lower_bound;
///
/// assert_eq!(lower_bound(&[1.0, 2.0, 2.0, 3.0], 2.0), 1);
/// assert_eq!(lower_bound(&[1.0, 2.0], 5.0), 2);
/// assert_eq!(lower_bound(&[], 5.0), 0);
/// ```
#[inline]
pub fn lower_bound(sorted: &[f32], target: f32) -> usize {
    sorted.partition_point(|&x| x < target)
}

pub(crate) fn check_batch_lengths(queries: &[FragmentQuery], results: &[FragmentResult]) -> Result<()> {
    if queries.len() != results.len() {
        return Err(IndexError::BufferLengthMismatch { queries: queries.len(), results: results.len() });
    }
    Ok(())
}

/// Data points of one query, written from the start of the output slices.
/// Returns the number of points and their summed intensity.
pub(crate) fn extract_query(index: &DiaScanIndex, query: &FragmentQuery, rt_out: &mut [f32], intensity_out: &mut [f32]) -> (usize, f32) {
    let (start, count) = match index.try_get_scan_range_for_window(query.window_id) {
        Some(range) => range,
        None => return (0, 0.0),
    };

    let tolerance = query.target_mz * query.tolerance_ppm / 1e6;
    let (low, high) = (query.target_mz - tolerance, query.target_mz + tolerance);

    let mut written = 0;
    let mut total = 0.0;

    for scan_index in start..start + count {
        let rt = index.scan_rt(scan_index);
        if rt < query.rt_min {
            continue;
        }
        if rt > query.rt_max {
            break;
        }

        let mz = index.scan_mz(scan_index);
        let intensity = index.scan_intensity(scan_index);
        let mut sum = 0.0;
        let mut i = lower_bound(mz, low);
        while i < mz.len() && mz[i] <= high {
            sum += intensity[i];
            i += 1;
        }

        if sum > 0.0 {
            rt_out[written] = rt;
            intensity_out[written] = sum;
            written += 1;
            total += sum;
        }
    }

    (written, total)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use msdecon::data::spectrum::{MsScan, MzSpectrum};
    use crate::index::dia::DiaScanIndexBuilder;

    /// Two windows, five cycles; a fragment at 500.0 rises and falls in window 0.
    pub(crate) fn fragment_index() -> DiaScanIndex {
        let mut scans = Vec::new();
        for cycle in 0..5usize {
            let rt = cycle as f64;
            let apex = [1.0, 4.0, 9.0, 4.0, 0.0][cycle];
            scans.push(MsScan::new(2 * cycle + 1, 2, rt, MzSpectrum::new(vec![300.0, 499.999, 500.001, 700.0], vec![5.0, apex, apex, 5.0]))
                .with_isolation(410.0, Some(20.0)));
            scans.push(MsScan::new(2 * cycle + 2, 2, rt + 0.1, MzSpectrum::new(vec![500.0, 800.0], vec![7.0, 8.0]))
                .with_isolation(430.0, Some(20.0)));
        }
        DiaScanIndexBuilder::default().build(&scans).unwrap()
    }

    pub(crate) fn query(query_id: u32, window_id: u32, target_mz: f32, rt_min: f32, rt_max: f32) -> FragmentQuery {
        FragmentQuery { query_id, window_id, target_mz, tolerance_ppm: 20.0, rt_min, rt_max }
    }

    #[test]
    fn test_lower_bound_matches_linear_scan() {
        let sorted = [0.5f32, 1.0, 1.0, 1.5, 4.0, 9.5];
        for target in [-1.0f32, 0.5, 0.75, 1.0, 1.2, 4.0, 9.5, 10.0] {
            let expected = sorted.iter().position(|&x| x >= target).unwrap_or(sorted.len());
            assert_eq!(lower_bound(&sorted, target), expected);
        }
    }

    #[test]
    fn test_extract_query_sums_within_tolerance() {
        let index = fragment_index();
        let mut rt = vec![0.0; 8];
        let mut intensity = vec![0.0; 8];

        let (count, total) = extract_query(&index, &query(0, 0, 500.0, 0.0, 10.0), &mut rt, &mut intensity);
        // the last cycle sums to zero and is dropped
        assert_eq!(count, 4);
        assert_eq!(&intensity[..4], &[2.0, 8.0, 18.0, 8.0]);
        assert_eq!(&rt[..4], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(total, 36.0);

        let (count, _) = extract_query(&index, &query(1, 0, 500.0, 0.5, 2.5), &mut rt, &mut intensity);
        assert_eq!(count, 2);
        assert_eq!(&rt[..2], &[1.0, 2.0]);
    }

    #[test]
    fn test_query_without_tolerance_parses() {
        let query: FragmentQuery = serde_json::from_str(
            r#"{"query_id": 4, "window_id": 1, "target_mz": 500.0, "rt_min": 0.0, "rt_max": 2.5}"#
        ).unwrap();
        assert_eq!(query.tolerance_ppm, 0.0);
        assert_eq!(query.rt_max, 2.5);
    }

    #[test]
    fn test_unknown_window_is_empty() {
        let index = fragment_index();
        let mut rt = vec![0.0; 4];
        let mut intensity = vec![0.0; 4];
        assert_eq!(extract_query(&index, &query(0, 9, 500.0, 0.0, 10.0), &mut rt, &mut intensity), (0, 0.0));
    }
}
