use std::collections::BTreeMap;
use std::time::Instant;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::error::Result;
use crate::extract::fragment::{FragmentExtractor, FragmentQuery, FragmentResult};
use crate::index::dia::DiaScanIndex;

/// Merged output of [`ExtractionOrchestrator::extract_all`], results in query order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionResult {
    pub results: Vec<FragmentResult>,
    pub rt_buffer: Vec<f32>,
    pub intensity_buffer: Vec<f32>,
}

impl ExtractionResult {
    /// Retention times and intensities of one result.
    pub fn data_points(&self, result: &FragmentResult) -> (&[f32], &[f32]) {
        (
            &self.rt_buffer[result.rt_buffer_offset..result.rt_buffer_offset + result.data_point_count],
            &self.intensity_buffer[result.intensity_buffer_offset..result.intensity_buffer_offset + result.data_point_count],
        )
    }
}

/// Output of one window task.
struct WindowBatch {
    positions: Vec<usize>,
    results: Vec<FragmentResult>,
    rt_buffer: Vec<f32>,
    intensity_buffer: Vec<f32>,
}

/// Splits a query set by window and runs one extractor per window on a rayon pool.
pub struct ExtractionOrchestrator<'a, F> {
    index: &'a DiaScanIndex,
    factory: F,
}

impl<'a, F, E> ExtractionOrchestrator<'a, F>
where
    F: Fn(&'a DiaScanIndex) -> E + Sync,
    E: FragmentExtractor,
{
    /// # Examples
    ///
    /// ```
    /// use msdecon::data::spectrum::{MsScan, MzSpectrum};
    /// use msindex::extract::cpu::CpuFragmentExtractor;
    /// use msindex::extract::fragment::FragmentQuery;
    /// use msindex::extract::orchestrator::ExtractionOrchestrator;
    /// use msindex::index::dia::DiaScanIndexBuilder;
    ///
    /// let scans = vec![MsScan::new(1, 2, 1.0, MzSpectrum::new(vec![500.0], vec![3.0])).with_isolation(410.0, Some(20.0))];
    /// let index = DiaScanIndexBuilder::default().build(&scans).unwrap();
    /// let orchestrator = ExtractionOrchestrator::new(&index, CpuFragmentExtractor::new);
    /// let query = FragmentQuery { query_id: 0, window_id: 0, target_mz: 500.0, tolerance_ppm: 20.0, rt_min: 0.0, rt_max: 2.0 };
    /// let extracted = orchestrator.extract_all(&[query], 1).unwrap();
    /// assert_eq!(extracted.results[0].data_point_count, 1);
    /// assert_eq!(extracted.intensity_buffer, vec![3.0]);
    /// ```
    pub fn new(index: &'a DiaScanIndex, factory: F) -> Self {
        ExtractionOrchestrator { index, factory }
    }

    /// Extracts every query.
    ///
    /// Arguments:
    ///
    /// * `queries` - queries of any windows, in any order
    /// * `max_parallelism` - worker threads, 0 uses one per core
    ///
    /// Returns:
    ///
    /// * `Result<ExtractionResult>` - one result per query in input order, offsets into the merged buffers
    pub fn extract_all(&self, queries: &[FragmentQuery], max_parallelism: usize) -> Result<ExtractionResult> {
        if queries.is_empty() {
            return Ok(ExtractionResult::default());
        }
        let start = Instant::now();

        let mut by_window: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (position, query) in queries.iter().enumerate() {
            by_window.entry(query.window_id).or_default().push(position);
        }

        let slots_per_query = self.index.max_scans_per_window().max(1);
        let pool = ThreadPoolBuilder::new().num_threads(max_parallelism).build()?;

        let batches: Vec<WindowBatch> = pool.install(|| {
            by_window.into_par_iter()
                .map(|(_, positions)| self.extract_window(queries, positions, slots_per_query))
                .collect::<Result<Vec<_>>>()
        })?;

        let total_points: usize = batches.iter().map(|batch| batch.rt_buffer.len()).sum();
        let mut merged = ExtractionResult {
            results: vec![FragmentResult::default(); queries.len()],
            rt_buffer: Vec::with_capacity(total_points),
            intensity_buffer: Vec::with_capacity(total_points),
        };

        let window_count = batches.len();
        for batch in batches {
            let base = merged.rt_buffer.len();
            merged.rt_buffer.extend_from_slice(&batch.rt_buffer);
            merged.intensity_buffer.extend_from_slice(&batch.intensity_buffer);

            for (position, mut result) in batch.positions.into_iter().zip(batch.results) {
                result.rt_buffer_offset += base;
                result.intensity_buffer_offset += base;
                merged.results[position] = result;
            }
        }

        log::debug!(
            "extracted {} queries over {} windows into {} data points in {:?}",
            queries.len(), window_count, total_points, start.elapsed()
        );

        Ok(merged)
    }

    fn extract_window(&self, queries: &[FragmentQuery], positions: Vec<usize>, slots_per_query: usize) -> Result<WindowBatch> {
        let window_queries: Vec<FragmentQuery> = positions.iter().map(|&position| queries[position]).collect();
        let capacity = window_queries.len() * slots_per_query;

        let mut results = vec![FragmentResult::default(); window_queries.len()];
        let mut rt_buffer = vec![0.0; capacity];
        let mut intensity_buffer = vec![0.0; capacity];

        let mut extractor = (self.factory)(self.index);
        let written = extractor.extract_batch(&window_queries, &mut results, &mut rt_buffer, &mut intensity_buffer)?;
        rt_buffer.truncate(written);
        intensity_buffer.truncate(written);

        Ok(WindowBatch { positions, results, rt_buffer, intensity_buffer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::cpu::CpuFragmentExtractor;
    use crate::extract::gpu::GpuFragmentExtractor;
    use crate::extract::fragment::tests::{fragment_index, query};

    fn mixed_queries() -> Vec<FragmentQuery> {
        vec![
            query(0, 1, 500.0, 0.0, 10.0),
            query(1, 0, 500.0, 0.0, 10.0),
            query(2, 5, 500.0, 0.0, 10.0),
            query(3, 0, 300.0, 1.5, 10.0),
            query(4, 1, 800.0, 0.0, 2.0),
        ]
    }

    #[test]
    fn test_results_in_query_order() {
        let index = fragment_index();
        let orchestrator = ExtractionOrchestrator::new(&index, CpuFragmentExtractor::new);
        let extracted = orchestrator.extract_all(&mixed_queries(), 2).unwrap();

        let ids: Vec<u32> = extracted.results.iter().map(|r| r.query_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        let counts: Vec<usize> = extracted.results.iter().map(|r| r.data_point_count).collect();
        assert_eq!(counts, vec![5, 4, 0, 3, 2]);

        let (rt, intensity) = extracted.data_points(&extracted.results[1]);
        assert_eq!(rt, &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(intensity, &[2.0, 8.0, 18.0, 8.0]);
        let (_, intensity) = extracted.data_points(&extracted.results[4]);
        assert_eq!(intensity, &[8.0, 8.0]);
        assert_eq!(extracted.rt_buffer.len(), 14);
    }

    #[test]
    fn test_extractors_agree() {
        let index = fragment_index();
        let cpu = ExtractionOrchestrator::new(&index, CpuFragmentExtractor::new).extract_all(&mixed_queries(), 0).unwrap();
        let gpu = ExtractionOrchestrator::new(&index, GpuFragmentExtractor::new).extract_all(&mixed_queries(), 3).unwrap();
        assert_eq!(cpu, gpu);
    }

    #[test]
    fn test_empty_queries() {
        let index = fragment_index();
        let extracted = ExtractionOrchestrator::new(&index, CpuFragmentExtractor::new).extract_all(&[], 1).unwrap();
        assert_eq!(extracted, ExtractionResult::default());
    }
}
