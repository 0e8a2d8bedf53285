use rayon::prelude::*;

use crate::error::Result;
use crate::extract::fragment::{check_batch_lengths, extract_query, FragmentExtractor, FragmentQuery, FragmentResult};
use crate::index::dia::DiaScanIndex;

/// Extractor laid out like a device kernel: one task per query writes into its own fixed
/// stride of `max_scans_per_window` slots, a second pass compacts the slots into the caller
/// buffers. Tasks run on the rayon pool of the caller.
///
/// The scratch buffers are reused between batches, so one instance serves one worker.
#[derive(Debug)]
pub struct GpuFragmentExtractor<'a> {
    index: &'a DiaScanIndex,
    stride: usize,
    scratch_rt: Vec<f32>,
    scratch_intensity: Vec<f32>,
    scratch_counts: Vec<(usize, f32)>,
}

impl<'a> GpuFragmentExtractor<'a> {
    pub fn new(index: &'a DiaScanIndex) -> Self {
        GpuFragmentExtractor {
            index,
            stride: index.max_scans_per_window().max(1),
            scratch_rt: Vec::new(),
            scratch_intensity: Vec::new(),
            scratch_counts: Vec::new(),
        }
    }

    /// Slots reserved per query.
    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl FragmentExtractor for GpuFragmentExtractor<'_> {
    fn extract_batch(
        &mut self,
        queries: &[FragmentQuery],
        results: &mut [FragmentResult],
        rt_buffer: &mut [f32],
        intensity_buffer: &mut [f32],
    ) -> Result<usize> {
        check_batch_lengths(queries, results)?;

        let slots = queries.len() * self.stride;
        self.scratch_rt.clear();
        self.scratch_rt.resize(slots, 0.0);
        self.scratch_intensity.clear();
        self.scratch_intensity.resize(slots, 0.0);

        let index = self.index;
        self.scratch_rt.par_chunks_mut(self.stride)
            .zip(self.scratch_intensity.par_chunks_mut(self.stride))
            .zip(queries.par_iter())
            .map(|((rt, intensity), query)| extract_query(index, query, rt, intensity))
            .collect_into_vec(&mut self.scratch_counts);

        let mut written = 0;
        for (slot, (query, result)) in queries.iter().zip(results.iter_mut()).enumerate() {
            let (count, total_intensity) = self.scratch_counts[slot];
            let from = slot * self.stride;
            rt_buffer[written..written + count].copy_from_slice(&self.scratch_rt[from..from + count]);
            intensity_buffer[written..written + count].copy_from_slice(&self.scratch_intensity[from..from + count]);

            *result = FragmentResult {
                query_id: query.query_id,
                data_point_count: count,
                rt_buffer_offset: written,
                intensity_buffer_offset: written,
                total_intensity,
            };
            written += count;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::cpu::CpuFragmentExtractor;
    use crate::extract::fragment::tests::{fragment_index, query};

    fn run<E: FragmentExtractor>(extractor: &mut E, queries: &[FragmentQuery], capacity: usize) -> (usize, Vec<FragmentResult>, Vec<f32>, Vec<f32>) {
        let mut results = vec![FragmentResult::default(); queries.len()];
        let mut rt = vec![0.0; capacity];
        let mut intensity = vec![0.0; capacity];
        let written = extractor.extract_batch(queries, &mut results, &mut rt, &mut intensity).unwrap();
        (written, results, rt, intensity)
    }

    #[test]
    fn test_identical_to_cpu() {
        let index = fragment_index();
        let queries: Vec<FragmentQuery> = (0..40u32)
            .map(|i| query(i, i % 3, 300.0 + (i % 5) as f32 * 100.0, (i % 4) as f32 * 0.5, 10.0 - (i % 2) as f32 * 7.5))
            .collect();
        let capacity = queries.len() * index.max_scans_per_window();

        let cpu = run(&mut CpuFragmentExtractor::new(&index), &queries, capacity);
        let mut gpu_extractor = GpuFragmentExtractor::new(&index);
        let gpu = run(&mut gpu_extractor, &queries, capacity);
        assert_eq!(cpu, gpu);

        // scratch reuse with a smaller batch
        let again = run(&mut gpu_extractor, &queries[..7], capacity);
        let cpu_again = run(&mut CpuFragmentExtractor::new(&index), &queries[..7], capacity);
        assert_eq!(again, cpu_again);
    }

    #[test]
    fn test_empty_index_stride() {
        let index = DiaScanIndex::default();
        let mut extractor = GpuFragmentExtractor::new(&index);
        assert_eq!(extractor.stride(), 1);
        let (written, results, _, _) = run(&mut extractor, &[query(3, 0, 500.0, 0.0, 1.0)], 1);
        assert_eq!(written, 0);
        assert_eq!(results[0].query_id, 3);
    }
}
