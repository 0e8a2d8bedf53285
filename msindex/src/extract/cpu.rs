use crate::error::Result;
use crate::extract::fragment::{check_batch_lengths, extract_query, FragmentExtractor, FragmentQuery, FragmentResult};
use crate::index::dia::DiaScanIndex;

/// Scalar extractor, one query after the other.
#[derive(Clone, Copy, Debug)]
pub struct CpuFragmentExtractor<'a> {
    index: &'a DiaScanIndex,
}

impl<'a> CpuFragmentExtractor<'a> {
    pub fn new(index: &'a DiaScanIndex) -> Self {
        CpuFragmentExtractor { index }
    }
}

impl FragmentExtractor for CpuFragmentExtractor<'_> {
    fn extract_batch(
        &mut self,
        queries: &[FragmentQuery],
        results: &mut [FragmentResult],
        rt_buffer: &mut [f32],
        intensity_buffer: &mut [f32],
    ) -> Result<usize> {
        check_batch_lengths(queries, results)?;

        let mut written = 0;
        for (query, result) in queries.iter().zip(results.iter_mut()) {
            let (count, total_intensity) = extract_query(self.index, query, &mut rt_buffer[written..], &mut intensity_buffer[written..]);
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
    use crate::error::IndexError;
    use crate::extract::fragment::tests::{fragment_index, query};

    #[test]
    fn test_offsets_are_contiguous() {
        let index = fragment_index();
        let queries = vec![
            query(10, 0, 500.0, 0.0, 10.0),
            query(11, 7, 500.0, 0.0, 10.0),
            query(12, 1, 500.0, 0.0, 10.0),
            query(13, 1, 650.0, 0.0, 10.0),
        ];
        let capacity = queries.len() * index.max_scans_per_window();
        let mut results = vec![FragmentResult::default(); queries.len()];
        let mut rt = vec![0.0; capacity];
        let mut intensity = vec![0.0; capacity];

        let written = CpuFragmentExtractor::new(&index).extract_batch(&queries, &mut results, &mut rt, &mut intensity).unwrap();
        assert_eq!(written, 9);

        assert_eq!(results[0].data_point_count, 4);
        assert_eq!(results[0].rt_buffer_offset, 0);
        // unknown window, empty and positioned at the write cursor
        assert_eq!(results[1], FragmentResult { query_id: 11, data_point_count: 0, rt_buffer_offset: 4, intensity_buffer_offset: 4, total_intensity: 0.0 });
        assert_eq!(results[2].rt_buffer_offset, 4);
        assert_eq!(results[2].data_point_count, 5);
        assert_eq!(results[2].total_intensity, 35.0);
        assert_eq!(&rt[4..9], &[0.1f32, 1.1, 2.1, 3.1, 4.1]);
        assert_eq!(results[3].data_point_count, 0);
        assert_eq!(results[3].rt_buffer_offset, 9);
    }

    #[test]
    fn test_result_length_mismatch() {
        let index = fragment_index();
        let queries = vec![query(0, 0, 500.0, 0.0, 10.0)];
        let mut results = vec![FragmentResult::default(); 2];
        let outcome = CpuFragmentExtractor::new(&index).extract_batch(&queries, &mut results, &mut [0.0; 8], &mut [0.0; 8]);
        assert!(matches!(outcome, Err(IndexError::BufferLengthMismatch { queries: 1, results: 2 })));
    }

    #[test]
    #[should_panic]
    fn test_undersized_buffer_panics() {
        let index = fragment_index();
        let queries = vec![query(0, 0, 500.0, 0.0, 10.0)];
        let mut results = vec![FragmentResult::default(); 1];
        let _ = CpuFragmentExtractor::new(&index).extract_batch(&queries, &mut results, &mut [0.0; 2], &mut [0.0; 2]);
    }
}
