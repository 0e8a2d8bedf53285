use std::collections::VecDeque;

use crate::chemistry::constants::ISOTOPE_SHIFTS;
use crate::data::envelope::IsotopicEnvelope;
use crate::data::feature::AggregatedFeature;
use crate::error::{DeconvolutionError, Result};
use crate::params::AggregationParams;

/// Whether `mass` matches `feature_mass` directly or after an isotope shift of up to three peaks.
///
/// # Examples
///
/// ```
/// use msdecon::algorithm::aggregation::matches_feature_mass;
///
/// assert!(matches_feature_mass(1000.0, 1000.004, 5.0));
/// assert!(matches_feature_mass(1000.0, 1001.002868314, 5.0));
/// assert!(matches_feature_mass(1003.007841294, 1000.0, 5.0));
/// assert!(!matches_feature_mass(1000.0, 1000.5, 5.0));
/// ```
pub fn matches_feature_mass(mass: f64, feature_mass: f64, tolerance_ppm: f64) -> bool {
    let within = |shifted: f64| (shifted - feature_mass).abs() / feature_mass * 1e6 <= tolerance_ppm;

    within(mass) || ISOTOPE_SHIFTS.iter().any(|&shift| within(mass + shift) || within(mass - shift))
}

/// Groups envelopes of consecutive scans into features.
///
/// Scans have to arrive with strictly increasing index. A feature is closed once it
/// went unseen for more than `lag_scans` scans.
#[derive(Clone, Debug)]
pub struct EnvelopeAggregator {
    params: AggregationParams,
    open: Vec<AggregatedFeature>,
    last_scan_index: Option<usize>,
}

impl EnvelopeAggregator {
    pub fn new(params: AggregationParams) -> Self {
        EnvelopeAggregator { params, open: Vec::new(), last_scan_index: None }
    }

    pub fn open_feature_count(&self) -> usize {
        self.open.len()
    }

    /// Adds the envelopes of one scan and returns the features this scan closed, in creation order.
    ///
    /// Arguments:
    ///
    /// * `scan_index` - index of the scan, larger than every index pushed before
    /// * `elution_time` - retention time of the scan
    /// * `envelopes` - envelopes of the scan, matched against open features in this order
    ///
    /// Returns:
    ///
    /// * `Result<Vec<AggregatedFeature>>` - closed features, `OutOfOrderScan` if the index did not increase
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::aggregation::EnvelopeAggregator;
    /// use msdecon::data::envelope::IsotopicEnvelope;
    /// use msdecon::data::spectrum::Peak;
    /// use msdecon::params::AggregationParams;
    ///
    /// let envelope = |mass: f64| IsotopicEnvelope::new(vec![Peak::new(501.0, 10.0), Peak::new(501.5, 5.0)], mass, 2, 0.9, 0);
    /// let mut aggregator = EnvelopeAggregator::new(AggregationParams::default());
    /// assert!(aggregator.push_scan(1, 0.1, vec![envelope(1000.0)]).unwrap().is_empty());
    /// let closed = aggregator.push_scan(2, 0.2, vec![envelope(2000.0)]).unwrap();
    /// assert_eq!(closed.len(), 1);
    /// assert!(aggregator.push_scan(2, 0.2, vec![]).is_err());
    /// assert_eq!(aggregator.finish().len(), 1);
    /// ```
    pub fn push_scan(&mut self, scan_index: usize, elution_time: f64, envelopes: Vec<IsotopicEnvelope>) -> Result<Vec<AggregatedFeature>> {
        if let Some(last_scan_index) = self.last_scan_index {
            if scan_index <= last_scan_index {
                return Err(DeconvolutionError::OutOfOrderScan { scan_index, last_scan_index });
            }
        }
        self.last_scan_index = Some(scan_index);

        for envelope in envelopes {
            let tolerance = self.params.tolerance_ppm;
            match self.open.iter_mut().find(|feature| matches_feature_mass(envelope.monoisotopic_mass, feature.mass, tolerance)) {
                Some(feature) => feature.add_envelope(envelope, scan_index, elution_time, self.params.subgroup_tolerance_ppm),
                None => self.open.push(AggregatedFeature::new(envelope, scan_index, elution_time)),
            }
        }

        let lag = self.params.lag_scans;
        let (closed, open): (Vec<AggregatedFeature>, Vec<AggregatedFeature>) = std::mem::take(&mut self.open)
            .into_iter()
            .partition(|feature| feature.max_scan_index + lag < scan_index);
        self.open = open;

        if !closed.is_empty() {
            log::debug!("scan {}: closed {} features, {} open", scan_index, closed.len(), self.open.len());
        }

        Ok(closed)
    }

    /// Closes every remaining feature.
    pub fn finish(&mut self) -> Vec<AggregatedFeature> {
        std::mem::take(&mut self.open)
    }
}

/// Lazy iterator of features over `(scan_index, elution_time, envelopes)` items.
///
/// Yields an error once and stops if scans arrive out of order.
pub struct AggregatedFeatures<I> {
    scans: I,
    aggregator: EnvelopeAggregator,
    pending: VecDeque<AggregatedFeature>,
    done: bool,
}

impl<I> Iterator for AggregatedFeatures<I>
where
    I: Iterator<Item = (usize, f64, Vec<IsotopicEnvelope>)>,
{
    type Item = Result<AggregatedFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(feature) = self.pending.pop_front() {
                return Some(Ok(feature));
            }
            if self.done {
                return None;
            }

            match self.scans.next() {
                Some((scan_index, elution_time, envelopes)) => {
                    match self.aggregator.push_scan(scan_index, elution_time, envelopes) {
                        Ok(closed) => self.pending.extend(closed),
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                None => {
                    self.done = true;
                    self.pending.extend(self.aggregator.finish());
                }
            }
        }
    }
}

/// Aggregates a stream of deconvoluted scans lazily.
///
/// # Examples
///
/// ```
/// use msdecon::algorithm::aggregation::aggregate;
/// use msdecon::data::envelope::IsotopicEnvelope;
/// use msdecon::data::spectrum::Peak;
/// use msdecon::params::AggregationParams;
///
/// let envelope = |mass: f64| IsotopicEnvelope::new(vec![Peak::new(501.0, 10.0), Peak::new(501.5, 5.0)], mass, 2, 0.9, 0);
/// let scans = vec![(1, 0.1, vec![envelope(1000.0)]), (2, 0.2, vec![envelope(1000.001)])];
/// let features: Vec<_> = aggregate(scans, AggregationParams::default()).collect::<Result<_, _>>().unwrap();
/// assert_eq!(features.len(), 1);
/// assert_eq!(features[0].envelopes.len(), 2);
/// ```
pub fn aggregate<I>(scans: I, params: AggregationParams) -> AggregatedFeatures<I::IntoIter>
where
    I: IntoIterator<Item = (usize, f64, Vec<IsotopicEnvelope>)>,
{
    AggregatedFeatures {
        scans: scans.into_iter(),
        aggregator: EnvelopeAggregator::new(params),
        pending: VecDeque::new(),
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spectrum::Peak;

    fn envelope(mass: f64, intensity: f64) -> IsotopicEnvelope {
        IsotopicEnvelope::new(vec![Peak::new(mass / 2.0, intensity), Peak::new(mass / 2.0 + 0.5, intensity / 2.0)], mass, 2, 0.9, 0)
    }

    fn collect(scans: Vec<(usize, f64, Vec<IsotopicEnvelope>)>, params: AggregationParams) -> Vec<AggregatedFeature> {
        aggregate(scans, params).collect::<Result<Vec<_>>>().unwrap()
    }

    fn scans() -> Vec<(usize, f64, Vec<IsotopicEnvelope>)> {
        vec![
            (1, 0.10, vec![envelope(1500.0, 100.0), envelope(2400.0, 50.0)]),
            (2, 0.12, vec![envelope(1500.003, 120.0), envelope(1501.002868314, 40.0)]),
            (3, 0.14, vec![envelope(2400.0, 30.0)]),
            (4, 0.16, vec![envelope(1500.001, 80.0)]),
            (5, 0.18, vec![envelope(3100.0, 80.0)]),
        ]
    }

    #[test]
    fn test_isotope_shifted_masses_join() {
        let features = collect(scans(), AggregationParams::default());
        // 2400 closes after scan 2, 1500 after scan 3, then 2400 reopens and 1500 continues
        let masses: Vec<(f64, usize, usize)> = features.iter().map(|f| (f.mass, f.min_scan_index, f.max_scan_index)).collect();
        assert_eq!(features.len(), 5);
        assert_eq!(masses[0].1..=masses[0].2, 1..=1);
        assert_eq!(features[0].envelopes[0].monoisotopic_mass, 2400.0);
        assert_eq!(features[1].envelopes.len(), 3);
        assert_eq!(features[1].subgroups.len(), 2);
        assert_eq!((features[1].min_scan_index, features[1].max_scan_index), (1, 2));
    }

    #[test_log::test]
    fn test_lag_keeps_features_open() {
        let params = AggregationParams { lag_scans: 2, ..AggregationParams::default() };
        let features = collect(scans(), params);
        assert_eq!(features.len(), 3);
        let first = &features[0];
        assert_eq!(first.envelopes.len(), 4);
        assert_eq!((first.min_scan_index, first.max_scan_index), (1, 4));
        assert_eq!(first.peak_count, 8);
        assert!((first.mass - 1500.001).abs() < 1e-9);
        assert_eq!(features[1].envelopes.len(), 2);
        assert_eq!(features[2].mass, 3100.0);
    }

    #[test]
    fn test_deterministic() {
        let a = collect(scans(), AggregationParams::default());
        let b = collect(scans(), AggregationParams::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_order_scan() {
        let mut aggregator = EnvelopeAggregator::new(AggregationParams::default());
        aggregator.push_scan(5, 1.0, vec![envelope(1000.0, 1.0)]).unwrap();
        assert_eq!(
            aggregator.push_scan(4, 0.9, vec![]),
            Err(DeconvolutionError::OutOfOrderScan { scan_index: 4, last_scan_index: 5 })
        );

        let mut iter = aggregate(vec![(2, 0.2, vec![]), (1, 0.1, vec![])], AggregationParams::default());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_first_open_feature_wins() {
        let mut aggregator = EnvelopeAggregator::new(AggregationParams { tolerance_ppm: 20.0, ..AggregationParams::default() });
        aggregator.push_scan(1, 0.1, vec![envelope(1000.0, 1.0), envelope(1000.015, 1.0)]).unwrap();
        assert_eq!(aggregator.open_feature_count(), 1);
        aggregator.push_scan(2, 0.2, vec![envelope(1000.01, 1.0)]).unwrap();
        let features = aggregator.finish();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].envelopes.len(), 3);
    }
}
