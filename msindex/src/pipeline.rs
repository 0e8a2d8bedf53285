use std::sync::Arc;
use std::time::Instant;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use msdecon::algorithm::aggregation::EnvelopeAggregator;
use msdecon::algorithm::averagine::AverageResidueModel;
use msdecon::algorithm::deconvolution::{ClassicDeconvoluter, MzRange};
use msdecon::data::envelope::IsotopicEnvelope;
use msdecon::data::feature::AggregatedFeature;
use msdecon::data::spectrum::MsScan;
use msdecon::params::{AggregationParams, DeconvolutionParams};

use crate::error::Result;

pub type ScanFilter = Arc<dyn Fn(&MsScan) -> bool + Send + Sync>;

/// Deconvolutes the scans of a run in parallel and aggregates the envelopes in scan order.
///
/// Scans are identified by their one based scan number, which has to be unique.
pub struct DeconvolutionRun<'a> {
    deconvoluter: ClassicDeconvoluter<'a>,
    aggregation: AggregationParams,
    scan_filter: ScanFilter,
    min_scan: Option<usize>,
    max_scan: Option<usize>,
}

impl<'a> DeconvolutionRun<'a> {
    /// A run over all MS1 scans.
    pub fn new(model: &'a AverageResidueModel, params: &DeconvolutionParams, aggregation: AggregationParams) -> Result<Self> {
        Ok(DeconvolutionRun {
            deconvoluter: ClassicDeconvoluter::new(model, params)?,
            aggregation,
            scan_filter: Arc::new(|scan: &MsScan| scan.ms_level == 1),
            min_scan: None,
            max_scan: None,
        })
    }

    pub fn with_scan_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&MsScan) -> bool + Send + Sync + 'static,
    {
        self.scan_filter = Arc::new(filter);
        self
    }

    /// Restricts the run to one based scan numbers in `[min_scan, max_scan]`.
    pub fn with_scan_range(mut self, min_scan: Option<usize>, max_scan: Option<usize>) -> Self {
        self.min_scan = min_scan;
        self.max_scan = max_scan;
        self
    }

    fn selects(&self, scan: &MsScan) -> bool {
        let number = scan.one_based_scan_number;
        self.min_scan.map_or(true, |min| number >= min)
            && self.max_scan.map_or(true, |max| number <= max)
            && (self.scan_filter)(scan)
    }

    /// Resolved envelopes of one scan, tagged with its one based scan number.
    pub fn deconvolute_scan(&self, scan: &MsScan) -> Vec<IsotopicEnvelope> {
        self.deconvoluter.deconvolute_resolved(&scan.spectrum, MzRange::full())
            .into_iter()
            .map(|envelope| envelope.with_scan_index(scan.one_based_scan_number))
            .collect()
    }

    /// Runs the deconvolution and returns the features in the order they were closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::averagine::AverageResidueModel;
    /// use msdecon::data::spectrum::{MsScan, MzSpectrum};
    /// use msdecon::params::{AggregationParams, DeconvolutionParams};
    /// use msindex::pipeline::DeconvolutionRun;
    ///
    /// let model = AverageResidueModel::new(100);
    /// let params = DeconvolutionParams::default().with_charge_range(1, 4).with_tolerance_ppm(10.0);
    /// let scans: Vec<MsScan> = (1..=3)
    ///     .map(|n| MsScan::new(n, 1, n as f64 * 0.1, MzSpectrum::new(vec![500.0, 500.5, 501.0], vec![100.0, 60.0, 20.0])))
    ///     .collect();
    /// let run = DeconvolutionRun::new(&model, &params, AggregationParams::default()).unwrap();
    /// let features = run.run(&scans).unwrap();
    /// assert_eq!(features[0].max_scan_index, 3);
    /// ```
    pub fn run(&self, scans: &[MsScan]) -> Result<Vec<AggregatedFeature>> {
        let start = Instant::now();

        let mut selected: Vec<&MsScan> = scans.iter().filter(|scan| self.selects(scan)).collect();
        selected.sort_by_key(|scan| scan.one_based_scan_number);
        log::info!("deconvoluting {} of {} scans", selected.len(), scans.len());

        let deconvoluted: Vec<(usize, f64, Vec<IsotopicEnvelope>)> = selected
            .par_iter()
            .map(|scan| (scan.one_based_scan_number, scan.retention_time, self.deconvolute_scan(scan)))
            .collect();

        let mut aggregator = EnvelopeAggregator::new(self.aggregation.clone());
        let mut features = Vec::new();
        for (scan_number, retention_time, envelopes) in deconvoluted {
            features.extend(aggregator.push_scan(scan_number, retention_time, envelopes)?);
        }
        features.extend(aggregator.finish());

        log::info!("aggregated {} features in {:?}", features.len(), start.elapsed());

        Ok(features)
    }
}

/// Deconvolutes the scans passing `scan_filter` and aggregates them into features.
pub fn deconvolute_run<F>(
    scans: &[MsScan],
    scan_filter: F,
    model: &AverageResidueModel,
    params: &DeconvolutionParams,
    aggregation: &AggregationParams,
) -> Result<Vec<AggregatedFeature>>
where
    F: Fn(&MsScan) -> bool + Send + Sync + 'static,
{
    DeconvolutionRun::new(model, params, aggregation.clone())?
        .with_scan_filter(scan_filter)
        .run(scans)
}

/// Flat summary of a feature, one JSON line per feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub mass: f64,
    pub min_scan: usize,
    pub max_scan: usize,
    pub min_rt: f64,
    pub max_rt: f64,
    pub total_intensity: f64,
    pub peak_count: usize,
    pub envelope_count: usize,
    pub charges: Vec<u32>,
}

impl From<&AggregatedFeature> for FeatureRow {
    fn from(feature: &AggregatedFeature) -> Self {
        FeatureRow {
            mass: feature.mass,
            min_scan: feature.min_scan_index,
            max_scan: feature.max_scan_index,
            min_rt: feature.min_elution_time,
            max_rt: feature.max_elution_time,
            total_intensity: feature.total_intensity,
            peak_count: feature.peak_count,
            envelope_count: feature.envelopes.len(),
            charges: feature.charge_states(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msdecon::chemistry::constants::mass_to_mz;
    use msdecon::data::spectrum::{MzSpectrum, Peak};
    use msdecon::error::DeconvolutionError;
    use crate::error::IndexError;

    fn species_spectrum(model: &AverageResidueModel, template: usize, charges: &[u32], apex: f64) -> Vec<Peak> {
        let masses = model.theoretical_masses(template);
        let intensities = model.theoretical_intensities(template);
        let mut peaks = Vec::new();
        for &charge in charges {
            for (mass, intensity) in masses.iter().zip(intensities) {
                if *intensity >= intensities[0] * 1e-3 {
                    peaks.push(Peak::new(mass_to_mz(*mass, charge), apex * intensity / intensities[0]));
                }
            }
        }
        peaks
    }

    /// MS1 scans 1, 3, 5, ... with MS2 scans in between. One species elutes over MS1 scans 1 to 7,
    /// a second one over 11 to 15.
    fn run_scans(model: &AverageResidueModel) -> Vec<MsScan> {
        let early = model.closest_template_index(2000.0);
        let late = model.closest_template_index(3000.0);
        let mut scans = Vec::new();
        for number in 1..=16usize {
            let rt = number as f64 * 0.05;
            if number % 2 == 0 {
                scans.push(MsScan::new(number, 2, rt, MzSpectrum::new(vec![200.0, 300.0], vec![1.0, 1.0])).with_isolation(500.0, Some(20.0)));
                continue;
            }
            let mut peaks = vec![Peak::new(150.0, 1.0)];
            if number <= 7 {
                peaks.extend(species_spectrum(model, early, &[2, 3], 1000.0));
            }
            if number >= 11 {
                peaks.extend(species_spectrum(model, late, &[3, 4], 500.0));
            }
            scans.push(MsScan::new(number, 1, rt, MzSpectrum::from_peaks(&peaks).unwrap()));
        }
        scans
    }

    #[test_log::test]
    fn test_features_bridge_skipped_scans() {
        let model = AverageResidueModel::new(200);
        let scans = run_scans(&model);
        let features = deconvolute_run(&scans, |scan| scan.ms_level == 1, &model, &DeconvolutionParams::default(), &AggregationParams::default()).unwrap();

        let early_mass = model.monoisotopic_mass(model.closest_template_index(2000.0));
        let late_mass = model.monoisotopic_mass(model.closest_template_index(3000.0));

        let early = features.iter().find(|f| (f.mass - early_mass).abs() / early_mass * 1e6 < 5.0).unwrap();
        assert_eq!((early.min_scan_index, early.max_scan_index), (1, 7));
        assert_eq!(early.charge_states(), vec![2, 3]);

        let late = features.iter().find(|f| (f.mass - late_mass).abs() / late_mass * 1e6 < 5.0).unwrap();
        assert_eq!((late.min_scan_index, late.max_scan_index), (11, 15));

        // the early species is closed before the late one opens
        let early_position = features.iter().position(|f| std::ptr::eq(f, early)).unwrap();
        let late_position = features.iter().position(|f| std::ptr::eq(f, late)).unwrap();
        assert!(early_position < late_position);
    }

    #[test]
    fn test_scan_range() {
        let model = AverageResidueModel::new(200);
        let scans = run_scans(&model);
        let run = DeconvolutionRun::new(&model, &DeconvolutionParams::default(), AggregationParams::default())
            .unwrap()
            .with_scan_range(Some(3), Some(5));
        let features = run.run(&scans).unwrap();
        assert!(!features.is_empty());
        assert!(features.iter().all(|f| f.min_scan_index >= 3 && f.max_scan_index <= 5));
    }

    #[test]
    fn test_duplicate_scan_numbers_fail() {
        let model = AverageResidueModel::new(50);
        let spectrum = MzSpectrum::new(vec![500.0], vec![1.0]);
        let scans = vec![MsScan::new(4, 1, 0.1, spectrum.clone()), MsScan::new(4, 1, 0.2, spectrum)];
        let outcome = deconvolute_run(&scans, |_| true, &model, &DeconvolutionParams::default(), &AggregationParams::default());
        assert!(matches!(outcome, Err(IndexError::Deconvolution(DeconvolutionError::OutOfOrderScan { scan_index: 4, last_scan_index: 4 }))));
    }

    #[test]
    fn test_envelopes_carry_scan_number() {
        let model = AverageResidueModel::new(200);
        let scans = run_scans(&model);
        let run = DeconvolutionRun::new(&model, &DeconvolutionParams::default(), AggregationParams::default()).unwrap();

        let envelopes = run.deconvolute_scan(&scans[4]);
        assert!(!envelopes.is_empty());
        assert!(envelopes.iter().all(|e| e.scan_index == 5));
    }

    #[test]
    fn test_feature_row() {
        let envelope = IsotopicEnvelope::new(vec![Peak::new(500.0, 10.0), Peak::new(500.5, 6.0)], 997.98, 2, 0.9, 0);
        let feature = AggregatedFeature::new(envelope, 7, 1.25);
        let row = FeatureRow::from(&feature);
        assert_eq!(row.min_scan, 7);
        assert_eq!(row.charges, vec![2]);
        assert_eq!(row.envelope_count, 1);
        assert_eq!(row.peak_count, 2);
    }
}
