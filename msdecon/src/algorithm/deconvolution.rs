use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use ordered_float::OrderedFloat;

use crate::algorithm::averagine::AverageResidueModel;
use crate::algorithm::scoring::ScoringEngine;
use crate::chemistry::constants::{mass_to_mz, mz_to_mass, ppm_error};
use crate::data::envelope::IsotopicEnvelope;
use crate::data::spectrum::{MzSpectrum, Peak};
use crate::error::Result;
use crate::params::DeconvolutionParams;

// peaks further apart than this cannot be neighbouring isotopes of one envelope
const MAX_ISOTOPE_SPACING: f64 = 1.1;

/// Extra predicate a seed peak has to pass before it is tried.
pub type PeakFilter = Arc<dyn Fn(&Peak) -> bool + Send + Sync>;

/// Closed m/z interval a deconvolution is restricted to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MzRange {
    pub min: f64,
    pub max: f64,
}

impl MzRange {
    pub fn new(min: f64, max: f64) -> Self {
        MzRange { min, max }
    }

    /// The whole spectrum.
    pub fn full() -> Self {
        MzRange { min: 0.0, max: f64::INFINITY }
    }

    pub fn contains(&self, mz: f64) -> bool {
        self.min <= mz && mz <= self.max
    }
}

/// Peaks matched by one walk through a template.
struct EnvelopeWalk {
    peaks: Vec<Peak>,
    theoretical_intensities: Vec<f64>,
    monoisotopic_mass: f64,
}

/// Assigns charge and monoisotopic mass to isotope envelopes by fitting averagine templates.
///
/// Every peak of the requested range is tried as the most intense isotope of an envelope
/// under each charge that the spacing of its right neighbours allows.
#[derive(Clone)]
pub struct ClassicDeconvoluter<'a> {
    model: &'a AverageResidueModel,
    scorer: ScoringEngine,
    min_charge: u32,
    max_charge: u32,
    tolerance_ppm: f64,
    intensity_ratio_limit: f64,
    min_relative_intensity: f64,
    require_charge_state_support: bool,
    peak_filter: Option<PeakFilter>,
}

impl<'a> ClassicDeconvoluter<'a> {
    /// Checks the charge range and selects the scoring engine.
    ///
    /// Arguments:
    ///
    /// * `model` - averagine templates, shared read only
    /// * `params` - charge range, tolerances and scoring method
    ///
    /// Returns:
    ///
    /// * `Result<ClassicDeconvoluter>` - fails for a non-positive or inverted charge range and
    ///   for scoring methods that cannot rank envelopes
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::averagine::AverageResidueModel;
    /// use msdecon::algorithm::deconvolution::{ClassicDeconvoluter, MzRange};
    /// use msdecon::data::spectrum::MzSpectrum;
    /// use msdecon::params::DeconvolutionParams;
    ///
    /// let model = AverageResidueModel::new(100);
    /// let params = DeconvolutionParams::default().with_charge_range(1, 4).with_tolerance_ppm(10.0);
    /// let deconvoluter = ClassicDeconvoluter::new(&model, &params).unwrap();
    /// let spectrum = MzSpectrum::new(vec![500.0, 500.5, 501.0], vec![100.0, 60.0, 20.0]);
    /// let envelopes = deconvoluter.deconvolute_resolved(&spectrum, MzRange::full());
    /// assert_eq!(envelopes[0].charge, 2);
    /// ```
    pub fn new(model: &'a AverageResidueModel, params: &DeconvolutionParams) -> Result<Self> {
        let (min_charge, max_charge) = params.charge_range()?;
        let scorer = ScoringEngine::new(params.scoring_method)?;

        Ok(ClassicDeconvoluter {
            model,
            scorer,
            min_charge,
            max_charge,
            tolerance_ppm: params.tolerance_ppm,
            intensity_ratio_limit: params.intensity_ratio_limit,
            min_relative_intensity: params.min_relative_intensity,
            require_charge_state_support: params.require_charge_state_support,
            peak_filter: None,
        })
    }

    pub fn with_peak_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Peak) -> bool + Send + Sync + 'static,
    {
        self.peak_filter = Some(Arc::new(filter));
        self
    }

    pub fn scorer(&self) -> ScoringEngine {
        self.scorer
    }

    /// Best envelope hypothesis of every seed peak, best score first.
    ///
    /// Hypotheses of different seeds may share peaks, see [`Self::deconvolute_resolved`].
    pub fn deconvolute(&self, spectrum: &MzSpectrum, range: MzRange) -> Vec<IsotopicEnvelope> {
        if spectrum.is_empty() {
            return Vec::new();
        }

        let (start, end) = spectrum.index_range(range.min, range.max);
        if start >= end {
            return Vec::new();
        }

        let base_intensity = spectrum.intensity[start..end].iter().cloned().fold(0.0, f64::max);
        let intensity_floor = base_intensity * self.min_relative_intensity;

        let mut envelopes: Vec<IsotopicEnvelope> = Vec::new();

        for seed_index in start..end {
            let seed = spectrum.peak(seed_index);
            if seed.intensity < intensity_floor || seed.intensity <= 0.0 {
                continue;
            }
            if let Some(filter) = &self.peak_filter {
                if !filter(&seed) {
                    continue;
                }
            }

            if let Some(envelope) = self.best_envelope_for_seed(spectrum, seed_index) {
                envelopes.push(envelope);
            }
        }

        let scorer = self.scorer;
        envelopes.sort_by(|a, b| {
            scorer.compare_best_first(a.score, b.score)
                .then(b.total_intensity.total_cmp(&a.total_intensity))
        });

        log::trace!("{} envelope hypotheses in [{}, {}]", envelopes.len(), range.min, range.max);

        envelopes
    }

    /// Like [`Self::deconvolute`], but drops every envelope that shares a peak with a better one.
    pub fn deconvolute_resolved(&self, spectrum: &MzSpectrum, range: MzRange) -> Vec<IsotopicEnvelope> {
        let mut claimed: HashSet<OrderedFloat<f64>> = HashSet::new();
        let mut resolved = Vec::new();

        for envelope in self.deconvolute(spectrum, range) {
            if envelope.peaks.iter().any(|p| claimed.contains(&OrderedFloat(p.mz))) {
                continue;
            }
            claimed.extend(envelope.peaks.iter().map(|p| OrderedFloat(p.mz)));
            resolved.push(envelope);
        }

        resolved
    }

    /// Charges suggested by the right neighbours of a peak within one isotope spacing.
    fn candidate_charges(&self, spectrum: &MzSpectrum, seed_index: usize) -> BTreeSet<u32> {
        let seed_mz = spectrum.mz[seed_index];
        let mut charges = BTreeSet::new();

        for &mz in &spectrum.mz[seed_index + 1..] {
            let delta = mz - seed_mz;
            if delta >= MAX_ISOTOPE_SPACING {
                break;
            }
            if delta <= 0.0 {
                continue;
            }

            let lower = (1.0 / delta).floor() as u32;
            for charge in [lower, lower.saturating_add(1)] {
                if charge >= self.min_charge && charge <= self.max_charge {
                    charges.insert(charge);
                }
            }
        }

        charges
    }

    fn best_envelope_for_seed(&self, spectrum: &MzSpectrum, seed_index: usize) -> Option<IsotopicEnvelope> {
        let seed = spectrum.peak(seed_index);
        let mut best: Option<IsotopicEnvelope> = None;

        for charge in self.candidate_charges(spectrum, seed_index) {
            let test_mass = mz_to_mass(seed.mz, charge);
            let template = self.model.closest_template_index(test_mass);

            let mut predictions = Vec::new();
            let walk = self.walk_envelope(spectrum, template, seed, test_mass, charge, &mut predictions);
            if walk.peaks.len() < 2 {
                continue;
            }

            let adjacent = self.observe_adjacent_charge_states(spectrum, template, test_mass, charge, &mut predictions);

            // z = 5 needs one supporting charge state, z = 10 two
            if self.require_charge_state_support && (charge / 5) as usize > adjacent {
                continue;
            }

            let observed: Vec<f64> = walk.peaks.iter().map(|p| p.intensity).collect();
            let score = self.scorer.score(&observed, &walk.theoretical_intensities);

            let improves = match &best {
                None => true,
                Some(current) => self.scorer.is_better(score, current.score).0,
            };

            if improves {
                let mut envelope = IsotopicEnvelope::new(walk.peaks, walk.monoisotopic_mass, charge, score, template);
                envelope.charge_states_observed = adjacent;
                envelope.set_median_monoisotopic_mass(&predictions);
                best = Some(envelope);
            }
        }

        best
    }

    /// Walks the template peaks in intensity order, stopping at the first one that is not observed.
    /// Every matched peak adds one monoisotopic mass prediction.
    fn walk_envelope(
        &self,
        spectrum: &MzSpectrum,
        template: usize,
        seed: Peak,
        test_mass: f64,
        charge: u32,
        predictions: &mut Vec<f64>,
    ) -> EnvelopeWalk {
        let masses = self.model.theoretical_masses(template);
        let intensities = self.model.theoretical_intensities(template);

        let shift = test_mass - masses[0];
        let monoisotopic_mass = test_mass - self.model.monoisotopic_offset(template);
        predictions.push(monoisotopic_mass);

        let mut peaks = vec![seed];
        let mut theoretical_intensities = vec![intensities[0]];

        for k in 1..masses.len() {
            let target_mass = masses[k] + shift;
            let candidate = match spectrum.closest_peak_index(mass_to_mz(target_mass, charge)) {
                Some(index) => spectrum.peak(index),
                None => break,
            };
            let observed_mass = mz_to_mass(candidate.mz, charge);

            let accepted = ppm_error(observed_mass, target_mass) <= self.tolerance_ppm
                && satisfies_ratio(intensities[0], intensities[k], seed.intensity, candidate.intensity, self.intensity_ratio_limit)
                && !peaks.contains(&candidate);

            if !accepted {
                break;
            }

            peaks.push(candidate);
            theoretical_intensities.push(intensities[k]);
            predictions.push(monoisotopic_mass + observed_mass - target_mass);
        }

        EnvelopeWalk { peaks, theoretical_intensities, monoisotopic_mass }
    }

    /// Counts contiguous charge states below and above `charge` that show the same mass.
    fn observe_adjacent_charge_states(
        &self,
        spectrum: &MzSpectrum,
        template: usize,
        most_abundant_mass: f64,
        charge: u32,
        predictions: &mut Vec<f64>,
    ) -> usize {
        let mut observed = 0;

        for lower in (self.min_charge..charge).rev() {
            if !self.observe_charge_state(spectrum, template, most_abundant_mass, lower, predictions) {
                break;
            }
            observed += 1;
        }

        for higher in charge.saturating_add(1)..=self.max_charge {
            if !self.observe_charge_state(spectrum, template, most_abundant_mass, higher, predictions) {
                break;
            }
            observed += 1;
        }

        observed
    }

    fn observe_charge_state(
        &self,
        spectrum: &MzSpectrum,
        template: usize,
        most_abundant_mass: f64,
        charge: u32,
        predictions: &mut Vec<f64>,
    ) -> bool {
        let peak = match spectrum.closest_peak_index(mass_to_mz(most_abundant_mass, charge)) {
            Some(index) => spectrum.peak(index),
            None => return false,
        };

        let observed_mass = mz_to_mass(peak.mz, charge);
        if ppm_error(observed_mass, most_abundant_mass) > self.tolerance_ppm {
            return false;
        }

        let before = predictions.len();
        let walk = self.walk_envelope(spectrum, template, peak, observed_mass, charge, predictions);
        if walk.peaks.len() >= 2 {
            true
        } else {
            predictions.truncate(before);
            false
        }
    }
}

/// Whether a second isotope intensity is within `ratio_limit` of what the first one predicts.
fn satisfies_ratio(first_theoretical: f64, second_theoretical: f64, first_observed: f64, second_observed: f64, ratio_limit: f64) -> bool {
    let expected = first_observed / first_theoretical * second_theoretical;
    second_observed >= expected / ratio_limit && second_observed <= expected * ratio_limit
}

/// Deconvolutes one spectrum with a throwaway deconvoluter.
///
/// # Examples
///
/// ```
/// use msdecon::algorithm::averagine::AverageResidueModel;
/// use msdecon::algorithm::deconvolution::{deconvolute, MzRange};
/// use msdecon::data::spectrum::MzSpectrum;
/// use msdecon::params::DeconvolutionParams;
///
/// let model = AverageResidueModel::new(50);
/// let spectrum = MzSpectrum::new(vec![], vec![]);
/// let envelopes = deconvolute(&spectrum, MzRange::full(), &model, &DeconvolutionParams::default()).unwrap();
/// assert!(envelopes.is_empty());
/// assert!(deconvolute(&spectrum, MzRange::full(), &model, &DeconvolutionParams::default().with_charge_range(3, 2)).is_err());
/// ```
pub fn deconvolute(
    spectrum: &MzSpectrum,
    range: MzRange,
    model: &AverageResidueModel,
    params: &DeconvolutionParams,
) -> Result<Vec<IsotopicEnvelope>> {
    Ok(ClassicDeconvoluter::new(model, params)?.deconvolute(spectrum, range))
}
