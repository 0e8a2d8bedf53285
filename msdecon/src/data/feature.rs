use std::fmt;
use std::fmt::{Display, Formatter};
use bincode::{Decode, Encode};
use itertools::Itertools;
use serde::{Serialize, Deserialize};

use crate::chemistry::constants::ppm_error;
use crate::data::envelope::{median, IsotopicEnvelope};

/// Envelopes of a feature whose masses agree within the subgroup tolerance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MassSubgroup {
    /// median of `masses`
    pub mass: f64,
    pub masses: Vec<f64>,
    pub peak_count: usize,
    pub total_intensity: f64,
    /// distinct charges, ascending
    pub charges: Vec<u32>,
}

impl MassSubgroup {
    fn new(envelope: &IsotopicEnvelope) -> Self {
        MassSubgroup {
            mass: envelope.monoisotopic_mass,
            masses: vec![envelope.monoisotopic_mass],
            peak_count: envelope.peak_count(),
            total_intensity: envelope.total_intensity,
            charges: vec![envelope.charge],
        }
    }

    fn add(&mut self, envelope: &IsotopicEnvelope) {
        self.masses.push(envelope.monoisotopic_mass);
        self.mass = median(&self.masses).unwrap_or(self.mass);
        self.peak_count += envelope.peak_count();
        self.total_intensity += envelope.total_intensity;
        if let Err(position) = self.charges.binary_search(&envelope.charge) {
            self.charges.insert(position, envelope.charge);
        }
    }
}

/// Envelopes of one species collected over consecutive scans.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct AggregatedFeature {
    /// mass of the subgroup with the most peaks
    pub mass: f64,
    pub min_scan_index: usize,
    pub max_scan_index: usize,
    pub min_elution_time: f64,
    pub max_elution_time: f64,
    pub total_intensity: f64,
    pub peak_count: usize,
    pub envelopes: Vec<IsotopicEnvelope>,
    pub subgroups: Vec<MassSubgroup>,
}

impl AggregatedFeature {
    pub fn new(envelope: IsotopicEnvelope, scan_index: usize, elution_time: f64) -> Self {
        let envelope = envelope.with_scan_index(scan_index);
        AggregatedFeature {
            mass: envelope.monoisotopic_mass,
            min_scan_index: scan_index,
            max_scan_index: scan_index,
            min_elution_time: elution_time,
            max_elution_time: elution_time,
            total_intensity: envelope.total_intensity,
            peak_count: envelope.peak_count(),
            subgroups: vec![MassSubgroup::new(&envelope)],
            envelopes: vec![envelope],
        }
    }

    /// Adds an envelope and recomputes the feature mass from its subgroups.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::data::envelope::IsotopicEnvelope;
    /// use msdecon::data::feature::AggregatedFeature;
    /// use msdecon::data::spectrum::Peak;
    ///
    /// let envelope = |mass: f64, n: usize| IsotopicEnvelope::new(vec![Peak::new(500.0, 10.0); n], mass, 2, 0.9, 0);
    /// let mut feature = AggregatedFeature::new(envelope(1000.0, 2), 1, 0.5);
    /// feature.add_envelope(envelope(1001.002868314, 5), 2, 0.6, 5.0);
    /// assert_eq!(feature.subgroups.len(), 2);
    /// assert_eq!(feature.mass, 1001.002868314);
    /// assert_eq!(feature.max_scan_index, 2);
    /// ```
    pub fn add_envelope(&mut self, envelope: IsotopicEnvelope, scan_index: usize, elution_time: f64, subgroup_tolerance_ppm: f64) {
        let envelope = envelope.with_scan_index(scan_index);

        self.min_scan_index = self.min_scan_index.min(scan_index);
        self.max_scan_index = self.max_scan_index.max(scan_index);
        self.min_elution_time = self.min_elution_time.min(elution_time);
        self.max_elution_time = self.max_elution_time.max(elution_time);
        self.total_intensity += envelope.total_intensity;
        self.peak_count += envelope.peak_count();

        match self.subgroups.iter_mut().find(|group| ppm_error(envelope.monoisotopic_mass, group.mass) <= subgroup_tolerance_ppm) {
            Some(group) => group.add(&envelope),
            None => self.subgroups.push(MassSubgroup::new(&envelope)),
        }

        // first subgroup wins ties
        let mut best = &self.subgroups[0];
        for group in &self.subgroups[1..] {
            if group.peak_count > best.peak_count {
                best = group;
            }
        }
        self.mass = best.mass;

        self.envelopes.push(envelope);
    }

    /// Distinct charges over all envelopes, ascending.
    pub fn charge_states(&self) -> Vec<u32> {
        self.envelopes.iter().map(|e| e.charge).sorted_unstable().dedup().collect()
    }

    pub fn scan_count(&self) -> usize {
        self.max_scan_index - self.min_scan_index + 1
    }
}

impl Display for AggregatedFeature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AggregatedFeature(mass: {:.4}, scans: {}-{}, rt: {:.3}-{:.3}, envelopes: {}, intensity: {:.1})",
               self.mass, self.min_scan_index, self.max_scan_index, self.min_elution_time, self.max_elution_time,
               self.envelopes.len(), self.total_intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spectrum::Peak;

    fn envelope(mass: f64, charge: u32, n: usize) -> IsotopicEnvelope {
        IsotopicEnvelope::new(vec![Peak::new(600.0, 5.0); n], mass, charge, 0.8, 0)
    }

    #[test]
    fn test_subgroup_median_and_charges() {
        let mut feature = AggregatedFeature::new(envelope(5000.0, 5, 3), 10, 1.0);
        feature.add_envelope(envelope(5000.01, 6, 3), 11, 1.1, 5.0);
        feature.add_envelope(envelope(5000.02, 5, 3), 12, 1.2, 5.0);

        assert_eq!(feature.subgroups.len(), 1);
        assert_eq!(feature.subgroups[0].mass, 5000.01);
        assert_eq!(feature.subgroups[0].charges, vec![5, 6]);
        assert_eq!(feature.mass, 5000.01);
        assert_eq!(feature.peak_count, 9);
        assert_eq!(feature.total_intensity, 45.0);
        assert_eq!(feature.scan_count(), 3);
        assert_eq!(feature.envelopes[2].scan_index, 12);
    }

    #[test]
    fn test_first_subgroup_wins_ties() {
        let mut feature = AggregatedFeature::new(envelope(5000.0, 5, 2), 1, 1.0);
        feature.add_envelope(envelope(5001.002868314, 5, 2), 1, 1.0, 5.0);
        assert_eq!(feature.subgroups.len(), 2);
        assert_eq!(feature.mass, 5000.0);
        feature.add_envelope(envelope(5001.003, 5, 1), 2, 1.1, 5.0);
        assert!((feature.mass - 5001.0029).abs() < 1e-3);
        assert_eq!(feature.charge_states(), vec![5]);
    }

    #[test]
    fn test_elution_range() {
        let mut feature = AggregatedFeature::new(envelope(800.0, 1, 2), 4, 2.0);
        feature.add_envelope(envelope(800.0, 2, 2), 6, 2.4, 5.0);
        assert!(feature.min_scan_index <= feature.max_scan_index);
        assert_eq!((feature.min_elution_time, feature.max_elution_time), (2.0, 2.4));
    }
}
