use std::collections::HashMap;
use std::time::Instant;
use rayon::prelude::*;

use crate::algorithm::isotope::aggregated_isotope_distribution;
use crate::chemistry::elements::{averagine_composition, monoisotopic_mass};

/// Number of templates, covering neutral masses up to roughly 83 kDa.
pub const DEFAULT_NUM_TEMPLATES: usize = 1500;

// isotope peaks below this abundance are not part of a template
const TEMPLATE_ABUNDANCE_THRESHOLD: f64 = 1e-8;
const TEMPLATE_MAX_PEAKS: usize = 200;

/// One precomputed averagine isotope pattern.
#[derive(Clone, Debug, PartialEq)]
struct Template {
    /// isotope masses, ordered by intensity descending
    masses: Vec<f64>,
    /// abundances parallel to `masses`
    intensities: Vec<f64>,
    monoisotopic_mass: f64,
}

impl Template {
    fn most_intense_mass(&self) -> f64 {
        self.masses[0]
    }
}

/// Precomputed table of averagine isotope patterns of increasing size.
///
/// Built once and shared by reference, every consumer only reads from it.
/// Template `i` is made of `(i + 1) / 2` averagine units.
#[derive(Clone, Debug, PartialEq)]
pub struct AverageResidueModel {
    templates: Vec<Template>,
    // sorted ascending, used for nearest neighbour lookup
    most_intense_masses: Vec<f64>,
    diff_to_monoisotopic: Vec<f64>,
}

impl Default for AverageResidueModel {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_TEMPLATES)
    }
}

impl AverageResidueModel {
    /// Builds `num_templates` averagine templates in parallel.
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::averagine::AverageResidueModel;
    ///
    /// let model = AverageResidueModel::new(100);
    /// assert_eq!(model.len(), 100);
    /// let index = model.closest_template_index(2000.0);
    /// assert!((model.most_intense_mass(index) - 2000.0).abs() < 60.0);
    /// ```
    pub fn new(num_templates: usize) -> Self {
        let start = Instant::now();

        let mut templates: Vec<Template> = (0..num_templates.max(1))
            .into_par_iter()
            .map(|i| build_template((i + 1) as f64 / 2.0))
            .collect();

        templates.sort_by(|a, b| a.most_intense_mass().total_cmp(&b.most_intense_mass()));

        let most_intense_masses: Vec<f64> = templates.iter().map(|t| t.most_intense_mass()).collect();
        let diff_to_monoisotopic: Vec<f64> = templates.iter().map(|t| t.most_intense_mass() - t.monoisotopic_mass).collect();

        log::debug!("built {} averagine templates in {:?}", templates.len(), start.elapsed());

        AverageResidueModel { templates, most_intense_masses, diff_to_monoisotopic }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Index of the template whose most intense isotope mass is nearest to `mass`.
    pub fn closest_template_index(&self, mass: f64) -> usize {
        let right = self.most_intense_masses.partition_point(|&m| m < mass);
        if right == 0 {
            return 0;
        }
        if right == self.most_intense_masses.len() {
            return right - 1;
        }
        if mass - self.most_intense_masses[right - 1] <= self.most_intense_masses[right] - mass {
            right - 1
        } else {
            right
        }
    }

    /// Isotope masses of a template, most intense first.
    pub fn theoretical_masses(&self, index: usize) -> &[f64] {
        &self.templates[index].masses
    }

    /// Isotope abundances of a template, parallel to [`Self::theoretical_masses`].
    pub fn theoretical_intensities(&self, index: usize) -> &[f64] {
        &self.templates[index].intensities
    }

    /// Distance from the monoisotopic mass up to the most intense isotope mass.
    pub fn monoisotopic_offset(&self, index: usize) -> f64 {
        self.diff_to_monoisotopic[index]
    }

    pub fn most_intense_mass(&self, index: usize) -> f64 {
        self.most_intense_masses[index]
    }

    pub fn monoisotopic_mass(&self, index: usize) -> f64 {
        self.templates[index].monoisotopic_mass
    }
}

fn build_template(units: f64) -> Template {
    let composition: HashMap<String, i32> = averagine_composition()
        .iter()
        .map(|&(element, per_unit)| {
            let count = (per_unit * units).round() as i32;
            // every template carries at least one carbon
            let count = if element == "C" { count.max(1) } else { count };
            (element.to_string(), count)
        })
        .collect();

    let monoisotopic = monoisotopic_mass(&composition).unwrap_or(0.0);
    let mut peaks = aggregated_isotope_distribution(&composition, TEMPLATE_ABUNDANCE_THRESHOLD, TEMPLATE_MAX_PEAKS)
        .filter(|peaks| !peaks.is_empty())
        .unwrap_or_else(|| vec![(monoisotopic, 1.0)]);

    peaks.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.total_cmp(&b.0)));
    let (masses, intensities) = peaks.into_iter().unzip();

    Template { masses, intensities, monoisotopic_mass: monoisotopic }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_sorted_by_intensity() {
        let model = AverageResidueModel::new(200);
        for i in 0..model.len() {
            let intensities = model.theoretical_intensities(i);
            assert_eq!(intensities.len(), model.theoretical_masses(i).len());
            assert!(intensities.windows(2).all(|w| w[0] >= w[1]));
            assert_eq!(model.theoretical_masses(i)[0], model.most_intense_mass(i));
        }
    }

    #[test_log::test]
    fn test_most_intense_masses_increase() {
        let model = AverageResidueModel::new(300);
        for i in 1..model.len() {
            assert!(model.most_intense_mass(i) > model.most_intense_mass(i - 1));
        }
    }

    #[test]
    fn test_small_templates_peak_at_monoisotope() {
        let model = AverageResidueModel::new(100);
        let index = model.closest_template_index(1000.0);
        assert!(model.monoisotopic_offset(index).abs() < 1e-9);
        let second = model.theoretical_intensities(index)[1] / model.theoretical_intensities(index)[0];
        assert!(second > 0.4 && second < 0.7);
    }

    #[test]
    fn test_large_templates_offset() {
        let model = AverageResidueModel::new(400);
        let index = model.closest_template_index(20000.0);
        let offset = model.monoisotopic_offset(index);
        // the most abundant isotope of a 20 kDa averagine sits about 11 Da above the monoisotope
        assert!(offset > 9.0 && offset < 14.0);
        assert!((model.most_intense_mass(index) - model.monoisotopic_mass(index) - offset).abs() < 1e-9);
    }

    #[test]
    fn test_closest_template_index_bounds() {
        let model = AverageResidueModel::new(50);
        assert_eq!(model.closest_template_index(-10.0), 0);
        assert_eq!(model.closest_template_index(1e9), model.len() - 1);
        let m = model.most_intense_mass(10);
        assert_eq!(model.closest_template_index(m), 10);
        assert_eq!(model.closest_template_index(m + 1.0), 10);
    }
}
