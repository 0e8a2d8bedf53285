use std::collections::HashMap;

use crate::chemistry::elements::{atoms_isotopic_weights, isotopic_abundance};

/// convolve two aggregated isotope distributions
///
/// Entry `k` of an aggregated distribution holds the k-th nominal isotope peak as
/// (abundance-weighted mean mass, abundance), so peaks combine by index instead of by mass.
///
/// Arguments:
///
/// * `dist_a` - first distribution of masses and abundances
/// * `dist_b` - second distribution of masses and abundances
/// * `abundance_threshold` - trailing peaks below this fraction of the most abundant peak are dropped
/// * `max_results` - maximum number of peaks to include in the result
///
/// Returns:
///
/// * `Vec<(f64, f64)>` - combined distribution of masses and abundances
///
/// # Examples
///
/// ```
/// use msdecon::algorithm::isotope::convolve_aggregated;
///
/// let dist_a = vec![(100.0, 0.5), (101.0, 0.5)];
/// let dist_b = vec![(100.0, 0.5), (101.0, 0.5)];
/// let result = convolve_aggregated(&dist_a, &dist_b, 1e-12, 200);
/// assert_eq!(result, vec![(200.0, 0.25), (201.0, 0.5), (202.0, 0.25)]);
/// ```
pub fn convolve_aggregated(dist_a: &[(f64, f64)], dist_b: &[(f64, f64)], abundance_threshold: f64, max_results: usize) -> Vec<(f64, f64)> {
    if dist_a.is_empty() || dist_b.is_empty() {
        return Vec::new();
    }

    let len = (dist_a.len() + dist_b.len() - 1).min(max_results.max(1));
    let mut mass_sum = vec![0.0; len];
    let mut abundance = vec![0.0; len];

    for (i, (mass_a, abundance_a)) in dist_a.iter().enumerate() {
        if i >= len {
            break;
        }
        for (j, (mass_b, abundance_b)) in dist_b.iter().enumerate() {
            let k = i + j;
            if k >= len {
                break;
            }
            let combined = abundance_a * abundance_b;
            abundance[k] += combined;
            mass_sum[k] += combined * (mass_a + mass_b);
        }
    }

    let max_abundance = abundance.iter().cloned().fold(0.0, f64::max);
    let mut result: Vec<(f64, f64)> = mass_sum.into_iter().zip(abundance)
        .map(|(sum, ab)| if ab > 0.0 { (sum / ab, ab) } else { (0.0, 0.0) })
        .collect();

    // leading peaks stay, their index is the nominal shift
    while result.len() > 1 && result.last().map_or(false, |&(_, ab)| ab < abundance_threshold * max_abundance) {
        result.pop();
    }

    result
}

/// convolve an aggregated distribution with itself n times, by repeated squaring
///
/// # Examples
///
/// ```
/// use msdecon::algorithm::isotope::convolve_pow_aggregated;
///
/// let dist = vec![(100.0, 0.5), (101.0, 0.5)];
/// let result = convolve_pow_aggregated(&dist, 2, 1e-12, 200);
/// assert_eq!(result, vec![(200.0, 0.25), (201.0, 0.5), (202.0, 0.25)]);
/// ```
pub fn convolve_pow_aggregated(dist: &[(f64, f64)], n: u32, abundance_threshold: f64, max_results: usize) -> Vec<(f64, f64)> {
    let mut result = vec![(0.0, 1.0)]; // the delta distribution
    let mut base = dist.to_vec();
    let mut exponent = n;

    while exponent > 0 {
        if exponent & 1 == 1 {
            result = convolve_aggregated(&result, &base, abundance_threshold, max_results);
        }
        exponent >>= 1;
        if exponent > 0 {
            base = convolve_aggregated(&base, &base, abundance_threshold, max_results);
        }
    }

    result
}

/// aggregate the isotopes of one element into nominal bins relative to its lightest isotope
fn element_distribution(weights: &[f64], abundances: &[f64]) -> Vec<(f64, f64)> {
    let lightest = weights.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut bins: Vec<(f64, f64)> = Vec::new();

    for (&mass, &abundance) in weights.iter().zip(abundances.iter()) {
        let shift = (mass - lightest).round() as usize;
        if bins.len() <= shift {
            bins.resize(shift + 1, (0.0, 0.0));
        }
        bins[shift].0 += mass * abundance;
        bins[shift].1 += abundance;
    }

    bins.into_iter().map(|(sum, ab)| if ab > 0.0 { (sum / ab, ab) } else { (0.0, 0.0) }).collect()
}

/// generate the aggregated isotope distribution for a given atomic composition
///
/// Arguments:
///
/// * `atomic_composition` - element symbol to atom count
/// * `abundance_threshold` - peaks below this normalized abundance are removed from the result
/// * `max_result` - maximum number of nominal peaks to carry through the convolution
///
/// Returns:
///
/// * `Option<Vec<(f64, f64)>>` - masses and abundances sorted by mass and summing to one,
///   `None` if the composition names an element without isotope data
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use msdecon::algorithm::isotope::aggregated_isotope_distribution;
///
/// let mut atomic_composition = HashMap::new();
/// atomic_composition.insert("C".to_string(), 5);
/// atomic_composition.insert("H".to_string(), 9);
/// atomic_composition.insert("N".to_string(), 1);
/// atomic_composition.insert("O".to_string(), 1);
/// let result = aggregated_isotope_distribution(&atomic_composition, 1e-8, 200).unwrap();
/// assert!((result[0].0 - 99.068413).abs() < 1e-5);
/// assert!(result[0].1 > result[1].1);
/// ```
pub fn aggregated_isotope_distribution(
    atomic_composition: &HashMap<String, i32>,
    abundance_threshold: f64,
    max_result: usize,
) -> Option<Vec<(f64, f64)>> {

    let weights = atoms_isotopic_weights();
    let abundances = isotopic_abundance();
    let mut cumulative_distribution = vec![(0.0, 1.0)];

    // fixed element order keeps the floating point result independent of map iteration
    let mut elements: Vec<(&String, &i32)> = atomic_composition.iter().filter(|&(_, &count)| count > 0).collect();
    elements.sort();

    for (element, &count) in elements {
        let element_weights = weights.get(element.as_str())?;
        let element_abundance = abundances.get(element.as_str())?;
        let distribution = element_distribution(element_weights, element_abundance);
        let element_power = convolve_pow_aggregated(&distribution, count as u32, abundance_threshold * 1e-4, max_result);
        cumulative_distribution = convolve_aggregated(&cumulative_distribution, &element_power, abundance_threshold * 1e-4, max_result);
    }

    let total_abundance: f64 = cumulative_distribution.iter().map(|&(_, abundance)| abundance).sum();
    if total_abundance <= 0.0 {
        return None;
    }

    Some(cumulative_distribution.into_iter()
        .map(|(mass, abundance)| (mass, abundance / total_abundance))
        .filter(|&(_, abundance)| abundance >= abundance_threshold)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_distribution_bins_oxygen() {
        let dist = element_distribution(&[15.99491461957, 16.99913175650, 17.99915961286], &[0.99757, 0.00038, 0.00205]);
        assert_eq!(dist.len(), 3);
        assert!((dist[2].0 - 17.99915961286).abs() < 1e-9);
    }

    #[test]
    fn test_power_matches_repeated_convolution() {
        let dist = vec![(12.0, 0.9893), (13.00335483507, 0.0107)];
        let pow = convolve_pow_aggregated(&dist, 5, 0.0, 200);
        let mut manual = vec![(0.0, 1.0)];
        for _ in 0..5 {
            manual = convolve_aggregated(&manual, &dist, 0.0, 200);
        }
        assert_eq!(pow.len(), manual.len());
        for (a, b) in pow.iter().zip(manual.iter()) {
            assert!((a.0 - b.0).abs() < 1e-9);
            assert!((a.1 - b.1).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unknown_element() {
        let composition: HashMap<String, i32> = [("Xx".to_string(), 2)].into_iter().collect();
        assert!(aggregated_isotope_distribution(&composition, 1e-8, 200).is_none());
    }

    #[test]
    fn test_distribution_is_normalized() {
        let composition: HashMap<String, i32> = [("C".to_string(), 250), ("H".to_string(), 400), ("N".to_string(), 70), ("O".to_string(), 75), ("S".to_string(), 2)].into_iter().collect();
        let dist = aggregated_isotope_distribution(&composition, 1e-12, 200).unwrap();
        let total: f64 = dist.iter().map(|(_, a)| a).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // peaks are roughly one Dalton apart
        for w in dist.windows(2) {
            assert!((w[1].0 - w[0].0 - 1.0).abs() < 0.01);
        }
    }
}
