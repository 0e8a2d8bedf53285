use serde::{Serialize, Deserialize};

use crate::data::spectrum::MzSpectrum;
use crate::error::{DeconvolutionError, Result};

/// How intensities are scaled before two spectra are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationScheme {
    MostAbundantPeak,
    SpectrumSum,
    SquareRootSpectrumSum,
    Unnormalized,
}

impl NormalizationScheme {
    pub fn apply(&self, intensities: &[f64]) -> Vec<f64> {
        match self {
            NormalizationScheme::MostAbundantPeak => {
                let max = intensities.iter().cloned().fold(f64::MIN, f64::max);
                intensities.iter().map(|i| i / max).collect()
            }
            NormalizationScheme::SpectrumSum => {
                let sum: f64 = intensities.iter().sum();
                intensities.iter().map(|i| i / sum).collect()
            }
            NormalizationScheme::SquareRootSpectrumSum => {
                let sqrt_sum: f64 = intensities.iter().map(|i| i.sqrt()).sum();
                intensities.iter().map(|i| i.sqrt() / sqrt_sum).collect()
            }
            NormalizationScheme::Unnormalized => intensities.to_vec(),
        }
    }
}

/// Cosine of the angle between two intensity vectors, 0 if either is all zero.
///
/// # Examples
///
/// ```
/// use msdecon::algorithm::similarity::cosine;
///
/// assert!((cosine(&[1.0, 0.0], &[1.0, 1.0]) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
/// ```
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let mut numerator = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        numerator += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = norm_a * norm_b;
    if denominator == 0.0 {
        return 0.0;
    }
    (numerator / denominator.sqrt()).clamp(-1.0, 1.0)
}

/// Maps a cosine onto the normalized spectral contrast angle, 1 is identical, 0 is orthogonal.
pub fn spectral_contrast_angle(cosine: f64) -> f64 {
    1.0 - 2.0 * cosine.clamp(-1.0, 1.0).acos() / std::f64::consts::PI
}

/// Kullback-Leibler divergence of P from Q over aligned, normalized vectors.
/// Pairs where either side is zero do not contribute.
pub fn kullback_leibler(p: &[f64], q: &[f64]) -> f64 {
    p.iter().zip(q.iter())
        .filter(|&(&x, &y)| x != 0.0 && y != 0.0)
        .map(|(&x, &y)| x * (x / y).ln())
        .sum()
}

/// Pairs an experimental spectrum with a theoretical one and compares their intensities.
///
/// Pairing is greedy by intensity: theoretical peaks from most to least intense each claim the
/// most intense unclaimed experimental peak within tolerance, or pair with 0 if there is none.
#[derive(Clone, Debug)]
pub struct SpectralSimilarity {
    experimental_mz: Vec<f64>,
    experimental_intensity: Vec<f64>,
    theoretical_mz: Vec<f64>,
    theoretical_intensity: Vec<f64>,
    tolerance_ppm: f64,
    all_peaks: bool,
    intensity_pairs: Vec<(f64, f64)>,
}

impl SpectralSimilarity {
    /// Arguments:
    ///
    /// * `experimental` - observed spectrum
    /// * `theoretical` - predicted spectrum
    /// * `scheme` - normalization applied to each side
    /// * `tolerance_ppm` - pairing tolerance
    /// * `all_peaks` - keep unpaired experimental peaks as (intensity, 0) pairs
    /// * `min_mz` - peaks below this m/z are ignored
    ///
    /// # Examples
    ///
    /// ```
    /// use msdecon::algorithm::similarity::{SpectralSimilarity, NormalizationScheme};
    /// use msdecon::data::spectrum::MzSpectrum;
    ///
    /// let a = MzSpectrum::new(vec![400.0, 500.0], vec![100.0, 50.0]);
    /// let b = MzSpectrum::new(vec![400.0, 500.0], vec![2.0, 1.0]);
    /// let similarity = SpectralSimilarity::new(&a, &b, NormalizationScheme::MostAbundantPeak, 10.0, false, 300.0).unwrap();
    /// assert!((similarity.cosine_similarity().unwrap() - 1.0).abs() < 1e-12);
    /// ```
    pub fn new(
        experimental: &MzSpectrum,
        theoretical: &MzSpectrum,
        scheme: NormalizationScheme,
        tolerance_ppm: f64,
        all_peaks: bool,
        min_mz: f64,
    ) -> Result<Self> {
        let (experimental_mz, experimental_intensity) = filter_below_mz(&experimental.mz, &experimental.intensity, min_mz)?;
        let (theoretical_mz, theoretical_intensity) = filter_below_mz(&theoretical.mz, &theoretical.intensity, min_mz)?;

        let mut similarity = SpectralSimilarity {
            experimental_intensity: normalize_non_empty(&experimental_intensity, scheme),
            theoretical_intensity: normalize_non_empty(&theoretical_intensity, scheme),
            experimental_mz,
            theoretical_mz,
            tolerance_ppm,
            all_peaks,
            intensity_pairs: Vec::new(),
        };
        similarity.intensity_pairs = similarity.pair(&similarity.experimental_intensity, &similarity.theoretical_intensity, all_peaks);
        Ok(similarity)
    }

    /// (experimental, theoretical) intensity pairs.
    pub fn intensity_pairs(&self) -> &[(f64, f64)] {
        &self.intensity_pairs
    }

    fn within(&self, mz_a: f64, mz_b: f64) -> bool {
        (mz_a - mz_b).abs() / mz_a.max(mz_b) * 1e6 < self.tolerance_ppm
    }

    fn has_pairs(&self) -> bool {
        !self.intensity_pairs.is_empty()
    }

    fn pair(&self, experimental_intensity: &[f64], theoretical_intensity: &[f64], all_peaks: bool) -> Vec<(f64, f64)> {
        if self.experimental_mz.is_empty() || self.theoretical_mz.is_empty() {
            return Vec::new();
        }

        let mut experimental: Vec<(f64, f64)> = self.experimental_mz.iter().cloned().zip(experimental_intensity.iter().cloned()).collect();
        let mut theoretical: Vec<(f64, f64)> = self.theoretical_mz.iter().cloned().zip(theoretical_intensity.iter().cloned()).collect();
        experimental.sort_by(|a, b| b.1.total_cmp(&a.1));
        theoretical.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut pairs = Vec::with_capacity(theoretical.len());
        for (mz, intensity) in theoretical {
            match experimental.iter().position(|&(exp_mz, _)| self.within(exp_mz, mz)) {
                Some(index) => {
                    let (_, exp_intensity) = experimental.remove(index);
                    pairs.push((exp_intensity, intensity));
                }
                None => pairs.push((0.0, intensity)),
            }
        }

        if all_peaks {
            pairs.extend(experimental.into_iter().map(|(_, exp_intensity)| (exp_intensity, 0.0)));
        }
        pairs
    }

    fn unzip_pairs(&self) -> (Vec<f64>, Vec<f64>) {
        self.intensity_pairs.iter().cloned().unzip()
    }

    pub fn cosine_similarity(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        let (experimental, theoretical) = self.unzip_pairs();
        Some(cosine(&experimental, &theoretical))
    }

    pub fn spectral_contrast_angle(&self) -> Option<f64> {
        self.cosine_similarity().map(spectral_contrast_angle)
    }

    pub fn euclidean_distance(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        let sum: f64 = self.intensity_pairs.iter().map(|(a, b)| (a - b).powi(2)).sum();
        Some(1.0 - sum.sqrt())
    }

    pub fn bray_curtis(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        let numerator: f64 = self.intensity_pairs.iter().map(|(a, b)| (a - b).abs()).sum();
        let denominator: f64 = self.intensity_pairs.iter().map(|(a, b)| a + b).sum();
        Some(1.0 - numerator / denominator)
    }

    /// Pearson correlation of the paired intensities, -1 when either side has no variance.
    pub fn pearsons_correlation(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        let n = self.intensity_pairs.len() as f64;
        let mean_a = self.intensity_pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
        let mean_b = self.intensity_pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator_a = 0.0;
        let mut denominator_b = 0.0;
        for (a, b) in &self.intensity_pairs {
            numerator += (a - mean_a) * (b - mean_b);
            denominator_a += (a - mean_a).powi(2);
            denominator_b += (b - mean_b).powi(2);
        }
        let denominator = denominator_a * denominator_b;
        if denominator > 0.0 { Some(numerator / denominator.sqrt()) } else { Some(-1.0) }
    }

    pub fn dot_product(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        Some(self.intensity_pairs.iter().map(|(a, b)| a * b).sum())
    }

    /// Entropy similarity, meant for sum-normalized spectra compared with `all_peaks`.
    pub fn spectral_entropy(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        let theoretical = entropy(self.theoretical_intensity.iter().cloned());
        let experimental = entropy(self.experimental_intensity.iter().cloned());
        let combined = entropy(self.intensity_pairs.iter().map(|(a, b)| a / 2.0 + b / 2.0));
        Some(1.0 - (2.0 * combined - theoretical - experimental) / 4f64.ln())
    }

    /// Kullback-Leibler divergence P (experimental) from Q (theoretical), lower is more similar.
    ///
    /// When any pair has a zero side, `correction` is added to every intensity and both sides are
    /// renormalized to sum one before re-pairing. `None` when no peak is shared at all.
    pub fn kullback_leibler_divergence(&self, correction: f64) -> Option<f64> {
        let zero_count = self.intensity_pairs.iter().filter(|(a, b)| *a == 0.0 || *b == 0.0).count();
        if zero_count == self.intensity_pairs.len() {
            return None;
        }

        if zero_count == 0 {
            let (p, q) = self.unzip_pairs();
            return Some(kullback_leibler(&p, &q));
        }

        let corrected = |values: &[f64]| -> Vec<f64> {
            let shifted: Vec<f64> = values.iter().map(|v| v + correction).collect();
            NormalizationScheme::SpectrumSum.apply(&shifted)
        };
        let pairs = self.pair(&corrected(&self.experimental_intensity), &corrected(&self.theoretical_intensity), true);
        let (p, q): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        Some(kullback_leibler(&p, &q))
    }

    /// Searle similarity, `ln(1 / sum of squared differences)`, meant for square root normalization.
    pub fn searle_similarity(&self) -> Option<f64> {
        if !self.has_pairs() {
            return None;
        }
        let squared: f64 = self.intensity_pairs.iter().map(|(a, b)| (a - b).powi(2)).sum();
        if squared > 0.0 { Some(squared.recip().ln()) } else { Some(f64::MAX) }
    }

    pub fn all_peaks(&self) -> bool {
        self.all_peaks
    }
}

fn filter_below_mz(mz: &[f64], intensity: &[f64], min_mz: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    if intensity.is_empty() || intensity.iter().sum::<f64>() == 0.0 {
        return Err(DeconvolutionError::EmptySpectrum);
    }
    Ok(mz.iter().zip(intensity.iter())
        .filter(|&(&m, &i)| m >= min_mz && i >= 0.0)
        .map(|(&m, &i)| (m, i))
        .unzip())
}

fn entropy<I: Iterator<Item = f64>>(values: I) -> f64 {
    values.filter(|&v| v > 0.0).map(|v| -v * v.ln()).sum()
}

fn normalize_non_empty(intensities: &[f64], scheme: NormalizationScheme) -> Vec<f64> {
    if intensities.is_empty() {
        return Vec::new();
    }
    scheme.apply(intensities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra() -> (MzSpectrum, MzSpectrum) {
        let experimental = MzSpectrum::new(vec![400.0, 500.0, 600.0, 700.0], vec![80.0, 100.0, 20.0, 5.0]);
        let theoretical = MzSpectrum::new(vec![400.0, 500.0, 650.0], vec![0.8, 1.0, 0.3]);
        (experimental, theoretical)
    }

    #[test]
    fn test_pairs_fill_missing_with_zero() {
        let (e, t) = spectra();
        let similarity = SpectralSimilarity::new(&e, &t, NormalizationScheme::MostAbundantPeak, 10.0, false, 300.0).unwrap();
        assert_eq!(similarity.intensity_pairs(), &[(1.0, 1.0), (0.8, 0.8), (0.0, 0.3)]);

        let all = SpectralSimilarity::new(&e, &t, NormalizationScheme::MostAbundantPeak, 10.0, true, 300.0).unwrap();
        assert_eq!(all.intensity_pairs().len(), 5);
        assert_eq!(all.intensity_pairs()[3], (0.2, 0.0));
    }

    #[test]
    fn test_identical_spectra_metrics() {
        let e = MzSpectrum::new(vec![400.0, 500.0, 600.0], vec![30.0, 60.0, 10.0]);
        let similarity = SpectralSimilarity::new(&e, &e, NormalizationScheme::SpectrumSum, 10.0, true, 300.0).unwrap();
        assert!((similarity.cosine_similarity().unwrap() - 1.0).abs() < 1e-12);
        assert!((similarity.spectral_contrast_angle().unwrap() - 1.0).abs() < 1e-6);
        assert!((similarity.euclidean_distance().unwrap() - 1.0).abs() < 1e-12);
        assert!((similarity.bray_curtis().unwrap() - 1.0).abs() < 1e-12);
        assert!((similarity.pearsons_correlation().unwrap() - 1.0).abs() < 1e-12);
        assert!((similarity.spectral_entropy().unwrap() - 1.0).abs() < 1e-12);
        assert!(similarity.kullback_leibler_divergence(1e-9).unwrap().abs() < 1e-12);
        assert_eq!(similarity.searle_similarity(), Some(f64::MAX));
    }

    #[test]
    fn test_kullback_leibler_with_missing_peak_is_positive() {
        let (e, t) = spectra();
        let similarity = SpectralSimilarity::new(&e, &t, NormalizationScheme::SpectrumSum, 10.0, true, 300.0).unwrap();
        let divergence = similarity.kullback_leibler_divergence(1e-9).unwrap();
        assert!(divergence > 0.0);
    }

    #[test]
    fn test_no_peaks_above_cutoff() {
        let e = MzSpectrum::new(vec![100.0, 200.0], vec![1.0, 2.0]);
        let similarity = SpectralSimilarity::new(&e, &e, NormalizationScheme::Unnormalized, 10.0, false, 300.0).unwrap();
        assert_eq!(similarity.cosine_similarity(), None);
        assert_eq!(similarity.dot_product(), None);
        assert_eq!(similarity.kullback_leibler_divergence(1e-9), None);
    }

    #[test]
    fn test_empty_spectrum_is_an_error() {
        let e = MzSpectrum::new(vec![], vec![]);
        let t = MzSpectrum::new(vec![400.0], vec![1.0]);
        assert!(SpectralSimilarity::new(&e, &t, NormalizationScheme::Unnormalized, 10.0, false, 0.0).is_err());
        let zeros = MzSpectrum::new(vec![400.0], vec![0.0]);
        assert!(SpectralSimilarity::new(&zeros, &t, NormalizationScheme::Unnormalized, 10.0, false, 0.0).is_err());
    }

    #[test]
    fn test_contrast_angle_orthogonal() {
        assert!(spectral_contrast_angle(cosine(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-12);
    }
}
