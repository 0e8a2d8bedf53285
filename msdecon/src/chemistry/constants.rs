// Purpose: To store constants that are used in the program
pub const MASS_PROTON: f64 = 1.007276466621; // Unified atomic mass unit

// Averagine isotope spacings used when merging masses across scans, +1, +2 and +3 peaks
pub const ISOTOPE_SHIFTS: [f64; 3] = [1.002868314, 2.005408917, 3.007841294]; // Unified atomic mass unit

/// convert a neutral mass to the m/z of its positively charged ion
///
/// Arguments:
///
/// * `mass` - neutral mass
/// * `charge` - charge state, must be > 0
///
/// Returns:
///
/// * `f64` - m/z
///
/// # Examples
///
/// ```
/// use msdecon::chemistry::constants::{mass_to_mz, MASS_PROTON};
///
/// let mz = mass_to_mz(998.0, 2);
/// assert!((mz - (499.0 + MASS_PROTON)).abs() < 1e-9);
/// ```
#[inline]
pub fn mass_to_mz(mass: f64, charge: u32) -> f64 {
    mass / charge as f64 + MASS_PROTON
}

/// convert an m/z value to the neutral mass of the ion at the given charge
///
/// # Examples
///
/// ```
/// use msdecon::chemistry::constants::{mz_to_mass, mass_to_mz};
///
/// let mass = mz_to_mass(mass_to_mz(1500.0, 3), 3);
/// assert!((mass - 1500.0).abs() < 1e-9);
/// ```
#[inline]
pub fn mz_to_mass(mz: f64, charge: u32) -> f64 {
    (mz - MASS_PROTON) * charge as f64
}

/// relative deviation of `value` from `reference` in parts per million
#[inline]
pub fn ppm_error(value: f64, reference: f64) -> f64 {
    (value - reference).abs() / reference * 1e6
}
