use std::collections::HashMap;

/// Monoisotopic-first isotope masses of the elements found in biomolecules.
pub fn atoms_isotopic_weights() -> HashMap<&'static str, Vec<f64>> {
    let mut map = HashMap::new();
    map.insert("H", vec![1.00782503223, 2.01410177812]);
    map.insert("C", vec![12.0000000, 13.00335483507]);
    map.insert("N", vec![14.00307400443, 15.00010889888]);
    map.insert("O", vec![15.99491461957, 16.99913175650, 17.99915961286]);
    map.insert("P", vec![30.97376199842]);
    map.insert("S", vec![31.9720711744, 32.9714589098, 33.967867004]);

    map
}

/// Natural isotope abundances, parallel to [`atoms_isotopic_weights`].
pub fn isotopic_abundance() -> HashMap<&'static str, Vec<f64>> {

    let mut map = HashMap::new();

    map.insert("H", vec![0.999885, 0.000115]);
    map.insert("C", vec![0.9893, 0.0107]);
    map.insert("N", vec![0.99632, 0.00368]);
    map.insert("O", vec![0.99757, 0.00038, 0.00205]);
    map.insert("P", vec![1.0]);
    map.insert("S", vec![0.9493, 0.0076, 0.0429]);

    map
}

/// Elemental composition of one averagine unit (Senko et al.), the statistical average amino acid.
pub fn averagine_composition() -> [(&'static str, f64); 5] {
    [
        ("C", 4.9384),
        ("H", 7.7583),
        ("O", 1.4773),
        ("N", 1.3577),
        ("S", 0.0417),
    ]
}

/// monoisotopic mass of an elemental composition
///
/// Arguments:
///
/// * `composition` - element symbol to atom count
///
/// Returns:
///
/// * `Option<f64>` - the mass, `None` if an element is not tabulated
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use msdecon::chemistry::elements::monoisotopic_mass;
///
/// let water: HashMap<String, i32> = [("H".to_string(), 2), ("O".to_string(), 1)].into_iter().collect();
/// let mass = monoisotopic_mass(&water).unwrap();
/// assert!((mass - 18.0105646863).abs() < 1e-6);
/// ```
pub fn monoisotopic_mass(composition: &HashMap<String, i32>) -> Option<f64> {
    let weights = atoms_isotopic_weights();
    composition.iter().try_fold(0.0, |acc, (element, &count)| {
        let lightest = weights.get(element.as_str())?.first()?;
        Some(acc + lightest * count as f64)
    })
}
