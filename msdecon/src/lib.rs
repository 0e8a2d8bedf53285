// chemistry module
pub mod chemistry {
    pub mod constants;
    pub mod elements;
}

// algorithm module
pub mod algorithm {
    pub mod isotope;
    pub mod averagine;
    pub mod similarity;
    pub mod scoring;
    pub mod deconvolution;
    pub mod aggregation;
}

// data module
pub mod data {
    pub mod spectrum;
    pub mod envelope;
    pub mod feature;
}

pub mod error;
pub mod params;
