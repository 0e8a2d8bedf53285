use thiserror::Error;

/// Failure modes of the deconvolution core. Missing data (no peak in tolerance,
/// an empty spectrum window) is never an error, only broken preconditions are.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeconvolutionError {
    #[error("invalid charge range [{min_charge}, {max_charge}], charges must be >= 1 and min <= max")]
    InvalidChargeRange { min_charge: i32, max_charge: i32 },
    #[error("scoring method {0} is not supported for envelope scoring")]
    UnsupportedScoringMethod(String),
    #[error("unknown scoring method {0}")]
    UnknownScoringMethod(String),
    #[error("scan {scan_index} arrived after scan {last_scan_index}, scans must be strictly increasing")]
    OutOfOrderScan { scan_index: usize, last_scan_index: usize },
    #[error("spectrum has no usable intensity")]
    EmptySpectrum,
    #[error("m/z array has {mz} entries but intensity array has {intensity}")]
    MismatchedArrays { mz: usize, intensity: usize },
}

pub type Result<T> = std::result::Result<T, DeconvolutionError>;
