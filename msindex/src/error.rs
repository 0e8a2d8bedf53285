use msdecon::error::DeconvolutionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{results} result slots for {queries} queries")]
    BufferLengthMismatch { queries: usize, results: usize },
    #[error("{count} peaks do not fit a 32 bit offset")]
    TooManyPeaks { count: u64 },
    #[error("failed to encode index: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode index: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("invalid index blob: {0}")]
    InvalidBlob(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Deconvolution(#[from] DeconvolutionError),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
