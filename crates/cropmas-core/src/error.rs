//! Error types surfaced by simulation setup.
//!
//! Out-of-frame samplers and zero consensus are ordinary states handled
//! inside the agents; only conditions that make a run meaningless end up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MasError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("activity image has zero width or height")]
    EmptyImage,

    #[error("activity buffer holds {actual} samples, expected {expected} ({width}x{height})")]
    BufferSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("image {width}x{height} cannot hold a leader footprint of half-size {half_size}")]
    ImageTooSmall {
        width: usize,
        height: usize,
        half_size: i32,
    },

    #[error("no crop row contains a seed position")]
    NoRows,

    #[error("malformed seed file: {0}")]
    Seeds(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MasError>;
