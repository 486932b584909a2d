//! Error types for the PMBM tracker core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    Parameters(String),

    #[error("non-SPD covariance could not be recovered: {detail}")]
    InvalidCovariance { detail: String },

    #[error("invalid measurement at index {index}: {detail}")]
    InvalidMeasurement { index: usize, detail: String },

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Murty solver found no feasible assignment for this subproblem")]
    NoFeasibleAssignment,
}
