//! Error types for the binning engine.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BinningError>;

/// Errors produced by the binning engine.
///
/// A bad single record never aborts a batch: [`BinningError::UnsupportedGeometry`]
/// is returned to the caller of a single insert, while batch insertion logs the
/// record and keeps going.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BinningError {
    /// A record carried a geometry kind the engine cannot bin. Only point
    /// geometries are supported; the record is dropped without mutating the tree.
    #[error("unsupported geometry kind '{kind}', only points can be binned")]
    UnsupportedGeometry { kind: String },

    /// A clustering result did not line up with the extracted cell list.
    #[error("bioregion assignment has {got} entries but {expected} cells were extracted")]
    AssignmentMismatch { expected: usize, got: usize },

    /// Configuration rejected by [`Config::validate`](crate::Config::validate).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A GeoJSON feature had no usable species name property.
    #[error("record is missing a species name property")]
    MissingName,
}
