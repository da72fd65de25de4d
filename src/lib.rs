/// Bounding boxes and NaN-aware statistics
pub mod utils;

/// Per-frame overlap and center-distance metrics
pub mod metrics;

/// Threshold-sweep curves and scalar score reduction
pub mod curves;

/// Sequence data model and dataset capability
pub mod dataset;

/// OPE and R-OPE protocol runners
pub mod protocol;

/// Persistent per-(tracker, sequence, repetition) records
pub mod store;

/// Report aggregation and caching
pub mod report;

/// Tracker ranking and comparison plots
pub mod presenter;

/// Experiment orchestration over a dataset subset
pub mod experiment;

/// Scripted trackers and synthetic datasets for testing
pub mod testing;

pub mod prelude;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Errors {
    #[error("Box has a negative extent ({0} x {1}).")]
    InvalidGeometry(f32, f32),
    #[error("Predicted boxes ({0}) and annotations ({1}) have different shapes.")]
    ShapeMismatch(usize, usize),
    #[error("Sequence {0} not found.")]
    MissingSequenceName(String),
    #[error("Sequence {0} has no valid annotations.")]
    NoValidAnnotations(String),
    #[error("Time record for sequence {0} is missing or unreadable.")]
    MissingTimeFile(String),
}

pub(crate) const EPS: f32 = 0.00001;
