/// Bounding boxes
pub mod bbox;

/// NaN-aware reductions
pub mod stats;
