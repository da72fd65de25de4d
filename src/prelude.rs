pub use crate::curves::{CE_THRESHOLD, NBINS_CE, NBINS_IOU};
pub use crate::dataset::{DiskDataset, Sequence, SequenceDataset, Subset};
pub use crate::experiment::Experiment;
pub use crate::presenter::MetricKey;
pub use crate::protocol::{FrameObserver, NoopObserver, Protocol, TrackResult, Tracker};
pub use crate::report::{Performance, ReportAggregator, TrackerPerformance};
pub use crate::store::ResultStore;
pub use crate::utils::bbox::BoundingBox;
