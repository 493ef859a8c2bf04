//! Per-organ mask versions, statistics and the operation audit trail

pub mod history;
pub mod stats;
pub mod store;

pub use history::{OperationHistory, OperationKind, OperationRecord, OperationStats};
pub use stats::{MaskStatistics, RefinementStats, SegmentationStats, mask_statistics};
pub use store::{MaskStore, MaskVersion};
