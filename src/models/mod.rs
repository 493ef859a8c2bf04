//! Segmentation models
//!
//! This module contains:
//! - The `Segmenter` capability trait every model implements
//! - A registry mapping display names to model factories
//! - Compute backend detection
//! - Built-in intensity threshold models

pub mod device;
pub mod registry;
pub mod segmenter;
pub mod threshold;

pub use device::ComputeBackend;
pub use registry::{ModelFactory, ModelOptions, ModelRegistry};
pub use segmenter::{MemoryEstimate, ModelInfo, ModelOutput, SegmentationRequest, Segmenter};
pub use threshold::ThresholdSegmenter;
