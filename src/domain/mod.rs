//! Pure domain types with minimal dependencies
//!
//! This module contains the value types shared by the ROI manager, the mask
//! store and the job layer. Nothing here knows about threads or the state
//! machine.

pub mod annotation;
pub mod geometry;
pub mod volume;

pub use annotation::*;
pub use geometry::*;
pub use volume::*;
