//! Core workflow module
//!
//! This module contains:
//! - The workflow controller that owns all session state
//! - Volume loaders for load jobs
//! - The operator activity journal
//! - The headless demo session run by the binary

pub mod activity;
pub mod app;
pub mod controller;
pub mod loader;

pub use activity::{ActivityEntry, ActivityLevel, ActivityLog};
pub use controller::{WorkflowController, WorkflowEvent};
pub use loader::{PhantomLoader, VolumeLoader};
