//! Operator session state
//!
//! This module contains:
//! - ROI manager for the two slice rectangles
//! - Workflow state machine
//! - Capability sets derived from the current state

pub mod capabilities;
pub mod roi;
pub mod state;

pub use capabilities::{Capability, CapabilitySet};
pub use roi::RoiManager;
pub use state::{Trigger, WorkflowState, WorkflowStateMachine};
