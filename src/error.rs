//! Error taxonomy for the workflow core

use crate::domain::OrganKey;
use crate::jobs::JobKind;
use crate::session::state::{Trigger, WorkflowState};

/// Errors surfaced to the host by the workflow core.
///
/// Geometry, precondition and busy errors are raised synchronously before a
/// job is dispatched. `Load`, `Segmentation` and `Refinement` reach the host
/// through job events.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("configuration could not be loaded: {0}")]
    ConfigLoad(String),

    #[error("volume load failed: {0}")]
    Load(String),

    #[error("invalid ROI geometry: {0}")]
    InvalidGeometry(String),

    #[error("transition '{trigger}' is not allowed from state {from}")]
    IllegalTransition { from: WorkflowState, trigger: Trigger },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("refinement failed: {0}")]
    Refinement(String),

    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("a {0} job is already running")]
    Busy(JobKind),

    #[error("no base mask recorded for organ '{0}'")]
    UnknownOrgan(OrganKey),

    #[error("parameter {name}={value} is outside [{min}, {max}]")]
    ParameterOutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("no volume is loaded")]
    NoVolume,
}

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;
