//! Workflow state machine gating operator actions

use std::fmt;

use serde::Serialize;

use crate::error::WorkflowError;

/// Where the operator is in the load → ROI → segment → refine cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    #[default]
    Initial,
    VolumeLoaded,
    RoiDefined,
    Segmenting,
    MaskReady,
    Refining,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 6] = [
        WorkflowState::Initial,
        WorkflowState::VolumeLoaded,
        WorkflowState::RoiDefined,
        WorkflowState::Segmenting,
        WorkflowState::MaskReady,
        WorkflowState::Refining,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Initial => "INITIAL",
            WorkflowState::VolumeLoaded => "VOLUME_LOADED",
            WorkflowState::RoiDefined => "ROI_DEFINED",
            WorkflowState::Segmenting => "SEGMENTING",
            WorkflowState::MaskReady => "MASK_READY",
            WorkflowState::Refining => "REFINING",
        }
    }

    /// A background job owns the session in this state
    pub fn is_busy(&self) -> bool {
        matches!(self, WorkflowState::Segmenting | WorkflowState::Refining)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Edge labels of the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Trigger {
    LoadStart,
    LoadSuccess,
    LoadError,
    RoiBothDefined,
    RoiReset,
    SegmentStart,
    SegmentSuccess,
    SegmentError,
    RefineStart,
    RefineSuccess,
    RefineError,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::LoadStart => "load:start",
            Trigger::LoadSuccess => "load:success",
            Trigger::LoadError => "load:error",
            Trigger::RoiBothDefined => "roi:both_defined",
            Trigger::RoiReset => "roi:reset",
            Trigger::SegmentStart => "segment:start",
            Trigger::SegmentSuccess => "segment:success",
            Trigger::SegmentError => "segment:error",
            Trigger::RefineStart => "refine:start",
            Trigger::RefineSuccess => "refine:success",
            Trigger::RefineError => "refine:error",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resulting state for an edge, or None when the edge does not exist
pub fn next_state(from: WorkflowState, trigger: Trigger) -> Option<WorkflowState> {
    use Trigger as T;
    use WorkflowState as S;

    let to = match (from, trigger) {
        (S::Initial | S::VolumeLoaded | S::RoiDefined | S::MaskReady, T::LoadStart) => S::Initial,
        (S::Initial, T::LoadSuccess) => S::VolumeLoaded,
        (S::Initial, T::LoadError) => S::Initial,
        (S::VolumeLoaded, T::RoiReset) => S::VolumeLoaded,
        (S::VolumeLoaded, T::RoiBothDefined) => S::RoiDefined,
        (S::RoiDefined, T::RoiReset) => S::VolumeLoaded,
        (S::RoiDefined, T::SegmentStart) => S::Segmenting,
        (S::Segmenting, T::SegmentSuccess) => S::MaskReady,
        (S::Segmenting, T::SegmentError) => S::RoiDefined,
        (S::MaskReady, T::RefineStart) => S::Refining,
        (S::Refining, T::RefineSuccess) => S::MaskReady,
        (S::Refining, T::RefineError) => S::MaskReady,
        (S::MaskReady, T::RoiReset) => S::VolumeLoaded,
        _ => return None,
    };
    Some(to)
}

/// Current workflow state plus the only way to change it
#[derive(Debug, Default)]
pub struct WorkflowStateMachine {
    state: WorkflowState,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Whether `trigger` is a valid edge from the current state
    pub fn can_fire(&self, trigger: Trigger) -> bool {
        next_state(self.state, trigger).is_some()
    }

    /// Follow an edge. The state is left unchanged on failure.
    pub fn fire(&mut self, trigger: Trigger) -> Result<WorkflowState, WorkflowError> {
        let Some(to) = next_state(self.state, trigger) else {
            return Err(WorkflowError::IllegalTransition {
                from: self.state,
                trigger,
            });
        };
        if to != self.state {
            log::debug!("workflow: {} --{}--> {}", self.state, trigger, to);
        }
        self.state = to;
        Ok(to)
    }
}
