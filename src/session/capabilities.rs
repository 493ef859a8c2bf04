//! Operator actions enabled per workflow state
//!
//! The state decides the base set. The `roi1_defined` signal only adds
//! `DrawRoi2` on top of it and never changes the state itself.

use super::state::WorkflowState;

/// An action the host may expose to the operator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    LoadVolume,
    DrawRoi1,
    DrawRoi2,
    ResetRoi,
    Segment,
    TuneParameters,
    ApplyPreset,
    ApplyRefinement,
    ResetMask,
    SaveMask,
    ExportHistory,
    /// Passive display control, stays enabled while a job runs
    SliceNavigation,
    /// Passive display control, stays enabled while a job runs
    WindowLevel,
}

impl Capability {
    pub const ALL: [Capability; 13] = [
        Capability::LoadVolume,
        Capability::DrawRoi1,
        Capability::DrawRoi2,
        Capability::ResetRoi,
        Capability::Segment,
        Capability::TuneParameters,
        Capability::ApplyPreset,
        Capability::ApplyRefinement,
        Capability::ResetMask,
        Capability::SaveMask,
        Capability::ExportHistory,
        Capability::SliceNavigation,
        Capability::WindowLevel,
    ];

    /// Display controls that never trigger work
    pub fn is_passive(&self) -> bool {
        matches!(self, Capability::SliceNavigation | Capability::WindowLevel)
    }

    fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

/// Set of enabled capabilities
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(caps: &[Capability]) -> Self {
        caps.iter().fold(Self::empty(), |set, c| set.with(*c))
    }

    pub fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    pub fn without(self, cap: Capability) -> Self {
        Self(self.0 & !cap.bit())
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + use<> {
        let set = *self;
        Capability::ALL.into_iter().filter(move |c| set.contains(*c))
    }

    /// Base set for a workflow state
    pub fn for_state(state: WorkflowState) -> Self {
        use Capability::*;

        let passive = [SliceNavigation, WindowLevel];
        let mut set = Self::of(&passive);
        let extra: &[Capability] = match state {
            WorkflowState::Initial => return Self::of(&[LoadVolume]),
            WorkflowState::VolumeLoaded => &[LoadVolume, DrawRoi1, ResetRoi],
            WorkflowState::RoiDefined => &[LoadVolume, DrawRoi1, ResetRoi, Segment],
            WorkflowState::MaskReady => &[
                LoadVolume,
                ResetRoi,
                TuneParameters,
                ApplyPreset,
                ApplyRefinement,
                ResetMask,
                SaveMask,
                ExportHistory,
            ],
            WorkflowState::Segmenting | WorkflowState::Refining => &[],
        };
        for cap in extra {
            set = set.with(*cap);
        }
        set
    }

    /// State set plus the `roi1_defined` signal
    pub fn resolve(state: WorkflowState, roi1_defined: bool) -> Self {
        let set = Self::for_state(state);
        if roi1_defined && set.contains(Capability::DrawRoi1) {
            set.with(Capability::DrawRoi2)
        } else {
            set
        }
    }
}
