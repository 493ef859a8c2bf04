//! Messages a job sends back to the coordinator

use std::fmt;

use serde::Serialize;

use crate::domain::{Mask, Volume};
use crate::masks::{RefinementStats, SegmentationStats};

/// Monotonic job identifier, unique per controller
pub type JobId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Load,
    Segmentation,
    Refinement,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Load => "load",
            JobKind::Segmentation => "segmentation",
            JobKind::Refinement => "refinement",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful result of a job
#[derive(Debug)]
pub enum JobOutput {
    Volume(Box<Volume>),
    Segmentation { mask: Mask, stats: SegmentationStats },
    Refinement { mask: Mask, stats: RefinementStats },
}

/// Tagged event on a job's channel.
///
/// `Progress` and `Log` may appear any number of times; exactly one `Done`
/// or `Error` ends the stream.
#[derive(Debug)]
pub enum JobEvent {
    Progress { percent: u8, message: String },
    Log(String),
    Done(JobOutput),
    Error(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done(_) | JobEvent::Error(_))
    }
}
