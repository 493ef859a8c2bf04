//! Mask statistics and job result summaries

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::{Mask, OrganKey, Spacing, count_voxels};

/// Size of a mask in voxels and millilitres
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MaskStatistics {
    pub voxel_count: u64,
    pub volume_ml: f64,
}

impl MaskStatistics {
    pub fn from_count(voxel_count: u64, spacing: Spacing) -> Self {
        Self {
            voxel_count,
            volume_ml: voxel_count as f64 * spacing.voxel_volume_mm3() / 1000.0,
        }
    }
}

/// Count set voxels and convert to millilitres
pub fn mask_statistics(mask: &Mask, spacing: Spacing) -> MaskStatistics {
    MaskStatistics::from_count(count_voxels(mask), spacing)
}

/// Relative change from `base` to `final_count` in percent, 0 for an empty base
pub fn improvement_percent(base_count: u64, final_count: u64) -> f64 {
    if base_count == 0 {
        return 0.0;
    }
    (final_count as f64 - base_count as f64) / base_count as f64 * 100.0
}

/// Summary produced by a segmentation run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentationStats {
    pub organ_key: OrganKey,
    pub model_name: String,
    /// Wall-clock seconds spent in the model
    pub elapsed_time: f64,
    pub timestamp: DateTime<Local>,
    pub voxel_count: u64,
    pub volume_ml: f64,
    /// Model-specific extras
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Summary produced by a refinement run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RefinementStats {
    pub organ_key: OrganKey,
    pub timestamp: DateTime<Local>,
    pub base_count: u64,
    pub final_count: u64,
    pub improvement_percent: f64,
    pub volume_ml: f64,
}

impl RefinementStats {
    pub fn new(
        organ_key: OrganKey,
        timestamp: DateTime<Local>,
        base_count: u64,
        final_count: u64,
        spacing: Spacing,
    ) -> Self {
        Self {
            organ_key,
            timestamp,
            base_count,
            final_count,
            improvement_percent: improvement_percent(base_count, final_count),
            volume_ml: MaskStatistics::from_count(final_count, spacing).volume_ml,
        }
    }
}
