//! Model capability trait

use anyhow::{Context, bail};
use serde::Serialize;

use crate::domain::{CombinedRoi3D, Mask, OrganKey, Spacing, Volume, VolumeShape};
use crate::jobs::JobReporter;

use super::device::ComputeBackend;

/// Inputs for one segmentation run
#[derive(Clone, Copy, Debug)]
pub struct SegmentationRequest<'a> {
    pub volume: &'a Volume,
    pub spacing: Spacing,
    pub origin: [f64; 3],
    pub direction: [f64; 9],
    pub roi: Option<CombinedRoi3D>,
}

/// What a model hands back: a full-volume mask plus free-form details
#[derive(Clone, Debug)]
pub struct ModelOutput {
    pub mask: Mask,
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ModelOutput {
    pub fn new(mask: Mask) -> Self {
        Self {
            mask,
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub display_name: String,
    pub organ_key: OrganKey,
    pub backend: ComputeBackend,
    pub use_cpu: bool,
}

/// Rough memory needs of a run, in MiB
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MemoryEstimate {
    pub volume_mb: f64,
    pub mask_mb: f64,
    pub estimated_total_mb: f64,
}

/// A segmentation model.
///
/// Implementations run on a worker thread, so they must be `Send + Sync`
/// and must not touch controller state.
pub trait Segmenter: Send + Sync {
    fn display_name(&self) -> &str;

    /// Organ the produced masks are stored under
    fn organ_key(&self) -> OrganKey;

    fn backend(&self) -> ComputeBackend;

    /// Prepare weights or lookup tables. Called once before first use.
    fn load(&mut self) -> anyhow::Result<()>;

    /// Produce a mask with the volume's shape
    fn segment(
        &self,
        request: &SegmentationRequest<'_>,
        reporter: &JobReporter,
    ) -> anyhow::Result<ModelOutput>;

    /// Reject inputs the model cannot handle
    fn validate(&self, volume: &Volume, spacing: Spacing) -> anyhow::Result<()> {
        let shape = volume.shape();
        if shape.voxel_count() == 0 {
            bail!("volume is empty: {}", shape);
        }
        if !spacing.is_valid() {
            bail!(
                "spacing must be positive, got ({}, {}, {})",
                spacing.x,
                spacing.y,
                spacing.z
            );
        }
        Ok(())
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            display_name: self.display_name().to_string(),
            organ_key: self.organ_key(),
            backend: self.backend(),
            use_cpu: self.backend() == ComputeBackend::Fallback,
        }
    }

    /// i16 volume + u8 mask + 100 MiB model overhead
    fn estimate_memory(&self, shape: VolumeShape) -> MemoryEstimate {
        let voxels = shape.voxel_count() as f64;
        let volume_mb = voxels * 2.0 / (1024.0 * 1024.0);
        let mask_mb = voxels / (1024.0 * 1024.0);
        MemoryEstimate {
            volume_mb,
            mask_mb,
            estimated_total_mb: volume_mb + mask_mb + 100.0,
        }
    }
}

/// Check a model's mask before it can reach the store
pub fn check_mask_shape(mask: &Mask, expected: VolumeShape) -> anyhow::Result<()> {
    let got = VolumeShape::from(mask.dim());
    if got != expected {
        bail!("model returned a {got} mask for a {expected} volume");
    }
    Ok(())
}

/// Sub-volume bounds for a request, the whole volume when no ROI is given
pub fn roi_or_full(request: &SegmentationRequest<'_>) -> anyhow::Result<CombinedRoi3D> {
    if let Some(roi) = request.roi {
        return Ok(roi);
    }
    let shape = request.volume.shape();
    CombinedRoi3D::clipped(
        (0, shape.z as i64 - 1),
        (0, shape.y as i64 - 1),
        (0, shape.x as i64 - 1),
        shape,
    )
    .context("volume too small to segment without a ROI")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_mask_shape() {
        let mask = Mask::zeros((2, 3, 4));
        assert!(check_mask_shape(&mask, VolumeShape::new(2, 3, 4)).is_ok());
        assert!(check_mask_shape(&mask, VolumeShape::new(2, 3, 5)).is_err());
    }

    #[test]
    fn test_model_output_details() {
        let out = ModelOutput::new(Mask::zeros((1, 1, 1))).with_detail("threshold", -400);
        assert_eq!(out.details["threshold"], -400);
    }
}
