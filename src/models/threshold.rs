//! Intensity window models
//!
//! Marks every voxel inside the ROI whose Hounsfield value falls in a fixed
//! window. Good enough for air-filled lungs and as a stand-in when no learned
//! model is installed.

use anyhow::{bail, ensure};
use ndarray::s;

use crate::domain::OrganKey;
use crate::jobs::JobReporter;

use super::device::ComputeBackend;
use super::segmenter::{ModelOutput, SegmentationRequest, Segmenter, roi_or_full};

#[derive(Debug, Clone)]
pub struct ThresholdSegmenter {
    display_name: String,
    organ_key: OrganKey,
    hu_min: i16,
    hu_max: i16,
    backend: ComputeBackend,
    loaded: bool,
}

impl ThresholdSegmenter {
    pub fn new(
        display_name: impl Into<String>,
        organ_key: impl Into<OrganKey>,
        hu_min: i16,
        hu_max: i16,
        backend: ComputeBackend,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            organ_key: organ_key.into(),
            hu_min,
            hu_max,
            backend,
            loaded: false,
        }
    }

    /// Air-filled lung parenchyma
    pub fn lung(backend: ComputeBackend) -> Self {
        Self::new("Lung (HU threshold)", "lung", -1000, -400, backend)
    }

    /// Contrast-enhanced liver parenchyma
    pub fn liver(backend: ComputeBackend) -> Self {
        Self::new("Liver (HU threshold)", "liver", 40, 200, backend)
    }
}

impl Segmenter for ThresholdSegmenter {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn organ_key(&self) -> OrganKey {
        self.organ_key.clone()
    }

    fn backend(&self) -> ComputeBackend {
        self.backend
    }

    fn load(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.hu_min < self.hu_max,
            "empty HU window [{}, {}]",
            self.hu_min,
            self.hu_max
        );
        self.loaded = true;
        Ok(())
    }

    fn segment(
        &self,
        request: &SegmentationRequest<'_>,
        reporter: &JobReporter,
    ) -> anyhow::Result<ModelOutput> {
        if !self.loaded {
            bail!("{} used before load()", self.display_name);
        }
        self.validate(request.volume, request.spacing)?;

        let roi = roi_or_full(request)?;
        reporter.log(format!(
            "{}: HU window [{}, {}] on {}",
            self.display_name, self.hu_min, self.hu_max, roi
        ));

        let mut mask = request.volume.empty_mask();
        let slices = roi.z1 - roi.z0 + 1;
        for (done, z) in (roi.z0..=roi.z1).enumerate() {
            let src = request
                .volume
                .data
                .slice(s![z, roi.y0..=roi.y1, roi.x0..=roi.x1]);
            let mut dst = mask.slice_mut(s![z, roi.y0..=roi.y1, roi.x0..=roi.x1]);
            ndarray::Zip::from(&mut dst).and(&src).for_each(|m, &hu| {
                *m = u8::from(hu >= self.hu_min && hu <= self.hu_max);
            });
            reporter.progress(
                ((done + 1) * 100 / slices) as u32,
                format!("slice {}/{}", done + 1, slices),
            );
        }

        Ok(ModelOutput::new(mask)
            .with_detail("hu_min", self.hu_min)
            .with_detail("hu_max", self.hu_max)
            .with_detail("backend", self.backend.name()))
    }
}
