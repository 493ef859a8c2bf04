//! Two-rectangle ROI manager
//!
//! The operator draws ROI1 on the first slice of interest and ROI2 on the
//! last one. ROI2 only contributes its placement: it is resized to ROI1's
//! width and height around its own centroid, so the two rectangles always
//! describe one consistent box no matter how carelessly ROI2 was drawn.

use crate::domain::{CombinedRoi3D, Rect2D, RoiAnnotation, VolumeShape};
use crate::error::WorkflowError;

/// Second annotation with the data needed to re-derive it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SecondRoi {
    slice_index: usize,
    /// Centroid of the raw drag rectangle
    center: (i64, i64),
    /// Slice bounds the rectangle was clipped to
    bounds: VolumeShape,
    adjusted: Rect2D,
}

#[derive(Clone, Debug, Default)]
pub struct RoiManager {
    roi1: Option<RoiAnnotation>,
    roi2: Option<SecondRoi>,
    cached: Option<(VolumeShape, CombinedRoi3D)>,
}

impl RoiManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first annotation.
    ///
    /// An existing ROI2 keeps its centre and is resized to the new ROI1. If
    /// that resize would leave ROI2 off the slice nothing is changed.
    pub fn set_roi1(&mut self, slice_index: usize, rect: Rect2D) -> Result<(), WorkflowError> {
        if let Some(second) = self.roi2.as_mut() {
            second.adjusted =
                Rect2D::recentered(second.center, rect.width(), rect.height(), second.bounds)?;
            log::debug!("ROI2 re-derived for new ROI1: {}", second.adjusted);
        }

        self.roi1 = Some(RoiAnnotation::new(slice_index, rect));
        self.cached = None;
        Ok(())
    }

    /// Record the second annotation, resized to ROI1 and clipped to `bounds`.
    ///
    /// Returns the adjusted rectangle that was stored.
    pub fn set_roi2(
        &mut self,
        slice_index: usize,
        rect: Rect2D,
        bounds: VolumeShape,
    ) -> Result<Rect2D, WorkflowError> {
        let Some(first) = self.roi1 else {
            return Err(WorkflowError::Precondition(
                "ROI 1 must be drawn before ROI 2".to_string(),
            ));
        };

        let center = rect.center();
        let adjusted =
            Rect2D::recentered(center, first.rect.width(), first.rect.height(), bounds)?;
        log::debug!(
            "ROI2 raw {} centred at {:?} -> adjusted {}",
            rect,
            center,
            adjusted
        );

        self.roi2 = Some(SecondRoi {
            slice_index,
            center,
            bounds,
            adjusted,
        });
        self.cached = None;
        Ok(adjusted)
    }

    pub fn roi1(&self) -> Option<RoiAnnotation> {
        self.roi1
    }

    /// ROI2 as stored, after resizing and clipping
    pub fn roi2(&self) -> Option<RoiAnnotation> {
        self.roi2
            .map(|second| RoiAnnotation::new(second.slice_index, second.adjusted))
    }

    /// Secondary signal enabling "draw ROI 2"
    pub fn roi1_defined(&self) -> bool {
        self.roi1.is_some()
    }

    pub fn has_both(&self) -> bool {
        self.roi1.is_some() && self.roi2.is_some()
    }

    /// Whether a combined box is currently cached
    pub fn has_cached_combination(&self) -> bool {
        self.cached.is_some()
    }

    /// Derive the 3D box spanned by both annotations.
    ///
    /// Z comes from the two slice indices, X and Y from the adjusted ROI2
    /// rectangle. Every axis is clipped to `shape`.
    pub fn combined(&mut self, shape: VolumeShape) -> Result<CombinedRoi3D, WorkflowError> {
        if let Some((cached_shape, roi)) = self.cached
            && cached_shape == shape
        {
            return Ok(roi);
        }

        let (Some(first), Some(second)) = (self.roi1, self.roi2) else {
            return Err(WorkflowError::Precondition(
                "both ROIs must be drawn".to_string(),
            ));
        };

        let rect = second.adjusted;
        let roi = CombinedRoi3D::clipped(
            (first.slice_index as i64, second.slice_index as i64),
            (rect.y_min, rect.y_max),
            (rect.x_min, rect.x_max),
            shape,
        )?;

        self.cached = Some((shape, roi));
        Ok(roi)
    }

    pub fn reset(&mut self) {
        self.roi1 = None;
        self.roi2 = None;
        self.cached = None;
    }

    /// Status text for the operator
    pub fn describe(&self) -> String {
        match (self.roi1, self.roi2()) {
            (None, _) => "ROI: not defined".to_string(),
            (Some(first), None) => format!("ROI 1: {first}\nROI 2: not defined"),
            (Some(first), Some(second)) => {
                let (lo, hi) = if first.slice_index <= second.slice_index {
                    (first.slice_index, second.slice_index)
                } else {
                    (second.slice_index, first.slice_index)
                };
                format!(
                    "ROI 1: {first}\nROI 2: {second}\n3D: {} slices (z={lo}..{hi}), {}x{} px",
                    hi - lo + 1,
                    second.rect.width(),
                    second.rect.height()
                )
            }
        }
    }
}
