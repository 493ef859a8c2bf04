//! Image volume and mask types

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::geometry::VolumeShape;

/// Binary segmentation mask, (Z, Y, X), values 0 or 1
pub type Mask = Array3<u8>;

/// Voxel size in millimetres
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Spacing {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Volume of one voxel in cubic millimetres
    pub fn voxel_volume_mm3(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// All components finite and strictly positive
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .all(|s| s.is_finite() && *s > 0.0)
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Identity direction cosines
pub const IDENTITY_DIRECTION: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// A loaded CT series in Hounsfield units
#[derive(Clone, Debug)]
pub struct Volume {
    /// Voxel intensities, (Z, Y, X)
    pub data: Array3<i16>,
    pub spacing: Spacing,
    pub origin: [f64; 3],
    /// Row-major 3x3 direction cosine matrix
    pub direction: [f64; 9],
}

impl Volume {
    pub fn new(data: Array3<i16>, spacing: Spacing) -> Self {
        Self {
            data,
            spacing,
            origin: [0.0; 3],
            direction: IDENTITY_DIRECTION,
        }
    }

    pub fn with_geometry(mut self, origin: [f64; 3], direction: [f64; 9]) -> Self {
        self.origin = origin;
        self.direction = direction;
        self
    }

    pub fn shape(&self) -> VolumeShape {
        self.data.dim().into()
    }

    /// Minimum and maximum intensity, None for an empty volume
    pub fn intensity_range(&self) -> Option<(i16, i16)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Empty mask with this volume's shape
    pub fn empty_mask(&self) -> Mask {
        Mask::zeros(self.data.dim())
    }
}

/// Number of set voxels in a mask
pub fn count_voxels(mask: &Mask) -> u64 {
    mask.iter().filter(|&&v| v != 0).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_validation() {
        assert!(Spacing::new(0.7, 0.7, 2.5).is_valid());
        assert!(!Spacing::new(0.0, 1.0, 1.0).is_valid());
        assert!(!Spacing::new(1.0, f64::NAN, 1.0).is_valid());
        assert_eq!(Spacing::new(0.5, 0.5, 2.0).voxel_volume_mm3(), 0.5);
    }

    #[test]
    fn test_volume_shape_and_range() {
        let mut data = Array3::<i16>::from_elem((4, 5, 6), -1000);
        data[[1, 2, 3]] = 300;
        let volume = Volume::new(data, Spacing::default());
        assert_eq!(volume.shape(), VolumeShape::new(4, 5, 6));
        assert_eq!(volume.intensity_range(), Some((-1000, 300)));
        assert_eq!(volume.empty_mask().dim(), (4, 5, 6));
    }

    #[test]
    fn test_count_voxels() {
        let mut mask = Mask::zeros((2, 2, 2));
        mask[[0, 0, 0]] = 1;
        mask[[1, 1, 1]] = 1;
        assert_eq!(count_voxels(&mask), 2);
    }
}
