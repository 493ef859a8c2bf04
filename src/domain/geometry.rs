//! Geometric types for slice rectangles and 3D regions

use std::fmt;

use serde::Serialize;

use crate::error::WorkflowError;

/// Integer floor of the midpoint between two coordinates
pub fn floor_mid(a: i64, b: i64) -> i64 {
    (a + b).div_euclid(2)
}

/// Axis-aligned rectangle on a single slice, inclusive pixel bounds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rect2D {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl Rect2D {
    /// Create a rectangle, rejecting inverted bounds
    pub fn new(x_min: i64, x_max: i64, y_min: i64, y_max: i64) -> Result<Self, WorkflowError> {
        if x_min > x_max || y_min > y_max {
            return Err(WorkflowError::InvalidGeometry(format!(
                "inverted rectangle x=[{x_min},{x_max}] y=[{y_min},{y_max}]"
            )));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// Build a rectangle from two drag corners in any order
    pub fn from_corners(a: (i64, i64), b: (i64, i64)) -> Self {
        Self {
            x_min: a.0.min(b.0),
            x_max: a.0.max(b.0),
            y_min: a.1.min(b.1),
            y_max: a.1.max(b.1),
        }
    }

    /// Get the width of the rectangle
    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    /// Get the height of the rectangle
    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    /// Centroid, floored to whole pixels
    pub fn center(&self) -> (i64, i64) {
        (
            floor_mid(self.x_min, self.x_max),
            floor_mid(self.y_min, self.y_max),
        )
    }

    /// Place a `width` x `height` rectangle centred on `center`, clipped to the slice.
    ///
    /// The low edge is clamped first and the high edge follows it, so a box
    /// pushed past the high border shrinks while one pushed past the low
    /// border keeps its size. Fails when the centre lies so far past the high
    /// border that nothing of the box remains on the slice.
    pub fn recentered(
        center: (i64, i64),
        width: i64,
        height: i64,
        bounds: VolumeShape,
    ) -> Result<Self, WorkflowError> {
        let max_x = bounds.x as i64 - 1;
        let max_y = bounds.y as i64 - 1;

        let x_min = (center.0 - width.div_euclid(2)).max(0);
        let x_max = (x_min + width).min(max_x);
        let y_min = (center.1 - height.div_euclid(2)).max(0);
        let y_max = (y_min + height).min(max_y);

        if x_min > x_max || y_min > y_max {
            return Err(WorkflowError::InvalidGeometry(format!(
                "rectangle centred at {center:?} falls outside a {}x{} slice",
                bounds.x, bounds.y
            )));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }
}

impl fmt::Display for Rect2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x=[{}:{}], y=[{}:{}]",
            self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}

/// Volume extents in voxels, (Z, Y, X) order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VolumeShape {
    pub z: usize,
    pub y: usize,
    pub x: usize,
}

impl VolumeShape {
    pub fn new(z: usize, y: usize, x: usize) -> Self {
        Self { z, y, x }
    }

    pub fn voxel_count(&self) -> usize {
        self.z * self.y * self.x
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.z, self.y, self.x)
    }
}

impl From<(usize, usize, usize)> for VolumeShape {
    fn from((z, y, x): (usize, usize, usize)) -> Self {
        Self { z, y, x }
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.z, self.y, self.x)
    }
}

/// Box derived from two slice annotations, inclusive bounds on every axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CombinedRoi3D {
    pub z0: usize,
    pub z1: usize,
    pub y0: usize,
    pub y1: usize,
    pub x0: usize,
    pub x1: usize,
}

impl CombinedRoi3D {
    /// Clip raw bounds to the volume and validate the result.
    ///
    /// Fails when the box lies entirely outside the volume or when any axis
    /// collapses to zero extent after clipping.
    pub fn clipped(
        z: (i64, i64),
        y: (i64, i64),
        x: (i64, i64),
        shape: VolumeShape,
    ) -> Result<Self, WorkflowError> {
        let axes = [("z", z, shape.z), ("y", y, shape.y), ("x", x, shape.x)];
        let mut clipped = [(0usize, 0usize); 3];

        for (slot, (name, (lo, hi), dim)) in clipped.iter_mut().zip(axes) {
            let (lo, hi) = (lo.min(hi), lo.max(hi));
            let max = dim as i64 - 1;
            if dim == 0 || hi < 0 || lo > max {
                return Err(WorkflowError::InvalidGeometry(format!(
                    "{name}=[{lo},{hi}] lies outside the volume (size {dim})"
                )));
            }
            let lo = lo.clamp(0, max) as usize;
            let hi = hi.clamp(0, max) as usize;
            if hi <= lo {
                return Err(WorkflowError::InvalidGeometry(format!(
                    "{name}=[{lo},{hi}] has no extent"
                )));
            }
            *slot = (lo, hi);
        }

        let [(z0, z1), (y0, y1), (x0, x1)] = clipped;
        Ok(Self {
            z0,
            z1,
            y0,
            y1,
            x0,
            x1,
        })
    }

    /// Coordinates in (z0, z1, y0, y1, x0, x1) order
    pub fn as_tuple(&self) -> (usize, usize, usize, usize, usize, usize) {
        (self.z0, self.z1, self.y0, self.y1, self.x0, self.x1)
    }

    /// Extents in voxels along (z, y, x), inclusive
    pub fn extent(&self) -> VolumeShape {
        VolumeShape {
            z: self.z1 - self.z0 + 1,
            y: self.y1 - self.y0 + 1,
            x: self.x1 - self.x0 + 1,
        }
    }

    /// Check if this box contains a voxel
    pub fn contains(&self, z: usize, y: usize, x: usize) -> bool {
        (self.z0..=self.z1).contains(&z)
            && (self.y0..=self.y1).contains(&y)
            && (self.x0..=self.x1).contains(&x)
    }
}

impl fmt::Display for CombinedRoi3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z=[{}:{}], y=[{}:{}], x=[{}:{}]",
            self.z0, self.z1, self.y0, self.y1, self.x0, self.x1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_new_rejects_inverted_bounds() {
        assert!(Rect2D::new(10, 5, 0, 1).is_err());
        assert!(Rect2D::new(0, 1, 9, 2).is_err());
        assert!(Rect2D::new(3, 3, 4, 4).is_ok());
    }

    #[test]
    fn test_rect_from_corners_normalises() {
        let r = Rect2D::from_corners((40, 5), (10, 25));
        assert_eq!(r, Rect2D::new(10, 40, 5, 25).unwrap());
        assert_eq!(r.width(), 30);
        assert_eq!(r.height(), 20);
    }

    #[test]
    fn test_center_floors_odd_sums() {
        let r = Rect2D::new(0, 5, -5, 0).unwrap();
        assert_eq!(r.center(), (2, -3));
    }

    #[test]
    fn test_recentered_shrinks_at_high_edge_and_shifts_at_low_edge() {
        let bounds = VolumeShape::new(50, 50, 50);
        let high = Rect2D::recentered((45, 45), 20, 20, bounds).unwrap();
        assert_eq!(high, Rect2D::new(35, 49, 35, 49).unwrap());

        let low = Rect2D::recentered((2, 3), 20, 10, bounds).unwrap();
        assert_eq!(low, Rect2D::new(0, 20, 0, 10).unwrap());
    }

    #[test]
    fn test_recentered_rejects_centre_past_high_edge() {
        let bounds = VolumeShape::new(50, 50, 50);
        let err = Rect2D::recentered((75, 20), 20, 20, bounds).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidGeometry(_)));
        assert!(Rect2D::recentered((20, 80), 20, 20, bounds).is_err());
        // touching the last column still leaves a (degenerate) box
        let edge = Rect2D::recentered((59, 20), 20, 20, bounds).unwrap();
        assert_eq!((edge.x_min, edge.x_max), (49, 49));
    }

    #[test]
    fn test_clipped_rejects_outside_and_flat_boxes() {
        let shape = VolumeShape::new(10, 10, 10);
        assert!(CombinedRoi3D::clipped((12, 20), (0, 5), (0, 5), shape).is_err());
        assert!(CombinedRoi3D::clipped((3, 3), (0, 5), (0, 5), shape).is_err());
        assert!(CombinedRoi3D::clipped((0, 5), (-10, -1), (0, 5), shape).is_err());

        let roi = CombinedRoi3D::clipped((8, 2), (-4, 5), (3, 40), shape).unwrap();
        assert_eq!(roi.as_tuple(), (2, 8, 0, 5, 3, 9));
        assert_eq!(roi.extent(), VolumeShape::new(7, 6, 7));
        assert!(roi.contains(2, 0, 9));
        assert!(!roi.contains(1, 0, 9));
    }
}
