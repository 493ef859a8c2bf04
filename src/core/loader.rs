//! Volume sources for load jobs
//!
//! DICOM decoding lives outside this crate. Hosts plug their reader in as a
//! `VolumeLoader`; the built-in phantom is enough for headless sessions.

use anyhow::ensure;
use ndarray::Array3;

use crate::domain::{Spacing, Volume, VolumeShape};
use crate::jobs::JobReporter;

/// Produces a volume on a worker thread
pub trait VolumeLoader: Send + 'static {
    /// Human readable source, used in log lines
    fn describe(&self) -> String {
        "volume".to_string()
    }

    fn load(self, reporter: &JobReporter) -> anyhow::Result<Volume>;
}

impl<F> VolumeLoader for F
where
    F: FnOnce(&JobReporter) -> anyhow::Result<Volume> + Send + 'static,
{
    fn load(self, reporter: &JobReporter) -> anyhow::Result<Volume> {
        self(reporter)
    }
}

/// Reject volumes no model or ROI could work with
pub fn check_volume(volume: &Volume) -> anyhow::Result<()> {
    let shape = volume.shape();
    ensure!(shape.voxel_count() > 0, "loaded volume is empty: {}", shape);
    ensure!(
        volume.spacing.is_valid(),
        "loaded volume has invalid spacing ({}, {}, {})",
        volume.spacing.x,
        volume.spacing.y,
        volume.spacing.z
    );
    Ok(())
}

/// Synthetic chest: air, an elliptical body of soft tissue, two lungs and a
/// liver block under the right lung
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhantomLoader {
    pub shape: VolumeShape,
    pub spacing: Spacing,
}

pub const AIR_HU: i16 = -1000;
pub const SOFT_TISSUE_HU: i16 = 40;
pub const LUNG_HU: i16 = -850;
pub const LIVER_HU: i16 = 90;

impl PhantomLoader {
    pub fn new(shape: VolumeShape, spacing: Spacing) -> Self {
        Self { shape, spacing }
    }

    /// Centre and radii of a lung in voxel units, (y, x)
    pub fn lung_ellipse(&self, left: bool) -> ((f64, f64), (f64, f64)) {
        let (ny, nx) = (self.shape.y as f64, self.shape.x as f64);
        let cx = if left { 0.32 * nx } else { 0.68 * nx };
        ((0.45 * ny, cx), (0.22 * ny, 0.12 * nx))
    }

    fn intensity(&self, z: usize, y: usize, x: usize) -> i16 {
        let (ny, nx, nz) = (
            self.shape.y as f64,
            self.shape.x as f64,
            self.shape.z as f64,
        );
        let (fy, fx, fz) = (y as f64, x as f64, z as f64);
        let inside = |(cy, cx): (f64, f64), (ry, rx): (f64, f64)| {
            let dy = (fy - cy) / ry;
            let dx = (fx - cx) / rx;
            dy * dy + dx * dx <= 1.0
        };

        if !inside((0.5 * ny, 0.5 * nx), (0.42 * ny, 0.46 * nx)) {
            return AIR_HU;
        }
        // small deterministic texture so thresholds see realistic spread
        let texture = ((z * 31 + y * 17 + x * 7) % 21) as i16 - 10;
        let in_chest = fz >= 0.1 * nz && fz <= 0.9 * nz;
        for left in [true, false] {
            let (center, radii) = self.lung_ellipse(left);
            if in_chest && inside(center, radii) {
                return LUNG_HU + texture;
            }
        }
        if fz < 0.3 * nz && inside((0.7 * ny, 0.4 * nx), (0.12 * ny, 0.2 * nx)) {
            return LIVER_HU + texture;
        }
        SOFT_TISSUE_HU + texture
    }
}

impl VolumeLoader for PhantomLoader {
    fn describe(&self) -> String {
        format!("phantom {}", self.shape)
    }

    fn load(self, reporter: &JobReporter) -> anyhow::Result<Volume> {
        let VolumeShape { z: depth, y: rows, x: cols } = self.shape;
        ensure!(
            depth > 0 && rows > 0 && cols > 0,
            "phantom shape must be non-empty, got {}",
            self.shape
        );

        let mut data = Array3::<i16>::zeros((depth, rows, cols));
        for z in 0..depth {
            for y in 0..rows {
                for x in 0..cols {
                    data[[z, y, x]] = self.intensity(z, y, x);
                }
            }
            reporter.progress(
                ((z + 1) * 100 / depth) as u32,
                format!("slice {}/{}", z + 1, depth),
            );
        }
        reporter.log(format!("Generated {}", self.describe()));

        let volume = Volume::new(data, self.spacing);
        check_volume(&volume)?;
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phantom_shape_and_tissues() {
        let loader = PhantomLoader::new(VolumeShape::new(10, 64, 64), Spacing::default());
        let volume = loader.load(&JobReporter::detached()).unwrap();
        assert_eq!(volume.shape(), VolumeShape::new(10, 64, 64));
        assert_eq!(volume.data[[5, 0, 0]], AIR_HU);

        let ((cy, cx), _) = loader.lung_ellipse(true);
        let lung = volume.data[[5, cy as usize, cx as usize]];
        assert!((LUNG_HU - 10..=LUNG_HU + 10).contains(&lung));

        let (lo, hi) = volume.intensity_range().unwrap();
        assert_eq!(lo, AIR_HU);
        assert!(hi > SOFT_TISSUE_HU);
    }

    #[test]
    fn test_empty_phantom_fails() {
        let loader = PhantomLoader::new(VolumeShape::new(0, 8, 8), Spacing::default());
        assert!(loader.load(&JobReporter::detached()).is_err());
    }

    #[test]
    fn test_closure_loader_and_check() {
        let loader = |_: &JobReporter| {
            Ok::<_, anyhow::Error>(Volume::new(Array3::zeros((2, 2, 2)), Spacing::default()))
        };
        assert_eq!(loader.describe(), "volume");
        assert!(loader.load(&JobReporter::detached()).is_ok());

        let bad = Volume::new(Array3::zeros((2, 2, 2)), Spacing::new(1.0, -1.0, 1.0));
        assert!(check_volume(&bad).is_err());
    }
}
