//! Mask refinement
//!
//! Refinement always starts from an organ's base mask, never from a previous
//! refinement, so repeated tuning does not accumulate drift.

use anyhow::{bail, ensure};
use ndarray::{ArrayView1, ArrayViewMut1, Axis, Zip, s};
use serde::{Deserialize, Serialize};

use crate::domain::{Mask, Volume, VolumeShape};
use crate::jobs::JobReporter;

/// Operator-tunable refinement parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementParams {
    pub hu_min: i32,
    pub hu_max: i32,
    /// Number of 3x3x3 dilations applied to the base mask before windowing
    pub dilation_iter: u32,
    /// Edge length of the closing cube, 0 or 1 disables closing
    pub closing_size: u32,
    /// Fill enclosed background on every axial slice
    pub fill_holes: bool,
}

impl Default for RefinementParams {
    fn default() -> Self {
        Self {
            hu_min: -1000,
            hu_max: -300,
            dilation_iter: 2,
            closing_size: 3,
            fill_holes: true,
        }
    }
}

/// A refinement algorithm
pub trait Refiner: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a new mask from `base`. Must not return a mask of a different shape.
    fn refine(
        &self,
        base: &Mask,
        volume: &Volume,
        params: &RefinementParams,
        reporter: &JobReporter,
    ) -> anyhow::Result<Mask>;
}

/// Dilate, intensity window, close, fill holes
#[derive(Clone, Copy, Debug, Default)]
pub struct MorphologyRefiner;

impl Refiner for MorphologyRefiner {
    fn name(&self) -> &str {
        "morphology"
    }

    fn refine(
        &self,
        base: &Mask,
        volume: &Volume,
        params: &RefinementParams,
        reporter: &JobReporter,
    ) -> anyhow::Result<Mask> {
        let shape = volume.shape();
        if VolumeShape::from(base.dim()) != shape {
            bail!(
                "base mask {} does not match volume {}",
                VolumeShape::from(base.dim()),
                shape
            );
        }
        ensure!(
            params.hu_min < params.hu_max,
            "hu_min ({}) must be below hu_max ({})",
            params.hu_min,
            params.hu_max
        );

        reporter.progress(10, format!("Dilating base mask x{}", params.dilation_iter));
        let mut region = base.clone();
        for _ in 0..params.dilation_iter {
            region = dilate(&region, 1);
        }

        reporter.progress(40, format!("HU window [{}, {}]", params.hu_min, params.hu_max));
        let (lo, hi) = (params.hu_min, params.hu_max);
        Zip::from(&mut region).and(&volume.data).for_each(|m, &hu| {
            let hu = i32::from(hu);
            if *m != 0 && !(lo..=hi).contains(&hu) {
                *m = 0;
            }
        });

        if params.closing_size > 1 {
            reporter.progress(60, format!("Closing (size {})", params.closing_size));
            region = close(&region, params.closing_size as usize);
        }

        if params.fill_holes {
            reporter.progress(85, "Filling holes");
            fill_holes_axial(&mut region);
        }

        reporter.progress(100, "Refinement done");
        Ok(region)
    }
}

fn max_of(window: ArrayView1<'_, u8>) -> u8 {
    window.iter().copied().max().unwrap_or(0)
}

fn min_of(window: ArrayView1<'_, u8>) -> u8 {
    window.iter().copied().min().unwrap_or(0)
}

/// Cube dilation with half-width `radius`
pub fn dilate(mask: &Mask, radius: usize) -> Mask {
    separable(mask, radius, radius, max_of)
}

/// Cube erosion with half-width `radius`, windows clipped at the border
pub fn erode(mask: &Mask, radius: usize) -> Mask {
    separable(mask, radius, radius, min_of)
}

/// Closing with a cube of edge `size`.
///
/// An even edge has no centre voxel; the cube then reaches one voxel further
/// towards higher indices, and the erosion uses its mirror image.
pub fn close(mask: &Mask, size: usize) -> Mask {
    let before = size.saturating_sub(1) / 2;
    let after = size / 2;
    let dilated = separable(mask, before, after, max_of);
    separable(&dilated, after, before, min_of)
}

fn separable(
    mask: &Mask,
    before: usize,
    after: usize,
    reduce: impl Fn(ArrayView1<'_, u8>) -> u8 + Copy,
) -> Mask {
    let mut current = mask.clone();
    for axis in 0..3 {
        let mut next = current.clone();
        Zip::from(current.lanes(Axis(axis)))
            .and(next.lanes_mut(Axis(axis)))
            .for_each(|src, dst| filter_lane(src, dst, before, after, reduce));
        current = next;
    }
    current
}

fn filter_lane(
    src: ArrayView1<'_, u8>,
    mut dst: ArrayViewMut1<'_, u8>,
    before: usize,
    after: usize,
    reduce: impl Fn(ArrayView1<'_, u8>) -> u8,
) {
    let n = src.len();
    for i in 0..n {
        let lo = i.saturating_sub(before);
        let hi = (i + after).min(n - 1);
        dst[i] = reduce(src.slice(s![lo..=hi]));
    }
}

/// Set background pixels not 4-connected to the slice border, per axial slice
pub fn fill_holes_axial(mask: &mut Mask) {
    let (depth, rows, cols) = mask.dim();
    if rows == 0 || cols == 0 {
        return;
    }

    for z in 0..depth {
        let mut plane = mask.index_axis_mut(Axis(0), z);
        let mut outside = vec![false; rows * cols];
        let mut stack = Vec::new();

        for y in 0..rows {
            for x in 0..cols {
                let border = y == 0 || x == 0 || y == rows - 1 || x == cols - 1;
                if border && plane[[y, x]] == 0 {
                    outside[y * cols + x] = true;
                    stack.push((y, x));
                }
            }
        }

        while let Some((y, x)) = stack.pop() {
            let neighbours = [
                (y.wrapping_sub(1), x),
                (y + 1, x),
                (y, x.wrapping_sub(1)),
                (y, x + 1),
            ];
            for (ny, nx) in neighbours {
                if ny >= rows || nx >= cols {
                    continue;
                }
                let idx = ny * cols + nx;
                if !outside[idx] && plane[[ny, nx]] == 0 {
                    outside[idx] = true;
                    stack.push((ny, nx));
                }
            }
        }

        for y in 0..rows {
            for x in 0..cols {
                if !outside[y * cols + x] {
                    plane[[y, x]] = 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Spacing, count_voxels};
    use ndarray::Array3;

    fn point_mask(dim: (usize, usize, usize), at: (usize, usize, usize)) -> Mask {
        let mut mask = Mask::zeros(dim);
        mask[[at.0, at.1, at.2]] = 1;
        mask
    }

    #[test]
    fn test_dilate_grows_cube() {
        let grown = dilate(&point_mask((5, 5, 5), (2, 2, 2)), 1);
        assert_eq!(count_voxels(&grown), 27);
        assert_eq!(grown[[1, 1, 1]], 1);
        assert_eq!(grown[[0, 2, 2]], 0);
    }

    #[test]
    fn test_erode_undoes_dilate_of_interior_block() {
        let mut mask = Mask::zeros((9, 9, 9));
        mask.slice_mut(s![3..6, 3..6, 3..6]).fill(1);
        let closed = erode(&dilate(&mask, 1), 1);
        assert_eq!(closed, mask);
    }

    #[test]
    fn test_close_uses_exact_edge_length() {
        // two voxels with a one-voxel gap along x
        let mut mask = Mask::zeros((5, 5, 9));
        mask[[2, 2, 3]] = 1;
        mask[[2, 2, 5]] = 1;

        let two = close(&mask, 2);
        assert_eq!(two[[2, 2, 4]], 1);
        assert_eq!(count_voxels(&two), 3);

        // a 3-cube closing also bridges the gap but leaves the same line
        let three = close(&mask, 3);
        assert_eq!(count_voxels(&three), 3);

        // a two-voxel gap needs an edge of 3
        let mut wide = Mask::zeros((5, 5, 9));
        wide[[2, 2, 2]] = 1;
        wide[[2, 2, 5]] = 1;
        assert_eq!(count_voxels(&close(&wide, 2)), 2);
        assert_eq!(count_voxels(&close(&wide, 3)), 4);
    }

    #[test]
    fn test_close_size_one_is_identity() {
        let mask = point_mask((3, 3, 3), (1, 1, 1));
        assert_eq!(close(&mask, 1), mask);
    }

    #[test]
    fn test_fill_holes_fills_enclosed_only() {
        let mut mask = Mask::zeros((1, 5, 5));
        mask.slice_mut(s![0, 1..4, 1..4]).fill(1);
        mask[[0, 2, 2]] = 0;
        fill_holes_axial(&mut mask);
        assert_eq!(mask[[0, 2, 2]], 1);
        assert_eq!(mask[[0, 0, 0]], 0);
        assert_eq!(count_voxels(&mask), 9);
    }

    #[test]
    fn test_refine_windows_dilated_base() {
        // HU -800 everywhere except a bright column at x=4
        let mut data = Array3::from_elem((3, 8, 8), -800i16);
        data.slice_mut(s![.., .., 4]).fill(100);
        let volume = Volume::new(data, Spacing::default());
        let base = point_mask((3, 8, 8), (1, 3, 3));

        let params = RefinementParams {
            hu_min: -1000,
            hu_max: -300,
            dilation_iter: 1,
            closing_size: 1,
            fill_holes: false,
        };
        let refined = MorphologyRefiner
            .refine(&base, &volume, &params, &JobReporter::detached())
            .unwrap();
        // 3x3x3 cube around (1,3,3) minus the x=4 plane
        assert_eq!(count_voxels(&refined), 18);
        assert_eq!(refined[[1, 3, 4]], 0);
    }

    #[test]
    fn test_refine_zero_dilation_keeps_base_inside_window() {
        let volume = Volume::new(Array3::from_elem((4, 4, 4), -700i16), Spacing::default());
        let base = point_mask((4, 4, 4), (1, 1, 1));
        let params = RefinementParams {
            dilation_iter: 0,
            closing_size: 1,
            fill_holes: false,
            ..RefinementParams::default()
        };
        let refined = MorphologyRefiner
            .refine(&base, &volume, &params, &JobReporter::detached())
            .unwrap();
        assert_eq!(refined, base);
    }

    #[test]
    fn test_refine_rejects_shape_mismatch() {
        let volume = Volume::new(Array3::zeros((4, 4, 4)), Spacing::default());
        let base = Mask::zeros((4, 4, 5));
        let result = MorphologyRefiner.refine(
            &base,
            &volume,
            &RefinementParams::default(),
            &JobReporter::detached(),
        );
        assert!(result.is_err());
    }
}
