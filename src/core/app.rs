//! Headless demo session
//!
//! Walks the whole workflow on a synthetic chest phantom: load, draw both
//! ROIs, segment the left lung, refine with a preset, reset, export.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use crate::config;
use crate::core::{PhantomLoader, WorkflowController, WorkflowEvent};
use crate::domain::{OrganKey, Rect2D, Spacing, VolumeShape};

const DEMO_MODEL: &str = "Lung (HU threshold)";
const DEMO_PRESET: &str = "balanced";

/// Command line: `roiseg [OUTPUT_DIR] [CONFIG]`
pub fn run() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join("roiseg")))
        .unwrap_or_else(|| PathBuf::from("."));
    let config_path = args.next().map(PathBuf::from);

    let handle = config::load(config_path.as_deref());
    let mut ctrl = WorkflowController::new(handle.config);
    for warning in &handle.warnings {
        println!("config warning: {warning}");
    }

    let result = session(&mut ctrl, &output_dir);
    for entry in ctrl.activity().entries() {
        println!("{entry}");
    }
    result
}

fn session(ctrl: &mut WorkflowController, output_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let phantom = PhantomLoader::new(VolumeShape::new(40, 128, 128), Spacing::new(0.8, 0.8, 2.5));
    ctrl.dispatch_load(phantom)?;
    drive(ctrl)?;

    // outline the left lung on an upper slice, then a sloppy smaller box lower down
    let ((cy, cx), (ry, rx)) = phantom.lung_ellipse(true);
    let (cy, cx, ry, rx) = (cy as i64, cx as i64, ry as i64, rx as i64);
    ctrl.set_roi1(8, Rect2D::new(cx - rx, cx + rx, cy - ry, cy + ry)?)?;
    ctrl.set_roi2(32, Rect2D::new(cx - 3, cx + 5, cy - 4, cy + 2)?)?;
    log::info!("{}", ctrl.roi().describe());

    ctrl.dispatch_segmentation(DEMO_MODEL, false)?;
    drive(ctrl)?;

    let organ = OrganKey::from("lung");
    if ctrl.apply_preset(DEMO_PRESET)?.is_none() {
        log::warn!("Preset {DEMO_PRESET} missing from config, using current parameters");
    }
    ctrl.dispatch_refinement(&organ, ctrl.pending_params())?;
    drive(ctrl)?;

    let refined = ctrl.statistics(&organ)?;
    ctrl.save_mask(&organ, &output_dir.join("lung_refined.mha"))?;
    ctrl.reset_to_base(&organ)?;
    let base = ctrl.statistics(&organ)?;
    println!(
        "lung: base {} voxels ({:.1} ml), refined {} voxels ({:.1} ml)",
        base.voxel_count, base.volume_ml, refined.voxel_count, refined.volume_ml
    );

    ctrl.save_mask(&organ, &output_dir.join("lung_base.mha"))?;
    ctrl.export_history(&output_dir.join("history.json"))?;
    Ok(())
}

/// Apply events until the running job ends, failing on a job error
fn drive(ctrl: &mut WorkflowController) -> anyhow::Result<()> {
    for event in ctrl.wait_for_job() {
        match event {
            WorkflowEvent::Progress {
                kind,
                percent,
                message,
            } => log::debug!("{kind} {percent:>3}% {message}"),
            WorkflowEvent::JobFailed { error, .. } => bail!(error),
            WorkflowEvent::Log { .. } => {}
            other => log::info!("{other:?}"),
        }
    }
    Ok(())
}
