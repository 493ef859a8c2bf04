//! Writing results to disk
//!
//! This module contains:
//! - JSON export of the operation history
//! - MetaImage (`.mha`) export of a mask with the volume's geometry

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::{Mask, Spacing, Volume};
use crate::masks::OperationRecord;

#[derive(Serialize)]
struct HistoryDocument<'a> {
    exported_at: DateTime<Local>,
    record_count: usize,
    records: &'a [OperationRecord],
}

/// Write the history as pretty JSON
pub fn export_history(records: &[OperationRecord], path: &Path) -> Result<()> {
    let document = HistoryDocument {
        exported_at: Local::now(),
        record_count: records.len(),
        records,
    };
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write history file: {}", path.display()))?;
    log::info!("Exported {} history records to {}", records.len(), path.display());
    Ok(())
}

/// Geometry written into the image header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageGeometry {
    pub spacing: Spacing,
    pub origin: [f64; 3],
    pub direction: [f64; 9],
}

impl From<&Volume> for ImageGeometry {
    fn from(volume: &Volume) -> Self {
        Self {
            spacing: volume.spacing,
            origin: volume.origin,
            direction: volume.direction,
        }
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn metaimage_header(mask: &Mask, geometry: &ImageGeometry) -> String {
    let (z, y, x) = mask.dim();
    let spacing = geometry.spacing;
    [
        "ObjectType = Image".to_string(),
        "NDims = 3".to_string(),
        "BinaryData = True".to_string(),
        "BinaryDataByteOrderMSB = False".to_string(),
        "CompressedData = False".to_string(),
        format!("TransformMatrix = {}", join(&geometry.direction)),
        format!("Offset = {}", join(&geometry.origin)),
        "CenterOfRotation = 0 0 0".to_string(),
        format!("ElementSpacing = {}", join(&[spacing.x, spacing.y, spacing.z])),
        format!("DimSize = {x} {y} {z}"),
        "ElementType = MET_UCHAR".to_string(),
        "ElementDataFile = LOCAL".to_string(),
    ]
    .join("\n")
        + "\n"
}

/// Write a mask as a single-file MetaImage with X varying fastest
pub fn save_mask(mask: &Mask, geometry: &ImageGeometry, path: &Path) -> Result<()> {
    ensure!(
        geometry.spacing.is_valid(),
        "cannot save a mask with non-positive spacing"
    );

    let file = File::create(path)
        .with_context(|| format!("Failed to create mask file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(metaimage_header(mask, geometry).as_bytes())?;

    // logical iteration order is Z, Y, X regardless of memory layout
    let voxels: Vec<u8> = mask.iter().map(|&v| u8::from(v != 0)).collect();
    writer.write_all(&voxels)?;
    writer
        .flush()
        .with_context(|| format!("Failed to write mask file: {}", path.display()))?;

    log::info!(
        "Saved {}x{}x{} mask to {}",
        mask.dim().0,
        mask.dim().1,
        mask.dim().2,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IDENTITY_DIRECTION, OrganKey};
    use crate::masks::{OperationHistory, RefinementStats};

    #[test]
    fn test_save_mask_header_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lung.mha");
        let mut mask = Mask::zeros((2, 3, 4));
        mask[[1, 2, 3]] = 1;
        mask[[0, 0, 1]] = 7;

        let geometry = ImageGeometry {
            spacing: Spacing::new(0.5, 0.5, 2.0),
            origin: [-10.0, 0.0, 5.5],
            direction: IDENTITY_DIRECTION,
        };
        save_mask(&mask, &geometry, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("DimSize = 4 3 2\n"));
        assert!(text.contains("ElementSpacing = 0.5 0.5 2\n"));
        assert!(text.contains("Offset = -10 0 5.5\n"));

        let marker = b"ElementDataFile = LOCAL\n";
        let start = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let payload = &bytes[start..];
        assert_eq!(payload.len(), 24);
        assert_eq!(payload[1], 1);
        assert_eq!(payload[23], 1);
        assert_eq!(payload.iter().filter(|&&b| b != 0).count(), 2);
    }

    #[test]
    fn test_save_mask_rejects_bad_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = ImageGeometry {
            spacing: Spacing::new(0.0, 1.0, 1.0),
            origin: [0.0; 3],
            direction: IDENTITY_DIRECTION,
        };
        assert!(save_mask(&Mask::zeros((1, 1, 1)), &geometry, &dir.path().join("x.mha")).is_err());
    }

    #[test]
    fn test_export_history_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut history = OperationHistory::new();
        history.append(OperationRecord::refinement(RefinementStats::new(
            OrganKey::from("lung"),
            Local::now(),
            100,
            120,
            Spacing::default(),
        )));

        export_history(history.records(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["record_count"], 1);
        assert_eq!(value["records"][0]["kind"], "refinement");
        assert_eq!(value["records"][0]["organ_key"], "lung");
        assert_eq!(value["records"][0]["stats"]["final_count"], 120);
    }

    #[test]
    fn test_export_history_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("history.json");
        assert!(export_history(&[], &path).is_err());
    }
}
