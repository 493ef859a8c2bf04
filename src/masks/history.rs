//! Append-only audit trail of completed operations

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::OrganKey;

use super::stats::{RefinementStats, SegmentationStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Segmentation,
    Refinement,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OperationStats {
    Segmentation(SegmentationStats),
    Refinement(RefinementStats),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Local>,
    pub kind: OperationKind,
    pub organ_key: OrganKey,
    pub stats: OperationStats,
}

impl OperationRecord {
    pub fn segmentation(stats: SegmentationStats) -> Self {
        Self {
            timestamp: stats.timestamp,
            kind: OperationKind::Segmentation,
            organ_key: stats.organ_key.clone(),
            stats: OperationStats::Segmentation(stats),
        }
    }

    pub fn refinement(stats: RefinementStats) -> Self {
        Self {
            timestamp: stats.timestamp,
            kind: OperationKind::Refinement,
            organ_key: stats.organ_key.clone(),
            stats: OperationStats::Refinement(stats),
        }
    }
}

/// Ordered log of completed operations.
///
/// Records can only be appended by the crate and are never edited or removed.
#[derive(Debug, Default)]
pub struct OperationHistory {
    records: Vec<OperationRecord>,
}

impl OperationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, record: OperationRecord) {
        log::debug!(
            "history: {:?} for {} at {}",
            record.kind,
            record.organ_key,
            record.timestamp.to_rfc3339()
        );
        self.records.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OperationRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&OperationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a OperationHistory {
    type Item = &'a OperationRecord;
    type IntoIter = std::slice::Iter<'a, OperationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Spacing;

    fn refinement(organ: &str) -> OperationRecord {
        OperationRecord::refinement(RefinementStats::new(
            OrganKey::from(organ),
            Local::now(),
            10,
            12,
            Spacing::default(),
        ))
    }

    #[test]
    fn test_append_preserves_order() {
        let mut history = OperationHistory::new();
        history.append(refinement("lung"));
        history.append(refinement("liver"));
        let organs: Vec<_> = history.iter().map(|r| r.organ_key.as_str()).collect();
        assert_eq!(organs, ["lung", "liver"]);
        assert_eq!(history.last().unwrap().kind, OperationKind::Refinement);
    }

    #[test]
    fn test_record_serializes_kind_lowercase() {
        let json = serde_json::to_value(refinement("lung")).unwrap();
        assert_eq!(json["kind"], "refinement");
        assert_eq!(json["organ_key"], "lung");
        assert_eq!(json["stats"]["final_count"], 12);
    }
}
