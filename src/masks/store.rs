//! Versioned per-organ mask store
//!
//! Each organ keeps the untouched output of its latest segmentation (`base`)
//! and the mask refinement works on (`current`). Only the coordinator writes
//! here, and only after a job has fully succeeded.

use std::collections::BTreeMap;

use crate::domain::{Mask, OrganKey, Spacing};
use crate::error::WorkflowError;

use super::stats::{MaskStatistics, mask_statistics};

#[derive(Clone, Debug, PartialEq)]
pub struct MaskVersion {
    pub organ_key: OrganKey,
    pub base_mask: Mask,
    pub current_mask: Mask,
}

#[derive(Debug, Default)]
pub struct MaskStore {
    versions: BTreeMap<OrganKey, MaskVersion>,
}

impl MaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both base and current for `organ_key`
    pub fn record_segmentation(&mut self, organ_key: OrganKey, mask: Mask) {
        let version = MaskVersion {
            organ_key: organ_key.clone(),
            current_mask: mask.clone(),
            base_mask: mask,
        };
        if self.versions.insert(organ_key.clone(), version).is_some() {
            log::info!("Replaced base mask for {}", organ_key);
        }
    }

    /// Replace only the current mask
    pub fn record_refinement(
        &mut self,
        organ_key: &OrganKey,
        mask: Mask,
    ) -> Result<(), WorkflowError> {
        let version = self.version_mut(organ_key)?;
        version.current_mask = mask;
        Ok(())
    }

    /// Restore current to a copy of base
    pub fn reset_to_base(&mut self, organ_key: &OrganKey) -> Result<(), WorkflowError> {
        let version = self.version_mut(organ_key)?;
        version.current_mask = version.base_mask.clone();
        Ok(())
    }

    /// Voxel count and volume of the current mask
    pub fn statistics(
        &self,
        organ_key: &OrganKey,
        spacing: Spacing,
    ) -> Result<MaskStatistics, WorkflowError> {
        let version = self
            .get(organ_key)
            .ok_or_else(|| WorkflowError::UnknownOrgan(organ_key.clone()))?;
        Ok(mask_statistics(&version.current_mask, spacing))
    }

    pub fn get(&self, organ_key: &OrganKey) -> Option<&MaskVersion> {
        self.versions.get(organ_key)
    }

    pub fn contains(&self, organ_key: &OrganKey) -> bool {
        self.versions.contains_key(organ_key)
    }

    /// Organs with a recorded segmentation, sorted by key
    pub fn organs(&self) -> impl Iterator<Item = &OrganKey> {
        self.versions.keys()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Drop every version, used when a new volume replaces the old one
    pub fn clear(&mut self) {
        self.versions.clear();
    }

    fn version_mut(&mut self, organ_key: &OrganKey) -> Result<&mut MaskVersion, WorkflowError> {
        self.versions
            .get_mut(organ_key)
            .ok_or_else(|| WorkflowError::UnknownOrgan(organ_key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: usize) -> Mask {
        let mut mask = Mask::zeros((4, 4, 4));
        mask.iter_mut().take(n).for_each(|v| *v = 1);
        mask
    }

    #[test]
    fn test_segmentation_sets_base_and_current() {
        let mut store = MaskStore::new();
        let lung = OrganKey::from("lung");
        store.record_segmentation(lung.clone(), filled(10));
        let version = store.get(&lung).unwrap();
        assert_eq!(version.base_mask, filled(10));
        assert_eq!(version.current_mask, filled(10));
    }

    #[test]
    fn test_refinement_requires_base() {
        let mut store = MaskStore::new();
        let err = store
            .record_refinement(&OrganKey::from("liver"), filled(3))
            .unwrap_err();
        assert_eq!(err, WorkflowError::UnknownOrgan(OrganKey::from("liver")));
        assert!(store.reset_to_base(&OrganKey::from("liver")).is_err());
    }

    #[test]
    fn test_refinement_keeps_base() {
        let mut store = MaskStore::new();
        let lung = OrganKey::from("lung");
        store.record_segmentation(lung.clone(), filled(10));
        store.record_refinement(&lung, filled(20)).unwrap();
        let version = store.get(&lung).unwrap();
        assert_eq!(version.base_mask, filled(10));
        assert_eq!(version.current_mask, filled(20));
    }

    #[test]
    fn test_reset_to_base_after_refinements() {
        let mut store = MaskStore::new();
        let lung = OrganKey::from("lung");
        store.record_segmentation(lung.clone(), filled(10));
        for n in [5, 30, 64] {
            store.record_refinement(&lung, filled(n)).unwrap();
        }
        store.reset_to_base(&lung).unwrap();
        let version = store.get(&lung).unwrap();
        assert_eq!(version.current_mask, version.base_mask);

        // deep copy: refining again must not touch base
        store.record_refinement(&lung, filled(1)).unwrap();
        assert_eq!(store.get(&lung).unwrap().base_mask, filled(10));
    }

    #[test]
    fn test_new_segmentation_replaces_base() {
        let mut store = MaskStore::new();
        let lung = OrganKey::from("lung");
        store.record_segmentation(lung.clone(), filled(10));
        store.record_refinement(&lung, filled(12)).unwrap();
        store.record_segmentation(lung.clone(), filled(40));
        store.reset_to_base(&lung).unwrap();
        assert_eq!(store.get(&lung).unwrap().current_mask, filled(40));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_statistics_use_current() {
        let mut store = MaskStore::new();
        let lung = OrganKey::from("lung");
        store.record_segmentation(lung.clone(), filled(10));
        store.record_refinement(&lung, filled(8)).unwrap();
        let stats = store.statistics(&lung, Spacing::new(10.0, 10.0, 10.0)).unwrap();
        assert_eq!(stats.voxel_count, 8);
        assert_eq!(stats.volume_ml, 8.0);
    }

    #[test]
    fn test_organs_sorted_and_clear() {
        let mut store = MaskStore::new();
        store.record_segmentation(OrganKey::from("lung"), filled(1));
        store.record_segmentation(OrganKey::from("liver"), filled(1));
        let keys: Vec<_> = store.organs().map(|k| k.as_str().to_string()).collect();
        assert_eq!(keys, ["liver", "lung"]);
        store.clear();
        assert!(store.is_empty());
    }
}
