//! Workflow controller
//!
//! Owns every piece of session state and is the only place it changes. Jobs
//! run on worker threads and report back through their channel; the host
//! applies those reports by calling `poll_events` (or `wait_for_job` when it
//! has nothing else to do).

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;

use crate::config::AppConfig;
use crate::domain::{CombinedRoi3D, OrganKey, Rect2D, Volume, VolumeShape, count_voxels};
use crate::error::WorkflowError;
use crate::export::{self, ImageGeometry};
use crate::jobs::{JobEvent, JobId, JobKind, JobOutput, JobSlot};
use crate::masks::{
    MaskStatistics, MaskStore, OperationHistory, OperationRecord, RefinementStats,
    SegmentationStats, mask_statistics,
};
use crate::models::segmenter::check_mask_shape;
use crate::models::{ModelRegistry, SegmentationRequest, Segmenter};
use crate::refine::{MorphologyRefiner, RefinementParams, Refiner};
use crate::session::{
    Capability, CapabilitySet, RoiManager, Trigger, WorkflowState, WorkflowStateMachine,
};

use super::activity::ActivityLog;
use super::loader::{VolumeLoader, check_volume};

/// Notification for the host after a job event has been applied
#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowEvent {
    Progress {
        kind: JobKind,
        percent: u8,
        message: String,
    },
    Log {
        kind: JobKind,
        line: String,
    },
    VolumeLoaded {
        shape: VolumeShape,
    },
    SegmentationFinished {
        organ_key: OrganKey,
        statistics: MaskStatistics,
    },
    RefinementFinished {
        organ_key: OrganKey,
        improvement_percent: f64,
    },
    JobFailed {
        kind: JobKind,
        error: WorkflowError,
    },
}

impl WorkflowEvent {
    /// Last event of a job
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            WorkflowEvent::Progress { .. } | WorkflowEvent::Log { .. }
        )
    }
}

pub struct WorkflowController {
    config: AppConfig,
    machine: WorkflowStateMachine,
    roi: RoiManager,
    masks: MaskStore,
    history: OperationHistory,
    jobs: JobSlot,
    volume: Option<Arc<Volume>>,
    registry: ModelRegistry,
    refiner: Arc<dyn Refiner>,
    activity: ActivityLog,
    params: RefinementParams,
}

impl WorkflowController {
    pub fn new(config: AppConfig) -> Self {
        let params = config.default_params();
        Self {
            config,
            machine: WorkflowStateMachine::new(),
            roi: RoiManager::new(),
            masks: MaskStore::new(),
            history: OperationHistory::new(),
            jobs: JobSlot::new(),
            volume: None,
            registry: ModelRegistry::with_builtin(),
            refiner: Arc::new(MorphologyRefiner),
            activity: ActivityLog::with_welcome(),
            params,
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn Refiner>) -> Self {
        self.refiner = refiner;
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.machine.state()
    }

    /// Actions the host should enable right now
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::resolve(self.state(), self.roi.roi1_defined())
    }

    pub fn is_busy(&self) -> bool {
        self.jobs.is_busy()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn volume(&self) -> Option<&Arc<Volume>> {
        self.volume.as_ref()
    }

    pub fn roi(&self) -> &RoiManager {
        &self.roi
    }

    pub fn masks(&self) -> &MaskStore {
        &self.masks
    }

    pub fn history(&self) -> &OperationHistory {
        &self.history
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    pub fn list_models(&self) -> Vec<&str> {
        self.registry.list_models()
    }

    /// Parameters the next refinement will use unless told otherwise
    pub fn pending_params(&self) -> RefinementParams {
        self.params
    }

    fn require(&self, capability: Capability) -> Result<(), WorkflowError> {
        if self.capabilities().contains(capability) {
            Ok(())
        } else {
            Err(WorkflowError::Precondition(format!(
                "{capability:?} is not available in state {}",
                self.state()
            )))
        }
    }

    fn require_volume(&self) -> Result<Arc<Volume>, WorkflowError> {
        self.volume.clone().ok_or(WorkflowError::NoVolume)
    }

    /// Fail with `IllegalTransition` unless `trigger` fires from the current state
    fn require_edge(&self, trigger: Trigger) -> Result<(), WorkflowError> {
        if self.machine.can_fire(trigger) {
            Ok(())
        } else {
            Err(WorkflowError::IllegalTransition {
                from: self.state(),
                trigger,
            })
        }
    }

    /// Fire an edge that the controller has already established is legal
    fn transition(&mut self, trigger: Trigger) {
        let from = self.state();
        match self.machine.fire(trigger) {
            Ok(to) => log::debug!("{from} --{trigger}--> {to}"),
            Err(err) => log::error!("State machine out of sync: {err}"),
        }
    }

    // ---- loading ----

    /// Load a new volume on a worker thread
    pub fn dispatch_load<L: VolumeLoader>(&mut self, loader: L) -> Result<JobId, WorkflowError> {
        self.jobs.ensure_idle()?;
        self.require_edge(Trigger::LoadStart)?;

        let source = loader.describe();
        let id = self.jobs.start(JobKind::Load, move |reporter| {
            let volume = loader.load(reporter)?;
            check_volume(&volume)?;
            Ok(JobOutput::Volume(Box::new(volume)))
        })?;

        self.transition(Trigger::LoadStart);
        self.activity.info(format!("Loading {source}..."));
        log::info!("Loading {source}");
        Ok(id)
    }

    // ---- ROI ----

    /// Record ROI 1, returning whether both ROIs are now defined
    pub fn set_roi1(&mut self, slice_index: usize, rect: Rect2D) -> Result<bool, WorkflowError> {
        self.require(Capability::DrawRoi1)?;
        let volume = self.require_volume()?;
        if slice_index >= volume.shape().z {
            return Err(WorkflowError::InvalidGeometry(format!(
                "slice {slice_index} is outside a volume of {} slices",
                volume.shape().z
            )));
        }

        self.roi.set_roi1(slice_index, rect)?;
        self.activity
            .info(format!("ROI 1 set on slice {slice_index}: {rect}"));
        Ok(self.roi_updated())
    }

    /// Record ROI 2, resized to ROI 1. Returns the stored rectangle.
    pub fn set_roi2(&mut self, slice_index: usize, rect: Rect2D) -> Result<Rect2D, WorkflowError> {
        self.require(Capability::DrawRoi2)?;
        let volume = self.require_volume()?;
        let shape = volume.shape();
        if slice_index >= shape.z {
            return Err(WorkflowError::InvalidGeometry(format!(
                "slice {slice_index} is outside a volume of {} slices",
                shape.z
            )));
        }

        let adjusted = self.roi.set_roi2(slice_index, rect, shape)?;
        self.activity.info(format!(
            "ROI 2 set on slice {slice_index}: {adjusted} (resized to ROI 1)"
        ));
        self.roi_updated();
        Ok(adjusted)
    }

    fn roi_updated(&mut self) -> bool {
        let both = self.roi.has_both();
        if both && self.state() == WorkflowState::VolumeLoaded {
            self.transition(Trigger::RoiBothDefined);
            self.activity.info(self.roi.describe());
        }
        both
    }

    pub fn reset_roi(&mut self) -> Result<(), WorkflowError> {
        self.require(Capability::ResetRoi)?;
        self.require_edge(Trigger::RoiReset)?;
        self.roi.reset();
        self.transition(Trigger::RoiReset);
        self.activity.info("ROI reset");
        Ok(())
    }

    /// Box the next segmentation will be restricted to
    pub fn combined_roi(&mut self) -> Result<CombinedRoi3D, WorkflowError> {
        let volume = self.require_volume()?;
        self.roi.combined(volume.shape())
    }

    // ---- segmentation ----

    /// Segment with a registered model
    pub fn dispatch_segmentation(
        &mut self,
        model_name: &str,
        use_cpu: bool,
    ) -> Result<JobId, WorkflowError> {
        self.jobs.ensure_idle()?;
        self.require_edge(Trigger::SegmentStart)?;
        let volume = self.require_volume()?;
        self.roi.combined(volume.shape())?;
        let model = self
            .registry
            .get_instance(model_name, use_cpu)
            .ok_or_else(|| WorkflowError::ModelUnavailable(model_name.to_string()))?;
        self.dispatch_segmentation_with(model)
    }

    /// Segment with an already loaded model
    pub fn dispatch_segmentation_with(
        &mut self,
        model: Arc<dyn Segmenter>,
    ) -> Result<JobId, WorkflowError> {
        self.jobs.ensure_idle()?;
        self.require_edge(Trigger::SegmentStart)?;
        let volume = self.require_volume()?;
        let roi = self.roi.combined(volume.shape())?;
        model
            .validate(&volume, volume.spacing)
            .map_err(|err| WorkflowError::Segmentation(format!("{err:#}")))?;

        let name = model.display_name().to_string();
        let estimate = model.estimate_memory(volume.shape());
        log::info!(
            "Segmenting {} with {} on {}, ~{:.0} MiB",
            roi,
            name,
            model.backend().name(),
            estimate.estimated_total_mb
        );

        let id = self.jobs.start(JobKind::Segmentation, move |reporter| {
            let request = SegmentationRequest {
                volume: &volume,
                spacing: volume.spacing,
                origin: volume.origin,
                direction: volume.direction,
                roi: Some(roi),
            };
            let started = Instant::now();
            let output = model.segment(&request, reporter)?;
            check_mask_shape(&output.mask, volume.shape())?;

            let statistics = mask_statistics(&output.mask, volume.spacing);
            let stats = SegmentationStats {
                organ_key: model.organ_key(),
                model_name: model.display_name().to_string(),
                elapsed_time: started.elapsed().as_secs_f64(),
                timestamp: Local::now(),
                voxel_count: statistics.voxel_count,
                volume_ml: statistics.volume_ml,
                details: output.details,
            };
            Ok(JobOutput::Segmentation {
                mask: output.mask,
                stats,
            })
        })?;

        self.transition(Trigger::SegmentStart);
        self.activity
            .info(format!("Segmentation started: {name}, ROI {roi}"));
        Ok(id)
    }

    // ---- refinement ----

    /// Replace the pending parameters after range validation
    pub fn set_params(&mut self, params: RefinementParams) -> Result<(), WorkflowError> {
        self.require(Capability::TuneParameters)?;
        self.config.processing.parameter_ranges.validate(&params)?;
        self.params = params;
        Ok(())
    }

    /// Load a named processing preset into the pending parameters.
    ///
    /// Returns None, changing nothing, if the preset does not exist.
    pub fn apply_preset(&mut self, name: &str) -> Result<Option<RefinementParams>, WorkflowError> {
        self.require(Capability::ApplyPreset)?;
        match self.config.preset(name) {
            Some(params) => {
                self.params = params;
                self.activity.info(format!("Preset '{name}' applied"));
                Ok(Some(params))
            }
            None => {
                log::warn!("Unknown preset: {name}");
                self.activity.warn(format!("Unknown preset '{name}'"));
                Ok(None)
            }
        }
    }

    /// Refine an organ's base mask with `params`
    pub fn dispatch_refinement(
        &mut self,
        organ_key: &OrganKey,
        params: RefinementParams,
    ) -> Result<JobId, WorkflowError> {
        self.jobs.ensure_idle()?;
        self.require_edge(Trigger::RefineStart)?;
        self.config.processing.parameter_ranges.validate(&params)?;
        let volume = self.require_volume()?;
        let base = self
            .masks
            .get(organ_key)
            .ok_or_else(|| WorkflowError::UnknownOrgan(organ_key.clone()))?
            .base_mask
            .clone();

        let refiner = Arc::clone(&self.refiner);
        let organ = organ_key.clone();
        let id = self.jobs.start(JobKind::Refinement, move |reporter| {
            let base_count = count_voxels(&base);
            let mask = refiner.refine(&base, &volume, &params, reporter)?;
            check_mask_shape(&mask, volume.shape())?;
            let stats = RefinementStats::new(
                organ,
                Local::now(),
                base_count,
                count_voxels(&mask),
                volume.spacing,
            );
            Ok(JobOutput::Refinement { mask, stats })
        })?;

        self.params = params;
        self.transition(Trigger::RefineStart);
        self.activity.info(format!(
            "Refining {organ_key} with {}: HU [{}, {}], dilation {}, closing {}, fill holes {}",
            self.refiner.name(),
            params.hu_min,
            params.hu_max,
            params.dilation_iter,
            params.closing_size,
            params.fill_holes
        ));
        Ok(id)
    }

    /// Throw away refinements for an organ
    pub fn reset_to_base(&mut self, organ_key: &OrganKey) -> Result<(), WorkflowError> {
        self.require(Capability::ResetMask)?;
        self.masks.reset_to_base(organ_key)?;
        self.activity
            .info(format!("{organ_key}: mask reset to segmentation result"));
        Ok(())
    }

    pub fn statistics(&self, organ_key: &OrganKey) -> Result<MaskStatistics, WorkflowError> {
        let volume = self.volume.as_ref().ok_or(WorkflowError::NoVolume)?;
        self.masks.statistics(organ_key, volume.spacing)
    }

    // ---- export ----

    /// Write an organ's current mask as MetaImage
    pub fn save_mask(&mut self, organ_key: &OrganKey, path: &Path) -> anyhow::Result<()> {
        self.require(Capability::SaveMask)?;
        let volume = self.require_volume()?;
        let version = self
            .masks
            .get(organ_key)
            .ok_or_else(|| WorkflowError::UnknownOrgan(organ_key.clone()))?;
        export::save_mask(
            &version.current_mask,
            &ImageGeometry::from(volume.as_ref()),
            path,
        )?;
        self.activity
            .info(format!("{organ_key} mask saved to {}", path.display()));
        Ok(())
    }

    pub fn export_history(&mut self, path: &Path) -> anyhow::Result<()> {
        self.require(Capability::ExportHistory)?;
        export::export_history(self.history.records(), path)?;
        self.activity
            .info(format!("History exported to {}", path.display()));
        Ok(())
    }

    // ---- event application ----

    /// Apply every event already queued by the active job
    pub fn poll_events(&mut self) -> Vec<WorkflowEvent> {
        self.jobs
            .drain()
            .into_iter()
            .map(|(kind, event)| self.apply(kind, event))
            .collect()
    }

    /// Block until the active job ends, applying its events in order
    pub fn wait_for_job(&mut self) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Some((kind, event)) = self.jobs.wait_next() {
            let applied = self.apply(kind, event);
            let done = applied.is_terminal();
            events.push(applied);
            if done {
                break;
            }
        }
        events
    }

    fn apply(&mut self, kind: JobKind, event: JobEvent) -> WorkflowEvent {
        match event {
            JobEvent::Progress { percent, message } => WorkflowEvent::Progress {
                kind,
                percent,
                message,
            },
            JobEvent::Log(line) => {
                self.activity.info(line.clone());
                WorkflowEvent::Log { kind, line }
            }
            JobEvent::Done(output) => self.apply_output(output),
            JobEvent::Error(message) => self.fail(kind, message),
        }
    }

    fn apply_output(&mut self, output: JobOutput) -> WorkflowEvent {
        match output {
            JobOutput::Volume(volume) => {
                let shape = volume.shape();
                self.volume = Some(Arc::from(volume));
                self.roi.reset();
                self.masks.clear();
                self.transition(Trigger::LoadSuccess);
                self.activity.info(format!("Volume loaded: {shape}"));
                log::info!("Volume loaded: {shape}");
                WorkflowEvent::VolumeLoaded { shape }
            }
            JobOutput::Segmentation { mask, stats } => {
                let organ_key = stats.organ_key.clone();
                let statistics = MaskStatistics {
                    voxel_count: stats.voxel_count,
                    volume_ml: stats.volume_ml,
                };
                self.activity.info(format!(
                    "Segmentation done: {} ({}), {} voxels, {:.1} ml in {:.2}s",
                    organ_key,
                    stats.model_name,
                    stats.voxel_count,
                    stats.volume_ml,
                    stats.elapsed_time
                ));
                self.masks.record_segmentation(organ_key.clone(), mask);
                self.history.append(OperationRecord::segmentation(stats));
                self.transition(Trigger::SegmentSuccess);
                WorkflowEvent::SegmentationFinished {
                    organ_key,
                    statistics,
                }
            }
            JobOutput::Refinement { mask, stats } => {
                let organ_key = stats.organ_key.clone();
                if let Err(err) = self.masks.record_refinement(&organ_key, mask) {
                    return self.fail(JobKind::Refinement, err.to_string());
                }
                let improvement_percent = stats.improvement_percent;
                self.activity.info(format!(
                    "Refinement done: {} {} -> {} voxels ({:+.1}%), {:.1} ml",
                    organ_key,
                    stats.base_count,
                    stats.final_count,
                    improvement_percent,
                    stats.volume_ml
                ));
                self.history.append(OperationRecord::refinement(stats));
                self.transition(Trigger::RefineSuccess);
                WorkflowEvent::RefinementFinished {
                    organ_key,
                    improvement_percent,
                }
            }
        }
    }

    fn fail(&mut self, kind: JobKind, message: String) -> WorkflowEvent {
        let (error, trigger) = match kind {
            JobKind::Load => (WorkflowError::Load(message), Trigger::LoadError),
            JobKind::Segmentation => (WorkflowError::Segmentation(message), Trigger::SegmentError),
            JobKind::Refinement => (WorkflowError::Refinement(message), Trigger::RefineError),
        };
        log::error!("{error}");
        self.activity.error(error.to_string());
        self.transition(trigger);
        WorkflowEvent::JobFailed { kind, error }
    }
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
