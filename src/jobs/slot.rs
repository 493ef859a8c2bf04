//! Single-occupancy job slot with a direct reentrancy guard

use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::error::WorkflowError;

use super::events::{JobEvent, JobId, JobKind, JobOutput};
use super::worker::{JobReporter, spawn_job};

/// The job currently owning the slot
#[derive(Debug)]
pub struct ActiveJob {
    pub id: JobId,
    pub kind: JobKind,
    pub started_at: Instant,
    rx: Receiver<JobEvent>,
    handle: Option<JoinHandle<()>>,
}

/// Holds at most one running job.
///
/// The busy check here does not depend on the state machine, so a host that
/// ignores capability gating still cannot start two jobs.
#[derive(Debug, Default)]
pub struct JobSlot {
    active: Option<ActiveJob>,
    next_id: JobId,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveJob> {
        self.active.as_ref()
    }

    /// Fail with `Busy` if a job is running
    pub fn ensure_idle(&self) -> Result<(), WorkflowError> {
        match &self.active {
            Some(job) => Err(WorkflowError::Busy(job.kind)),
            None => Ok(()),
        }
    }

    /// Spawn `body` as the active job
    pub fn start<F>(&mut self, kind: JobKind, body: F) -> Result<JobId, WorkflowError>
    where
        F: FnOnce(&JobReporter) -> anyhow::Result<JobOutput> + Send + 'static,
    {
        self.ensure_idle()?;

        self.next_id += 1;
        let id = self.next_id;
        let (rx, handle) = spawn_job(id, kind, body).map_err(|err| {
            let msg = format!("could not start worker thread: {err}");
            match kind {
                JobKind::Load => WorkflowError::Load(msg),
                JobKind::Segmentation => WorkflowError::Segmentation(msg),
                JobKind::Refinement => WorkflowError::Refinement(msg),
            }
        })?;

        log::info!("Started {kind} job {id}");
        self.active = Some(ActiveJob {
            id,
            kind,
            started_at: Instant::now(),
            rx,
            handle: Some(handle),
        });
        Ok(id)
    }

    /// Take every event already queued by the active job without blocking.
    ///
    /// The slot is released once the terminal event has been taken.
    pub fn drain(&mut self) -> Vec<(JobKind, JobEvent)> {
        let mut events = Vec::new();
        let Some(job) = self.active.as_ref() else {
            return events;
        };
        let kind = job.kind;

        loop {
            match job.rx.try_recv() {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    events.push((kind, event));
                    if terminal {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => return events,
                Err(TryRecvError::Disconnected) => {
                    events.push((kind, lost_worker(job)));
                    break;
                }
            }
        }

        self.finish();
        events
    }

    /// Block until the active job emits its next event.
    ///
    /// Returns None when no job is active.
    pub fn wait_next(&mut self) -> Option<(JobKind, JobEvent)> {
        let job = self.active.as_ref()?;
        let kind = job.kind;
        let event = job.rx.recv().unwrap_or_else(|_| lost_worker(job));
        if event.is_terminal() {
            self.finish();
        }
        Some((kind, event))
    }

    fn finish(&mut self) {
        if let Some(mut job) = self.active.take() {
            log::info!(
                "{} job {} finished after {:.2}s",
                job.kind,
                job.id,
                job.started_at.elapsed().as_secs_f64()
            );
            if let Some(handle) = job.handle.take()
                && handle.join().is_err()
            {
                log::warn!("{} job {} thread did not exit cleanly", job.kind, job.id);
            }
        }
    }
}

fn lost_worker(job: &ActiveJob) -> JobEvent {
    log::error!("{} job {} dropped its channel without a result", job.kind, job.id);
    JobEvent::Error("worker exited without reporting a result".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Spacing, Volume};

    fn volume_output() -> JobOutput {
        JobOutput::Volume(Box::new(Volume::new(
            ndarray::Array3::zeros((2, 2, 2)),
            Spacing::default(),
        )))
    }

    #[test]
    fn test_second_start_is_busy() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let mut slot = JobSlot::new();
        slot.start(JobKind::Load, move |_| {
            let _ = gate_rx.recv();
            Ok(volume_output())
        })
        .unwrap();

        let err = slot
            .start(JobKind::Segmentation, |_| Ok(volume_output()))
            .unwrap_err();
        assert_eq!(err, WorkflowError::Busy(JobKind::Load));

        gate_tx.send(()).unwrap();
        let (_, event) = loop {
            let (kind, event) = slot.wait_next().unwrap();
            if event.is_terminal() {
                break (kind, event);
            }
        };
        assert!(matches!(event, JobEvent::Done(_)));
        assert!(!slot.is_busy());
        assert!(slot.wait_next().is_none());
    }

    #[test]
    fn test_drain_releases_slot_after_terminal() {
        let mut slot = JobSlot::new();
        slot.start(JobKind::Load, |reporter| {
            reporter.progress(50, "half");
            Ok(volume_output())
        })
        .unwrap();

        let mut seen = Vec::new();
        while slot.is_busy() {
            seen.extend(slot.drain());
            std::thread::yield_now();
        }
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0].1, JobEvent::Progress { percent: 50, .. }));
        assert!(seen[1].1.is_terminal());
        assert!(slot.drain().is_empty());
    }

    #[test]
    fn test_job_ids_increase() {
        let mut slot = JobSlot::new();
        let first = slot.start(JobKind::Load, |_| Ok(volume_output())).unwrap();
        while slot.wait_next().is_some_and(|(_, e)| !e.is_terminal()) {}
        let second = slot.start(JobKind::Load, |_| Ok(volume_output())).unwrap();
        assert!(second > first);
        while slot.wait_next().is_some_and(|(_, e)| !e.is_terminal()) {}
    }
}
