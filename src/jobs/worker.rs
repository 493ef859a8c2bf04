//! Worker thread spawning and the reporter handed to job bodies

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use super::events::{JobEvent, JobId, JobKind, JobOutput};

/// Handle a job body uses to report progress and log lines.
///
/// Sends are best effort: if the coordinator has gone away the job simply
/// runs to completion unobserved.
#[derive(Clone, Debug)]
pub struct JobReporter {
    tx: Sender<JobEvent>,
}

impl JobReporter {
    pub(crate) fn new(tx: Sender<JobEvent>) -> Self {
        Self { tx }
    }

    /// Report progress, clamped to 0..=100
    pub fn progress(&self, percent: u32, message: impl Into<String>) {
        let percent = percent.min(100) as u8;
        let _ = self.tx.send(JobEvent::Progress {
            percent,
            message: message.into(),
        });
    }

    pub fn log(&self, line: impl Into<String>) {
        let _ = self.tx.send(JobEvent::Log(line.into()));
    }

    /// Reporter whose events go nowhere, for running job bodies inline
    pub fn detached() -> Self {
        let (tx, _rx) = crossbeam_channel::unbounded();
        Self { tx }
    }
}

/// Run `body` on a dedicated thread.
///
/// The terminal event is sent on the same channel after `body` returns, so
/// every progress and log event the body emitted is received first. A panic
/// in the body becomes an `Error` event.
pub fn spawn_job<F>(
    id: JobId,
    kind: JobKind,
    body: F,
) -> std::io::Result<(Receiver<JobEvent>, JoinHandle<()>)>
where
    F: FnOnce(&JobReporter) -> anyhow::Result<JobOutput> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let reporter = JobReporter::new(tx.clone());

    let handle = thread::Builder::new()
        .name(format!("roiseg-{kind}-{id}"))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&reporter)));
            let terminal = match outcome {
                Ok(Ok(output)) => JobEvent::Done(output),
                Ok(Err(err)) => JobEvent::Error(format!("{err:#}")),
                Err(payload) => JobEvent::Error(panic_message(payload.as_ref())),
            };
            if tx.send(terminal).is_err() {
                log::warn!("{kind} job {id} finished after its receiver was dropped");
            }
        })?;

    Ok((rx, handle))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("worker panicked: {detail}")
}
