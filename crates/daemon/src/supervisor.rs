//! Worker supervisor for the NVR daemon
//!
//! One supervisor task per camera owns that camera's capture process:
//!
//! ```text
//! Starting -> Running -> Backoff -> Starting -> ...
//!     \          \          \
//!      +----------+----------+--> Stopped   (stop signal)
//! ```
//!
//! The task talks to the rest of the daemon only through its
//! [`WorkerControl`]: a single-shot stop signal in, a status channel out.

use crate::backoff::{BackoffPolicy, RetryState};
use crate::camera::CameraRecord;
use crate::capture::{build_capture_invocation, CaptureError, CaptureProcess, Launcher};
use crate::config::RecordingConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{info, warn};

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Building the invocation and launching the process
    Starting,
    /// Process is alive
    Running,
    /// Waiting before the next start attempt
    Backoff,
    /// Terminal state, nothing is running
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Backoff => write!(f, "backoff"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of a worker's lifecycle and retry state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// Consecutive unexpected exits since the last sustained run
    pub failures: u32,
    /// Current restart delay in seconds
    pub backoff_secs: u64,
    /// OS process id while running
    pub pid: Option<u32>,
}

impl WorkerStatus {
    fn starting() -> Self {
        Self {
            state: WorkerState::Starting,
            failures: 0,
            backoff_secs: 0,
            pid: None,
        }
    }
}

/// Error type for a single start attempt
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot build capture command: {0}")]
    Capture(#[from] CaptureError),

    #[error("failed to spawn capture process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Registry-side half of a worker.
///
/// Dropping the handle without calling [`WorkerHandle::signal_stop`] also
/// stops the worker, since the stop channel closes.
#[derive(Debug)]
pub struct WorkerHandle {
    camera: CameraRecord,
    stop: Option<oneshot::Sender<()>>,
    status: watch::Receiver<WorkerStatus>,
}

/// Supervisor-side half of a worker
#[derive(Debug)]
pub struct WorkerControl {
    pub(crate) stop: oneshot::Receiver<()>,
    pub(crate) status: watch::Sender<WorkerStatus>,
}

impl WorkerHandle {
    /// Create the two halves for a worker recording `camera`.
    pub fn new(camera: CameraRecord) -> (Self, WorkerControl) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(WorkerStatus::starting());
        (
            Self {
                camera,
                stop: Some(stop_tx),
                status: status_rx,
            },
            WorkerControl {
                stop: stop_rx,
                status: status_tx,
            },
        )
    }

    pub fn camera(&self) -> &CameraRecord {
        &self.camera
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.borrow()
    }

    /// Ask the supervisor to kill its process and exit. Idempotent.
    pub fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Wait until the supervisor has terminated its process and exited.
    pub async fn stopped(mut self) {
        self.signal_stop();
        // Err means the supervisor is gone, which is just as final
        let _ = self
            .status
            .wait_for(|s| s.state == WorkerState::Stopped)
            .await;
    }
}

/// Per-camera control loop
pub struct Supervisor {
    camera: CameraRecord,
    recording: RecordingConfig,
    program: String,
    launcher: Arc<dyn Launcher>,
}

impl Supervisor {
    /// `recording` is the snapshot this worker uses for its whole life.
    pub fn new(
        camera: CameraRecord,
        recording: RecordingConfig,
        program: String,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            camera,
            recording,
            program,
            launcher,
        }
    }

    async fn launch(&self) -> Result<Box<dyn CaptureProcess>, WorkerError> {
        let invocation = build_capture_invocation(&self.program, &self.camera, &self.recording)?;
        Ok(self.launcher.launch(&invocation).await?)
    }

    fn publish(
        &self,
        status: &watch::Sender<WorkerStatus>,
        state: WorkerState,
        retry: &RetryState,
        pid: Option<u32>,
    ) {
        status.send_replace(WorkerStatus {
            state,
            failures: retry.failures(),
            backoff_secs: retry.current_delay().as_secs(),
            pid,
        });
    }

    /// Run until the stop signal arrives. Returns the final state, which is
    /// always [`WorkerState::Stopped`].
    pub async fn run(self, control: WorkerControl) -> WorkerState {
        let WorkerControl { mut stop, status } = control;
        let mut retry = RetryState::new(BackoffPolicy::from_recording(&self.recording));
        let camera_id = self.camera.id;
        let camera = self.camera.name.as_str();

        loop {
            self.publish(&status, WorkerState::Starting, &retry, None);

            let launched = tokio::select! {
                biased;
                _ = &mut stop => break,
                launched = self.launch() => launched,
            };

            let delay = match launched {
                Err(e) => {
                    warn!(camera_id, camera, error = %e, "capture process failed to start");
                    retry.record_failure()
                }
                Ok(mut process) => {
                    let pid = process.id();
                    let started = Instant::now();
                    self.publish(&status, WorkerState::Running, &retry, pid);
                    info!(camera_id, camera, ?pid, "capture process running");

                    let exit = tokio::select! {
                        biased;
                        _ = &mut stop => {
                            if let Err(e) = process.kill().await {
                                warn!(camera_id, camera, error = %e, "failed to kill capture process");
                            }
                            break;
                        }
                        exit = process.wait() => exit,
                    };

                    if retry.is_sustained(started.elapsed()) {
                        retry.reset();
                    }

                    match exit {
                        Ok(outcome) if outcome.success() => {
                            info!(camera_id, camera, "capture process exited cleanly");
                            retry.clean_exit_delay()
                        }
                        Ok(outcome) => {
                            warn!(camera_id, camera, %outcome, "capture process exited unexpectedly");
                            retry.record_failure()
                        }
                        Err(e) => {
                            warn!(camera_id, camera, error = %e, "lost track of capture process");
                            retry.record_failure()
                        }
                    }
                }
            };

            self.publish(&status, WorkerState::Backoff, &retry, None);
            info!(
                camera_id,
                camera,
                attempt = retry.failures(),
                delay_secs = delay.as_secs(),
                "restarting capture process after delay"
            );

            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(&status, WorkerState::Stopped, &retry, None);
        info!(camera_id, camera, "worker stopped");
        WorkerState::Stopped
    }
}
