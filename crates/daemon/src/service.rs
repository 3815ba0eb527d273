//! Recording service for the NVR daemon
//!
//! [`NvrService`] is constructed once at startup and shared by the control
//! server and the daemon loop. It owns the worker registry and the in-memory
//! recording config, each behind its own lock, and talks to the store.

use crate::camera::{CameraId, CameraRecord, CameraSummary, CameraUpdate, NewCamera};
use crate::capture::Launcher;
use crate::config::{ConfigError, RecordingConfig};
use crate::registry::{RegistryError, WorkerInfo, WorkerRegistry};
use crate::store::{Store, StoreError};
use crate::supervisor::{Supervisor, WorkerHandle};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Payload is not valid JSON for the expected shape
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Payload parsed but its values are unacceptable
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Recording config out of range
    #[error("{0}")]
    InvalidConfig(#[from] ConfigError),

    /// No camera with this id
    #[error("camera {0} not found")]
    NotFound(CameraId),

    /// Worker already registered for this camera
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Store failure, including constraint violations
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

/// Outcome of a bulk start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartReport {
    pub started: usize,
    pub already_running: usize,
}

/// Partial recording config update; omitted fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
struct RecordingUpdate {
    segment_time: Option<u64>,
    retry_interval: Option<u64>,
    max_backoff: Option<u64>,
}

/// The recording service
pub struct NvrService {
    store: Store,
    registry: WorkerRegistry,
    recording: Mutex<RecordingConfig>,
    /// Serializes `set_config` so concurrent partial updates merge
    config_update: Mutex<()>,
    launcher: Arc<dyn Launcher>,
    program: String,
}

impl NvrService {
    /// `recording` is the config already loaded from the store.
    pub fn new(
        store: Store,
        recording: RecordingConfig,
        launcher: Arc<dyn Launcher>,
        program: String,
    ) -> Self {
        Self {
            store,
            registry: WorkerRegistry::new(),
            recording: Mutex::new(recording),
            config_update: Mutex::new(()),
            launcher,
            program,
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn list_cameras(&self) -> Result<Vec<CameraSummary>, ServiceError> {
        let cameras = self.store.list_cameras().await?;
        Ok(cameras.iter().map(CameraSummary::from).collect())
    }

    /// Start a worker for every stored camera.
    pub async fn start_all(&self) -> Result<StartReport, ServiceError> {
        let cameras = self.store.list_cameras().await?;
        let mut report = StartReport::default();
        for camera in cameras {
            match self.start_worker(camera).await {
                Ok(()) => report.started += 1,
                Err(RegistryError::AlreadyRunning(_)) => report.already_running += 1,
            }
        }
        info!(
            started = report.started,
            already_running = report.already_running,
            "service started"
        );
        Ok(report)
    }

    /// Stop every active worker. Returns once all capture processes are gone.
    pub async fn stop_all(&self) -> usize {
        let mut pending = Vec::new();
        for id in self.registry.snapshot().await {
            if let Some(handle) = self.registry.unregister(id).await {
                pending.push(handle.stopped());
            }
        }
        let stopped = pending.len();
        futures::future::join_all(pending).await;
        info!(stopped, "service stopped");
        stopped
    }

    /// Register and spawn a worker for `camera`.
    ///
    /// The recording config is snapshotted here; later config changes do not
    /// reach this worker.
    pub async fn start_worker(&self, camera: CameraRecord) -> Result<(), RegistryError> {
        let id = camera.id;
        let recording = *self.recording.lock().await;
        let (handle, control) = WorkerHandle::new(camera.clone());

        if let Err(e) = self.registry.register(id, handle).await {
            info!(camera_id = id, camera = %camera.name, "worker already running");
            return Err(e);
        }

        info!(camera_id = id, camera = %camera.name, "starting worker");
        let supervisor = Supervisor::new(camera, recording, self.program.clone(), self.launcher.clone());
        tokio::spawn(supervisor.run(control));
        Ok(())
    }

    /// Stop one worker and wait for its process to be gone. Returns whether a
    /// worker was registered.
    pub async fn stop_worker(&self, id: CameraId) -> bool {
        match self.registry.unregister(id).await {
            Some(handle) => {
                handle.stopped().await;
                info!(camera_id = id, "worker stopped on request");
                true
            }
            None => false,
        }
    }

    pub async fn start_camera(&self, id: CameraId) -> Result<(), ServiceError> {
        let camera = self
            .store
            .get_camera(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;
        self.start_worker(camera).await?;
        Ok(())
    }

    /// Stop, reload the camera record, and start again.
    pub async fn restart_camera(&self, id: CameraId) -> Result<(), ServiceError> {
        self.stop_worker(id).await;
        self.start_camera(id).await
    }

    /// Create a camera from an `addCamera` JSON payload.
    pub async fn add_camera(&self, payload: &str) -> Result<CameraId, ServiceError> {
        let camera: NewCamera = serde_json::from_str(payload)?;
        camera.validate().map_err(ServiceError::InvalidPayload)?;
        let camera = camera.normalized();

        let id = self.store.create_camera(&camera).await?;
        info!(camera_id = id, camera = %camera.name, "camera added");
        Ok(id)
    }

    /// Apply an `updateCamera` JSON payload. A running worker is restarted so
    /// the edit takes effect.
    pub async fn update_camera(&self, payload: &str) -> Result<CameraId, ServiceError> {
        let update: CameraUpdate = serde_json::from_str(payload)?;
        update.validate().map_err(ServiceError::InvalidPayload)?;
        if update.is_empty() {
            return Err(ServiceError::InvalidPayload(
                "no fields to update".to_string(),
            ));
        }

        let current = self
            .store
            .get_camera(update.id)
            .await?
            .ok_or(ServiceError::NotFound(update.id))?;
        let updated = update.apply_to(&current);
        self.store.update_camera(&updated).await?;
        info!(camera_id = updated.id, camera = %updated.name, "camera updated");

        if self.registry.contains(updated.id).await {
            self.restart_camera(updated.id).await?;
        }
        Ok(updated.id)
    }

    /// Stop the camera's worker, then delete the record.
    pub async fn remove_camera(&self, id: CameraId) -> Result<(), ServiceError> {
        self.stop_worker(id).await;
        self.store.delete_camera(id).await?;
        info!(camera_id = id, "camera removed");
        Ok(())
    }

    pub async fn current_config(&self) -> RecordingConfig {
        *self.recording.lock().await
    }

    /// Validate, persist, then publish a new recording config. Running
    /// workers keep the snapshot they started with.
    pub async fn set_config(&self, payload: &str) -> Result<RecordingConfig, ServiceError> {
        let update: RecordingUpdate = serde_json::from_str(payload)?;
        let _update = self.config_update.lock().await;
        let current = self.current_config().await;
        let next = RecordingConfig {
            segment_time: update.segment_time.unwrap_or(current.segment_time),
            retry_interval: update.retry_interval.unwrap_or(current.retry_interval),
            max_backoff: update.max_backoff.unwrap_or(current.max_backoff),
        };
        next.validate()?;

        self.store.set_config(&next).await?;
        *self.recording.lock().await = next;
        info!(?next, "recording config updated");
        Ok(next)
    }

    pub async fn status(&self) -> Vec<WorkerInfo> {
        self.registry.statuses().await
    }

    /// Stop every worker before the process exits.
    pub async fn shutdown(&self) {
        let stopped = self.stop_all().await;
        if stopped > 0 {
            warn!(stopped, "stopped workers for shutdown");
        }
    }
}
