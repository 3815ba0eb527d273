//! Worker registry for the NVR daemon
//!
//! Maps camera identifiers to active worker handles. One mutex guards the
//! whole map and is never held across process, network or disk I/O: the
//! critical sections only move handles in and out and fire stop signals.

use crate::camera::CameraId;
use crate::supervisor::{WorkerHandle, WorkerStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

/// Error type for registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A worker for this camera is already registered
    #[error("worker for camera {0} already running")]
    AlreadyRunning(CameraId),
}

/// Point-in-time view of one registered worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub camera_id: CameraId,
    pub name: String,
    #[serde(flatten)]
    pub status: WorkerStatus,
}

impl WorkerInfo {
    fn of(id: CameraId, handle: &WorkerHandle) -> Self {
        Self {
            camera_id: id,
            name: handle.camera().name.clone(),
            status: handle.status(),
        }
    }
}

/// At most one worker per camera
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Mutex<HashMap<CameraId, WorkerHandle>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Fails, leaving the existing entry untouched, if the
    /// camera already has one; the rejected handle is dropped.
    pub async fn register(&self, id: CameraId, handle: WorkerHandle) -> Result<(), RegistryError> {
        let mut workers = self.workers.lock().await;
        if workers.contains_key(&id) {
            return Err(RegistryError::AlreadyRunning(id));
        }
        workers.insert(id, handle);
        Ok(())
    }

    /// Remove the entry and fire its stop signal in the same critical
    /// section. Await [`WorkerHandle::stopped`] on the result, outside the
    /// lock, to know the process is gone. No-op if absent.
    pub async fn unregister(&self, id: CameraId) -> Option<WorkerHandle> {
        let mut workers = self.workers.lock().await;
        let mut handle = workers.remove(&id)?;
        handle.signal_stop();
        Some(handle)
    }

    pub async fn lookup(&self, id: CameraId) -> Option<WorkerInfo> {
        let workers = self.workers.lock().await;
        workers.get(&id).map(|handle| WorkerInfo::of(id, handle))
    }

    pub async fn contains(&self, id: CameraId) -> bool {
        self.workers.lock().await.contains_key(&id)
    }

    /// Registered camera identifiers, ascending.
    pub async fn snapshot(&self) -> Vec<CameraId> {
        let workers = self.workers.lock().await;
        let mut ids: Vec<CameraId> = workers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Status of every registered worker, ordered by camera id.
    pub async fn statuses(&self) -> Vec<WorkerInfo> {
        let workers = self.workers.lock().await;
        let mut infos: Vec<WorkerInfo> = workers
            .iter()
            .map(|(id, handle)| WorkerInfo::of(*id, handle))
            .collect();
        infos.sort_by_key(|info| info.camera_id);
        infos
    }

    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraRecord;
    use crate::supervisor::WorkerState;
    use std::sync::Arc;

    fn camera(id: CameraId) -> CameraRecord {
        CameraRecord {
            id,
            name: format!("cam-{}", id),
            url: format!("rtsp://10.0.0.{}/live", id),
            output_dir: format!("/srv/nvr/{}", id),
            username: None,
            password: None,
            restream: None,
        }
    }

    #[tokio::test]
    async fn test_register_rejects_second_handle() {
        let registry = WorkerRegistry::new();
        let (first, _first_control) = WorkerHandle::new(camera(1));
        registry.register(1, first).await.unwrap();

        let mut renamed = camera(1);
        renamed.name = "intruder".to_string();
        let (second, _second_control) = WorkerHandle::new(renamed);
        assert_eq!(
            registry.register(1, second).await,
            Err(RegistryError::AlreadyRunning(1))
        );

        let info = registry.lookup(1).await.unwrap();
        assert_eq!(info.name, "cam-1");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_signals_stop() {
        let registry = WorkerRegistry::new();
        let (handle, mut control) = WorkerHandle::new(camera(3));
        registry.register(3, handle).await.unwrap();

        let removed = registry.unregister(3).await;
        assert!(removed.is_some());
        assert!(control.stop.try_recv().is_ok());

        assert!(registry.unregister(3).await.is_none());
        assert!(registry.lookup(3).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_and_statuses_are_sorted() {
        let registry = WorkerRegistry::new();
        let mut controls = Vec::new();
        for id in [5, 2, 9] {
            let (handle, control) = WorkerHandle::new(camera(id));
            registry.register(id, handle).await.unwrap();
            controls.push(control);
        }

        assert_eq!(registry.snapshot().await, vec![2, 5, 9]);
        let statuses = registry.statuses().await;
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].camera_id, 2);
        assert_eq!(statuses[0].status.state, WorkerState::Starting);
    }

    #[tokio::test]
    async fn test_concurrent_registration_admits_one() {
        let registry = Arc::new(WorkerRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _control) = WorkerHandle::new(camera(1));
                registry.register(1, handle).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.len().await, 1);
    }
}
