//! Daemon startup and main loop for the NVR daemon
//!
//! Opens the store, seeds the recording config, builds the service and runs
//! the control server until shutdown.

use crate::capture::{Launcher, ProcessLauncher};
use crate::config::{Config, ConfigError};
use crate::server::{serve, ServerError};
use crate::service::{NvrService, ServiceError};
use crate::startup::{run_startup_checks, StartupError};
use crate::store::{Store, StoreError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Store unreachable or schema unusable
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Service operation failed during startup
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Control server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    service: Arc<NvrService>,
}

impl Daemon {
    /// Initialize the daemon, running startup checks first
    ///
    /// This performs the full startup sequence:
    /// 1. Verify the capture program runs
    /// 2. Open the store
    /// 3. Load the recording config, seeding it from `config` on first run,
    ///    and validate what the store holds
    ///
    /// # Returns
    /// * `Ok(Daemon)` - Daemon initialized successfully
    /// * `Err(DaemonError)` - Initialization failed; the daemon must not proceed
    pub async fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config.capture.program)?;
        Self::with_launcher(config, Arc::new(ProcessLauncher)).await
    }

    /// Initialize the daemon without running startup checks
    pub async fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        Self::with_launcher(config, Arc::new(ProcessLauncher)).await
    }

    /// Initialize the daemon with a custom process launcher
    pub async fn with_launcher(
        config: Config,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self, DaemonError> {
        config.recording.validate()?;

        let store = Store::open(&config.store.database_path).await?;
        let recording = store.load_or_seed_config(&config.recording).await?;
        recording.validate()?;
        info!(
            database = %config.store.database_path.display(),
            segment_time = recording.segment_time,
            retry_interval = recording.retry_interval,
            max_backoff = recording.max_backoff,
            "store opened"
        );

        let service = NvrService::new(
            store,
            recording,
            launcher,
            config.capture.program.clone(),
        );

        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }

    /// Get the shared service
    pub fn service(&self) -> Arc<NvrService> {
        self.service.clone()
    }

    /// Run until Ctrl-C, then stop every worker.
    pub async fn run(&self) -> Result<(), DaemonError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await
    }

    /// Run until `shutdown` resolves.
    ///
    /// The listener is bound before any worker starts, so a bad address is
    /// reported without side effects.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let addr = &self.config.server.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = ?listener.local_addr().ok(), "control server listening");

        if self.config.service.autostart {
            self.service.start_all().await?;
        }

        tokio::select! {
            _ = serve(listener, self.service.clone()) => {}
            _ = shutdown => {}
        }

        self.service.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::process::fake::{Behavior, FakeLauncher};
    use crate::config::RecordingConfig;
    use crate::service::tests::payload;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.server.listen_addr = "127.0.0.1:0".to_string();
        config.store.database_path = dir.path().join("nvr.db");
        config
    }

    #[tokio::test]
    async fn test_initialization_seeds_recording_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.recording = RecordingConfig {
            segment_time: 120,
            retry_interval: 5,
            max_backoff: 30,
        };

        let daemon = Daemon::new_without_checks(config.clone()).await.unwrap();
        assert_eq!(daemon.service().current_config().await.segment_time, 120);
        drop(daemon);

        // The stored value wins over the file on later runs
        config.recording.segment_time = 900;
        let daemon = Daemon::new_without_checks(config).await.unwrap();
        assert_eq!(daemon.service().current_config().await.segment_time, 120);
    }

    #[tokio::test]
    async fn test_invalid_recording_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.recording.segment_time = 0;

        let result = Daemon::new_without_checks(config).await;
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_stored_recording_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let store = Store::open(&config.store.database_path).await.unwrap();
        store
            .set_config(&RecordingConfig {
                segment_time: 0,
                retry_interval: 10,
                max_backoff: 60,
            })
            .await
            .unwrap();
        drop(store);

        let result = Daemon::new_without_checks(config).await;
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }

    #[tokio::test]
    async fn test_unusable_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.store.database_path = dir.path().join("missing").join("nvr.db");

        let result = Daemon::new_without_checks(config).await;
        assert!(matches!(result, Err(DaemonError::Store(_))));
    }

    #[tokio::test]
    async fn test_autostart_and_shutdown_stops_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.service.autostart = true;

        let launcher = Arc::new(FakeLauncher::new(Behavior::RunUntilKilled));
        let daemon = Daemon::with_launcher(config, launcher.clone()).await.unwrap();
        let service = daemon.service();
        service.add_camera(&payload(1)).await.unwrap();
        service.add_camera(&payload(2)).await.unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            daemon
                .run_until(async {
                    let _ = rx.await;
                })
                .await
        });

        for _ in 0..1000 {
            if launcher.stats.live() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(launcher.stats.live(), 2);

        tx.send(()).unwrap();
        run.await.unwrap().unwrap();
        assert!(service.registry().is_empty().await);
        assert_eq!(launcher.stats.live(), 0);
    }

    #[tokio::test]
    async fn test_bad_listen_address_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.server.listen_addr = "not an address".to_string();

        let daemon = Daemon::new_without_checks(config).await.unwrap();
        let result = daemon.run_until(std::future::pending()).await;
        assert!(matches!(result, Err(DaemonError::Server(ServerError::Bind { .. }))));
    }
}
