//! NVR Daemon
//!
//! Background service that records camera streams by supervising one capture
//! process per camera, and exposes a line-oriented control protocol.

pub mod backoff;
pub mod camera;
pub mod capture;
pub mod daemon;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;
pub mod startup;
pub mod store;
pub mod supervisor;

pub use nvr_config as config;
pub use nvr_config::{Config, RecordingConfig};
pub use backoff::{BackoffPolicy, RetryState, MIN_RETRY_DELAY};
pub use camera::{CameraId, CameraRecord, CameraSummary, CameraUpdate, NewCamera};
pub use capture::{
    build_capture_invocation, stream_locator, CaptureError, CaptureInvocation, CaptureProcess,
    ExitOutcome, Launcher, ProcessLauncher,
};
pub use daemon::{Daemon, DaemonError};
pub use protocol::{handle_line, Command, ParseError, Response, ResponseStatus};
pub use registry::{RegistryError, WorkerInfo, WorkerRegistry};
pub use server::{run_control_server, serve, serve_incoming, ServerError};
pub use service::{NvrService, ServiceError, StartReport};
pub use startup::{check_capture_program, run_startup_checks, StartupError};
pub use store::{Store, StoreError, UniqueField};
pub use supervisor::{Supervisor, WorkerHandle, WorkerState, WorkerStatus};
