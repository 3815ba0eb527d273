//! Capture process modules for the NVR daemon

pub mod ffmpeg;
pub mod process;

pub use ffmpeg::{build_capture_invocation, stream_locator, CaptureError, CaptureInvocation};
pub use process::{CaptureProcess, ExitOutcome, Launcher, ProcessLauncher};
