//! Startup checks module for the NVR daemon
//!
//! Preflight checks run before any worker is started:
//! - The capture program can be executed (`<program> -version`)

use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Capture program '{program}' not available: {reason}")]
    CaptureUnavailable { program: String, reason: String },
}

/// Extract the version token from `-version` output.
///
/// Handles both release (`ffmpeg version 6.1.1 ...`) and git builds
/// (`ffmpeg version n6.1-12-gabcdef ...`).
pub fn parse_capture_version(output: &str) -> Option<&str> {
    let line = output.lines().find(|line| line.contains(" version "))?;
    let (_, rest) = line.split_once(" version ")?;
    rest.split_whitespace().next()
}

/// Check that the capture program runs by executing `<program> -version`
///
/// # Returns
/// * `Ok(Some(version))` - Program ran and reported a version
/// * `Ok(None)` - Program ran but its version string was not recognised
/// * `Err(StartupError)` - Program missing or exited unsuccessfully
pub fn check_capture_program(program: &str) -> Result<Option<String>, StartupError> {
    let unavailable = |reason: String| StartupError::CaptureUnavailable {
        program: program.to_string(),
        reason,
    };

    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| unavailable(format!("failed to run {} -version: {}", program, e)))?;

    if !output.status.success() {
        return Err(unavailable(format!(
            "{} -version exited with {}",
            program, output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_capture_version(&stdout).map(str::to_string))
}

/// Run all startup checks in order
pub fn run_startup_checks(program: &str) -> Result<(), StartupError> {
    let version = check_capture_program(program)?;
    info!(program, version = version.as_deref().unwrap_or("unknown"), "capture program available");
    Ok(())
}
