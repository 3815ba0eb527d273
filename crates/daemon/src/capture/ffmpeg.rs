//! FFmpeg capture command builder
//!
//! Maps a camera record and the recording config onto the argument list of
//! one segmenting capture process. Pure: nothing here touches the process
//! table or the filesystem.

use crate::camera::CameraRecord;
use crate::config::RecordingConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// File name pattern of segment files inside the camera's output directory
const SEGMENT_PATTERN: &str = "output_%03d.mp4";

/// Error type for building a capture invocation
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Stream URL cannot be parsed
    #[error("invalid stream url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Stream URL has no authority to carry credentials
    #[error("stream url '{0}' cannot carry credentials")]
    NoAuthority(String),
}

/// Program name plus arguments for one capture process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Directory the segment files are written to
    pub output_dir: PathBuf,
}

impl CaptureInvocation {
    /// Convert into a runnable command.
    ///
    /// stdin is closed and the child is killed if its handle is dropped, so a
    /// worker that goes away can never leave the process behind.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Stream locator handed to the capture process.
///
/// Credentials are embedded into the authority only when both username and
/// password are present; otherwise the stored URL is used verbatim.
pub fn stream_locator(camera: &CameraRecord) -> Result<String, CaptureError> {
    let (username, password) = match (&camera.username, &camera.password) {
        (Some(u), Some(p)) if !u.is_empty() => (u, p),
        _ => return Ok(camera.url.clone()),
    };

    let mut url = Url::parse(&camera.url).map_err(|source| CaptureError::InvalidUrl {
        url: camera.url.clone(),
        source,
    })?;
    url.set_username(username)
        .map_err(|_| CaptureError::NoAuthority(camera.url.clone()))?;
    url.set_password(Some(password))
        .map_err(|_| CaptureError::NoAuthority(camera.url.clone()))?;

    Ok(url.to_string())
}

/// Build the capture invocation for a camera
///
/// Produces, in order:
/// - `-i <locator>` reading the camera stream
/// - `-c copy` so the stream is never re-encoded
/// - `-f segment -segment_time <secs> <dir>/output_%03d.mp4`
/// - `-f rtsp <restream>` when a restream target is configured
pub fn build_capture_invocation(
    program: &str,
    camera: &CameraRecord,
    recording: &RecordingConfig,
) -> Result<CaptureInvocation, CaptureError> {
    let locator = stream_locator(camera)?;
    let output_dir = PathBuf::from(&camera.output_dir);
    let segment_target = Path::new(&camera.output_dir).join(SEGMENT_PATTERN);

    let mut args = vec![
        "-i".to_string(),
        locator,
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-segment_time".to_string(),
        recording.segment_time.to_string(),
        segment_target.to_string_lossy().into_owned(),
    ];

    if let Some(restream) = camera.restream.as_deref().filter(|r| !r.is_empty()) {
        args.extend(["-f".to_string(), "rtsp".to_string(), restream.to_string()]);
    }

    Ok(CaptureInvocation {
        program: program.to_string(),
        args,
        output_dir,
    })
}
