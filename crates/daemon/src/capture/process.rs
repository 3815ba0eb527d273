//! Capture process execution
//!
//! [`Launcher`] is the seam between the supervisor and the operating system:
//! the daemon uses [`ProcessLauncher`], tests substitute a recording fake.

use super::ffmpeg::CaptureInvocation;
use futures::future::{BoxFuture, FutureExt};
use std::io;
use std::process::ExitStatus;

/// How a capture process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status zero
    Success,
    /// Non-zero exit code
    Code(i32),
    /// Terminated by a signal
    Signal,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            return ExitOutcome::Success;
        }
        match status.code() {
            Some(code) => ExitOutcome::Code(code),
            None => ExitOutcome::Signal,
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "exit status 0"),
            ExitOutcome::Code(code) => write!(f, "exit status {}", code),
            ExitOutcome::Signal => write!(f, "terminated by signal"),
        }
    }
}

/// A running capture process owned by exactly one supervisor.
pub trait CaptureProcess: Send {
    /// OS process id, if known
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Cancel-safe.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitOutcome>>;

    /// Forcibly terminate the process and reap it.
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Starts capture processes.
pub trait Launcher: Send + Sync {
    fn launch<'a>(
        &'a self,
        invocation: &'a CaptureInvocation,
    ) -> BoxFuture<'a, io::Result<Box<dyn CaptureProcess>>>;
}

/// Launches real child processes through `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch<'a>(
        &'a self,
        invocation: &'a CaptureInvocation,
    ) -> BoxFuture<'a, io::Result<Box<dyn CaptureProcess>>> {
        async move {
            // The segment muxer does not create missing directories
            tokio::fs::create_dir_all(&invocation.output_dir).await?;
            let child = invocation.to_command().spawn()?;
            Ok(Box::new(ChildProcess { child }) as Box<dyn CaptureProcess>)
        }
        .boxed()
    }
}

struct ChildProcess {
    child: tokio::process::Child,
}

impl CaptureProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitOutcome>> {
        async move { self.child.wait().await.map(ExitOutcome::from) }.boxed()
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.child.kill().boxed()
    }
}
