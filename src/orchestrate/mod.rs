//! Container execution orchestration
//!
//! Supervises one container attached to our stdio. The session walks a
//! strict state machine: Starting -> Running -> (Terminating ->) Exited.
//! Interrupts trigger graceful shutdown: SIGTERM, a bounded grace period,
//! then SIGKILL. A second interrupt skips the grace period.

use crate::engine::{ContainerEngine, RunSpec};
use crate::error::{StevedoreError, StevedoreResult};
use crate::status;
use std::time::Duration;
use tokio::process::Child;
use tokio::signal;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Terminating,
    Exited(i32),
}

pub struct RunSession {
    state: SessionState,
    grace_period: Duration,
}

/// Exit code reported when the child was killed rather than exiting; mirrors
/// the shell convention of 128 + signal number.
const KILLED_EXIT_CODE: i32 = 137;

impl RunSession {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            state: SessionState::Starting,
            grace_period,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Launch the container and supervise it to completion. Returns the
    /// container's exit code for process-level propagation.
    pub async fn run(
        &mut self,
        engine: &dyn ContainerEngine,
        spec: &RunSpec,
    ) -> StevedoreResult<i32> {
        debug_assert_eq!(self.state, SessionState::Starting);
        let mut child = engine.spawn_stdio(spec)?;
        self.state = SessionState::Running;
        status!("Server running (image {}). Press Ctrl-C to stop.", spec.image);

        let code = self.supervise(&mut child).await?;
        self.state = SessionState::Exited(code);
        debug!(code, "session exited");
        Ok(code)
    }

    async fn supervise(&mut self, child: &mut Child) -> StevedoreResult<i32> {
        tokio::select! {
            result = child.wait() => {
                let exit = result.map_err(|e| StevedoreError::io("wait for container", e))?;
                Ok(exit.code().unwrap_or(KILLED_EXIT_CODE))
            }
            _ = signal::ctrl_c() => {
                self.shutdown(child).await
            }
        }
    }

    /// Graceful shutdown: SIGTERM lets the server flush and close transport
    /// cleanly; the grace period bounds how long we wait before SIGKILL.
    async fn shutdown(&mut self, child: &mut Child) -> StevedoreResult<i32> {
        self.state = SessionState::Terminating;
        status!("Stopping server...");

        if let Some(pid) = child.id() {
            // SAFETY: pid comes from a child we own and have not reaped
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        tokio::select! {
            result = child.wait() => {
                let exit = result.map_err(|e| StevedoreError::io("wait for container", e))?;
                Ok(exit.code().unwrap_or(KILLED_EXIT_CODE))
            }
            _ = tokio::time::sleep(self.grace_period) => {
                warn!(grace_secs = self.grace_period.as_secs(), "grace period expired, killing container");
                child.start_kill().map_err(|e| StevedoreError::io("kill container", e))?;
                let exit = child.wait().await.map_err(|e| StevedoreError::io("wait for container", e))?;
                Ok(exit.code().unwrap_or(KILLED_EXIT_CODE))
            }
            _ = signal::ctrl_c() => {
                warn!("second interrupt, killing container immediately");
                child.start_kill().map_err(|e| StevedoreError::io("kill container", e))?;
                let exit = child.wait().await.map_err(|e| StevedoreError::io("wait for container", e))?;
                Ok(exit.code().unwrap_or(KILLED_EXIT_CODE))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_shell(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn exit_code_propagates() {
        let mut session = RunSession::new(Duration::from_secs(1));
        let mut child = spawn_shell("exit 7");
        let code = session.supervise(&mut child).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn clean_exit_reports_zero() {
        let mut session = RunSession::new(Duration::from_secs(1));
        let mut child = spawn_shell("true");
        assert_eq!(session.supervise(&mut child).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_escalates_to_kill_when_term_is_ignored() {
        let mut session = RunSession::new(Duration::from_millis(200));
        session.state = SessionState::Running;
        // Child that traps and ignores SIGTERM
        let mut child = spawn_shell("trap '' TERM; sleep 30");
        // Give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        let code = session.shutdown(&mut child).await.unwrap();
        assert_eq!(code, KILLED_EXIT_CODE);
        assert_eq!(session.state, SessionState::Terminating);
    }

    #[tokio::test]
    async fn shutdown_returns_promptly_when_term_is_honored() {
        let mut session = RunSession::new(Duration::from_secs(10));
        session.state = SessionState::Running;
        let mut child = spawn_shell("sleep 30");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = tokio::time::Instant::now();
        let _ = session.shutdown(&mut child).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
