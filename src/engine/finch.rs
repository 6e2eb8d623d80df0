//! Finch engine driver
//!
//! Wraps the `finch` CLI. On macOS Finch fronts a Lima VM that must be
//! running before any build or run; `ensure_ready` probes and starts it.

use crate::engine::{output_tail, ContainerEngine, RunSpec, VmStatus};
use crate::error::{StevedoreError, StevedoreResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

const BUILD_LOG_TAIL_LINES: usize = 40;

pub struct FinchEngine {
    binary: String,
}

impl FinchEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe availability and VM state, starting the VM if it is stopped.
    pub async fn ensure_ready(&self) -> StevedoreResult<()> {
        if !self.is_available().await {
            return Err(StevedoreError::EngineNotFound(self.binary.clone()));
        }
        match self.vm_status().await? {
            VmStatus::Running | VmStatus::NotApplicable => Ok(()),
            VmStatus::Stopped => {
                info!("engine VM is stopped, starting it");
                self.vm_start().await
            }
        }
    }

    async fn run_captured(&self, args: &[&str]) -> StevedoreResult<std::process::Output> {
        debug!(binary = %self.binary, ?args, "invoking engine");
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StevedoreError::EngineNotFound(self.binary.clone())
                } else {
                    StevedoreError::command_failed(format!("{} {}", self.binary, args.join(" ")), e)
                }
            })
    }
}

impl Default for FinchEngine {
    fn default() -> Self {
        Self::new("finch")
    }
}

#[async_trait]
impl ContainerEngine for FinchEngine {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn is_available(&self) -> bool {
        matches!(self.run_captured(&["--version"]).await, Ok(out) if out.status.success())
    }

    async fn vm_status(&self) -> StevedoreResult<VmStatus> {
        // `finch vm status` prints Running/Stopped/Nonexistent on macOS and
        // fails on Linux where there is no VM subcommand.
        let output = self.run_captured(&["vm", "status"]).await?;
        if !output.status.success() {
            return Ok(VmStatus::NotApplicable);
        }
        let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
        if text.contains("running") {
            Ok(VmStatus::Running)
        } else {
            Ok(VmStatus::Stopped)
        }
    }

    async fn vm_start(&self) -> StevedoreResult<()> {
        let output = self.run_captured(&["vm", "start"]).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Nonexistent VMs need init instead of start
        if stderr.contains("does not exist") {
            let output = self.run_captured(&["vm", "init"]).await?;
            if output.status.success() {
                return Ok(());
            }
            return Err(StevedoreError::VmStart(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Err(StevedoreError::VmStart(stderr.trim().to_string()))
    }

    async fn build(&self, context_dir: &Path, image: &str) -> StevedoreResult<()> {
        info!(image, context = %context_dir.display(), "building image");
        let context = context_dir.to_string_lossy();
        let output = self
            .run_captured(&["build", "-t", image, &context])
            .await?;

        if output.status.success() {
            debug!(image, "build succeeded");
            return Ok(());
        }

        // Finch interleaves build progress on stderr
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(StevedoreError::BuildFailure {
            image: image.to_string(),
            output_tail: output_tail(&combined, BUILD_LOG_TAIL_LINES),
        })
    }

    async fn image_exists(&self, image: &str) -> StevedoreResult<bool> {
        let output = self.run_captured(&["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    async fn image_size(&self, image: &str) -> StevedoreResult<Option<u64>> {
        let output = self
            .run_captured(&["image", "inspect", image, "--format", "{{.Size}}"])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().parse().ok())
    }

    async fn remove_image(&self, image: &str) -> StevedoreResult<()> {
        let output = self.run_captured(&["rmi", "-f", image]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StevedoreError::command_exec(
                format!("{} rmi {}", self.binary, image),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }

    async fn tag(&self, image: &str, target: &str) -> StevedoreResult<()> {
        let output = self.run_captured(&["tag", image, target]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StevedoreError::command_exec(
                format!("{} tag {} {}", self.binary, image, target),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }

    async fn push(&self, image: &str) -> StevedoreResult<()> {
        let output = self.run_captured(&["push", image]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StevedoreError::command_exec(
                format!("{} push {}", self.binary, image),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }

    fn spawn_stdio(&self, spec: &RunSpec) -> StevedoreResult<Child> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run").arg("--rm").arg("-i");

        for (key, value) in &spec.env {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        if !spec.extra_args.is_empty() {
            cmd.arg("-e")
                .arg(format!("EXTRA_ARGS={}", spec.extra_args.join(" ")));
        }
        for volume in &spec.volumes {
            cmd.arg("-v").arg(volume);
        }
        if spec.host_network {
            cmd.arg("--network").arg("host");
        }
        cmd.arg(&spec.image);

        // Inherited stdio is the bridge: the protocol stream passes through
        // untouched in both directions.
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(image = %spec.image, "launching container");
        cmd.spawn()
            .map_err(|e| StevedoreError::Launch(format!("{}: {}", spec.image, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_engine_not_found() {
        let engine = FinchEngine::new("definitely-not-a-real-engine-binary");
        assert!(!engine.is_available().await);

        let err = engine.run_captured(&["--version"]).await.unwrap_err();
        assert!(matches!(err, StevedoreError::EngineNotFound(_)));
    }

    #[test]
    fn spawn_spec_defaults_are_empty() {
        let spec = RunSpec {
            image: "mcp-x:abc".to_string(),
            ..Default::default()
        };
        assert!(spec.env.is_empty());
        assert!(!spec.host_network);
    }
}
