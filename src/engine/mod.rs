//! Container engine abstraction
//!
//! The engine is an opaque external executable driven entirely through its
//! CLI. The trait covers exactly the operations the pipeline needs; anything
//! engine-specific (VM lifecycle, flag spelling) stays inside the
//! implementation.

pub mod finch;

use crate::error::StevedoreResult;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Child;

pub use finch::FinchEngine;

/// Lifecycle state of the engine's backing virtual machine, on platforms
/// where one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    Running,
    Stopped,
    /// Engine runs containers natively, no VM involved
    NotApplicable,
}

/// Everything needed to launch one container attached to our stdio.
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub image: String,
    /// KEY=VALUE pairs, already merged (plan defaults then user overrides)
    pub env: Vec<(String, String)>,
    /// host:container volume mounts, passed through verbatim
    pub volumes: Vec<String>,
    pub host_network: bool,
    /// Forwarded to the server via EXTRA_ARGS expansion in the image CMD
    pub extra_args: Vec<String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Binary name, for messages and errors
    fn name(&self) -> &str;

    /// Whether the engine executable can be invoked at all
    async fn is_available(&self) -> bool;

    async fn vm_status(&self) -> StevedoreResult<VmStatus>;

    async fn vm_start(&self) -> StevedoreResult<()>;

    /// Build `context_dir` into `image`. Output is captured; on failure the
    /// error carries the tail of the build log.
    async fn build(&self, context_dir: &Path, image: &str) -> StevedoreResult<()>;

    async fn image_exists(&self, image: &str) -> StevedoreResult<bool>;

    /// Size of a built image in bytes, when the engine can report one
    async fn image_size(&self, image: &str) -> StevedoreResult<Option<u64>>;

    async fn remove_image(&self, image: &str) -> StevedoreResult<()>;

    async fn tag(&self, image: &str, target: &str) -> StevedoreResult<()>;

    async fn push(&self, image: &str) -> StevedoreResult<()>;

    /// Spawn a container with stdin/stdout/stderr inherited from this
    /// process, so the line-oriented protocol flows straight through.
    fn spawn_stdio(&self, spec: &RunSpec) -> StevedoreResult<Child>;
}

/// Keep only the last `lines` lines of captured engine output, enough to
/// show what failed without dumping a full layer-by-layer log.
pub fn output_tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let log = "one\ntwo\nthree\nfour";
        assert_eq!(output_tail(log, 2), "three\nfour");
        assert_eq!(output_tail(log, 10), log);
        assert_eq!(output_tail("", 5), "");
    }
}
