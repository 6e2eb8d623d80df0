//! Content-addressed build cache
//!
//! The cache key for a build is `sha256(canonical plan JSON || source
//! fingerprint)`: same plan over same sources means same image, and any
//! change to either produces a fresh key. Image names derive from the key so
//! they are valid engine tags and collision-free.

pub mod fingerprint;
pub mod lock;
pub mod store;

use crate::plan::BuildPlan;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Short prefix of the key used in image tags; 12 hex chars is plenty to
/// avoid collisions at the scale of a local image store.
const TAG_LEN: usize = 12;

/// Compute the cache key binding a plan to the sources it will build.
pub fn cache_key(plan: &BuildPlan, source_fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plan.canonical_json().as_bytes());
    hasher.update(b"\n");
    hasher.update(source_fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive the image reference for a build: `mcp-{identifier}:{key prefix}`.
pub fn image_reference(identifier: &str, key: &str) -> String {
    let tag = &key[..TAG_LEN.min(key.len())];
    format!("mcp-{}:{}", sanitize_image_name(identifier), tag)
}

/// Reduce an arbitrary identifier (package name, repo name, directory name)
/// to something a container engine accepts as an image name.
pub fn sanitize_image_name(name: &str) -> String {
    let mut out: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '-' })
        .collect();

    while out.contains("--") {
        out = out.replace("--", "-");
    }
    let out = out.trim_matches(|c| c == '-' || c == '.' || c == '_');
    if out.is_empty() {
        "unnamed".to_string()
    } else {
        out.to_string()
    }
}

/// Root directory for cache metadata and lock files.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("stevedore")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BuildTarget;
    use crate::plan::synthesize;

    fn sample_plan(argv: &[&str]) -> BuildPlan {
        let target = BuildTarget::Command {
            argv: argv.iter().map(|s| s.to_string()).collect(),
        };
        synthesize(&target, None).unwrap().unwrap()
    }

    #[test]
    fn key_is_stable() {
        let plan = sample_plan(&["uvx", "mcp-server-time"]);
        let fp = fingerprint::fingerprint_command(&plan_argv(&plan));
        assert_eq!(cache_key(&plan, &fp), cache_key(&plan, &fp));
    }

    fn plan_argv(plan: &BuildPlan) -> Vec<String> {
        plan.run_command.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn key_discriminates_fingerprint() {
        let plan = sample_plan(&["npx", "server"]);
        assert_ne!(cache_key(&plan, "aaa"), cache_key(&plan, "bbb"));
    }

    #[test]
    fn key_discriminates_plan() {
        let a = sample_plan(&["uvx", "server-a"]);
        let b = sample_plan(&["uvx", "server-b"]);
        assert_ne!(cache_key(&a, "same"), cache_key(&b, "same"));
    }

    #[test]
    fn image_reference_shape() {
        let key = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            image_reference("My Server!", key),
            "mcp-my-server:0123456789ab"
        );
    }

    #[test]
    fn sanitize_handles_scoped_packages() {
        assert_eq!(
            sanitize_image_name("@modelcontextprotocol/server-filesystem"),
            "modelcontextprotocol-server-filesystem"
        );
        assert_eq!(sanitize_image_name("///"), "unnamed");
    }
}
