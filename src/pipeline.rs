//! End-to-end build pipeline
//!
//! classify -> profile -> plan -> cache -> build. The pipeline owns source
//! preparation (git checkout, build context assembly) and cache bookkeeping;
//! the CLI layers run/build/cache commands on top of it.

use crate::cache::fingerprint::{
    fingerprint_command, fingerprint_directory, fingerprint_git_worktree, is_ignored,
};
use crate::cache::lock::BuildLock;
use crate::cache::store::CacheStore;
use crate::cache::{cache_key, image_reference};
use crate::classify::BuildTarget;
use crate::config::Config;
use crate::engine::ContainerEngine;
use crate::error::{StevedoreError, StevedoreResult};
use crate::plan::render::render;
use crate::plan::{synthesize, BuildPlan};
use crate::profile::{profile_directory, ProjectProfile};
use crate::{output, status};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// What `resolve_image` produced: the image to run and how it was obtained.
#[derive(Debug)]
pub struct BuildOutcome {
    pub image_reference: String,
    /// None for direct image targets, which bypass the cache entirely
    pub cache_key: Option<String>,
    pub cache_hit: bool,
}

/// Checked-out sources for directory and git targets. The temp dir (git
/// clones only) lives as long as the checkout.
struct SourceCheckout {
    path: PathBuf,
    _clone: Option<TempDir>,
}

pub struct Pipeline<'a> {
    engine: &'a dyn ContainerEngine,
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, config: &'a Config) -> Self {
        Self { engine, config }
    }

    /// Resolve a target to a runnable image, building only on cache miss.
    pub async fn resolve_image(&self, target: &BuildTarget) -> StevedoreResult<BuildOutcome> {
        if let BuildTarget::Image { reference } = target {
            debug!(%reference, "direct image target, no build");
            return Ok(BuildOutcome {
                image_reference: reference.clone(),
                cache_key: None,
                cache_hit: false,
            });
        }

        let checkout = self.prepare_source(target).await?;
        let profile = match &checkout {
            Some(checkout) => Some(profile_directory(&checkout.path)?.ok_or_else(|| {
                StevedoreError::NoProject(checkout.path.clone())
            })?),
            None => None,
        };

        let plan = synthesize(target, profile.as_ref())?
            .ok_or_else(|| StevedoreError::Internal("non-image target produced no plan".into()))?;

        let fingerprint = self.fingerprint(target, checkout.as_ref()).await?;
        let key = cache_key(&plan, &fingerprint);
        let image = image_reference(&identifier(target, profile.as_ref()), &key);
        debug!(key = %key, image = %image, "resolved cache key");

        // Serialize concurrent builds of the same key; the loser re-checks
        // the store after the winner releases the lock.
        let cache_dir = self.config.cache_dir();
        let _lock = BuildLock::acquire(
            &cache_dir.join("locks"),
            &key,
            Duration::from_secs(self.config.lock_timeout_secs),
        )
        .await?;

        let mut store = CacheStore::open(&cache_dir)?;
        if let Some(entry) = store.lookup(&key) {
            if self.engine.image_exists(&entry.image_reference).await? {
                info!(image = %entry.image_reference, "cache hit");
                status!("Using cached image {}", entry.image_reference);
                let image_reference = entry.image_reference.clone();
                store.touch(&key)?;
                return Ok(BuildOutcome {
                    image_reference,
                    cache_key: Some(key),
                    cache_hit: true,
                });
            }
            // Image was pruned out from under the metadata; rebuild
            debug!(key = %key, "cache entry present but image missing, rebuilding");
        }

        self.build(&plan, checkout.as_ref(), &image).await?;
        let size = self.engine.image_size(&image).await.unwrap_or(None);
        store.record(&key, &image, &describe(target), size)?;

        Ok(BuildOutcome {
            image_reference: image,
            cache_key: Some(key),
            cache_hit: false,
        })
    }

    async fn prepare_source(
        &self,
        target: &BuildTarget,
    ) -> StevedoreResult<Option<SourceCheckout>> {
        match target {
            BuildTarget::LocalDirectory { path } => Ok(Some(SourceCheckout {
                path: path.clone(),
                _clone: None,
            })),
            BuildTarget::GitRepository { url, git_ref } => {
                let (dir, path) = clone_repository(url, git_ref.as_deref()).await?;
                Ok(Some(SourceCheckout {
                    path,
                    _clone: Some(dir),
                }))
            }
            _ => Ok(None),
        }
    }

    async fn fingerprint(
        &self,
        target: &BuildTarget,
        checkout: Option<&SourceCheckout>,
    ) -> StevedoreResult<String> {
        match target {
            BuildTarget::Command { argv } => Ok(fingerprint_command(argv)),
            BuildTarget::LocalDirectory { path } => {
                if path.join(".git").exists() {
                    fingerprint_git_worktree(path).await
                } else {
                    fingerprint_directory(path)
                }
            }
            BuildTarget::GitRepository { .. } => {
                let checkout = checkout.expect("git target has a checkout");
                fingerprint_git_worktree(&checkout.path).await
            }
            BuildTarget::Image { .. } => unreachable!("image targets bypass fingerprinting"),
        }
    }

    async fn build(
        &self,
        plan: &BuildPlan,
        checkout: Option<&SourceCheckout>,
        image: &str,
    ) -> StevedoreResult<()> {
        let context = TempDir::new()
            .map_err(|e| StevedoreError::io("create build context dir", e))?;

        let has_project = checkout.is_some();
        if let Some(checkout) = checkout {
            copy_tree(&checkout.path, context.path())?;
        }
        std::fs::write(context.path().join("Dockerfile"), render(plan, has_project))
            .map_err(|e| StevedoreError::io("write Dockerfile", e))?;

        let spinner = output::spinner(&format!("Building {}", image));
        let result = self.engine.build(context.path(), image).await;
        spinner.finish_and_clear();
        result?;

        status!("Built {}", image);
        Ok(())
    }
}

/// Short name the image reference is derived from.
fn identifier(target: &BuildTarget, profile: Option<&ProjectProfile>) -> String {
    if let Some(name) = profile.and_then(|p| p.name.clone()) {
        return name;
    }
    match target {
        BuildTarget::Command { argv } => argv
            .iter()
            .skip(1)
            .find(|a| !a.starts_with('-'))
            .or_else(|| argv.first())
            .cloned()
            .unwrap_or_else(|| "command".to_string()),
        BuildTarget::LocalDirectory { path } => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string()),
        BuildTarget::GitRepository { url, .. } => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(|s| s.trim_end_matches(".git").to_string())
            .unwrap_or_else(|| "repo".to_string()),
        BuildTarget::Image { reference } => reference.clone(),
    }
}

/// Human-readable origin recorded in cache metadata.
fn describe(target: &BuildTarget) -> String {
    match target {
        BuildTarget::Image { reference } => reference.clone(),
        BuildTarget::Command { argv } => argv.join(" "),
        BuildTarget::LocalDirectory { path } => path.display().to_string(),
        BuildTarget::GitRepository { url, git_ref } => match git_ref {
            Some(r) => format!("{}#{}", url, r),
            None => url.clone(),
        },
    }
}

/// Shallow-clone a repository into a temp dir. Shallow is enough: the build
/// needs the tree, not the history.
pub async fn clone_repository(
    url: &str,
    git_ref: Option<&str>,
) -> StevedoreResult<(TempDir, PathBuf)> {
    let dir = TempDir::new().map_err(|e| StevedoreError::io("create clone dir", e))?;
    let dest = dir.path().join("repo");

    let mut cmd = Command::new("git");
    cmd.arg("clone").arg("--depth").arg("1").arg("--quiet");
    if let Some(git_ref) = git_ref {
        cmd.arg("--branch").arg(git_ref);
    }
    cmd.arg(url).arg(&dest);

    status!("Cloning {}...", url);
    let output = cmd
        .output()
        .await
        .map_err(|e| StevedoreError::command_failed(format!("git clone {}", url), e))?;

    if !output.status.success() {
        return Err(StevedoreError::GitClone {
            url: url.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok((dir, dest))
}

/// Copy a project tree into the build context, skipping everything the
/// fingerprint skips so context and key always agree on inputs.
fn copy_tree(src: &Path, dst: &Path) -> StevedoreResult<()> {
    std::fs::create_dir_all(dst)
        .map_err(|e| StevedoreError::io(format!("create {}", dst.display()), e))?;

    let entries = std::fs::read_dir(src).map_err(|source| StevedoreError::DirectoryUnreadable {
        path: src.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| StevedoreError::DirectoryUnreadable {
            path: src.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_ignored(&name) {
            continue;
        }

        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| StevedoreError::io(format!("stat {}", from.display()), e))?;

        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_file() {
            std::fs::copy(&from, &to)
                .map_err(|e| StevedoreError::io(format!("copy {}", from.display()), e))?;
        }
    }
    Ok(())
}
