//! Source fingerprinting
//!
//! A fingerprint is a stable digest of build inputs. Directory fingerprints
//! hash relative paths and file contents only; modification times never
//! participate, so `touch` and fresh checkouts of identical trees agree.

use crate::error::{StevedoreError, StevedoreResult};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::process::Command;

/// Directory entries that never influence build output. Skipped both when
/// fingerprinting and when assembling the build context.
pub const IGNORED_ENTRIES: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    ".pytest_cache",
    ".mypy_cache",
    ".DS_Store",
    "Thumbs.db",
];

pub fn is_ignored(name: &str) -> bool {
    IGNORED_ENTRIES.contains(&name) || name.ends_with(".pyc")
}

/// Fingerprint a local directory by content.
///
/// Collects `relative/path:sha256(content)` lines into an ordered set and
/// digests the concatenation, so traversal order cannot leak into the result.
pub fn fingerprint_directory(path: &Path) -> StevedoreResult<String> {
    let mut entries = BTreeSet::new();
    collect(path, path, &mut entries)?;

    let mut hasher = Sha256::new();
    for entry in &entries {
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect(root: &Path, dir: &Path, out: &mut BTreeSet<String>) -> StevedoreResult<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| StevedoreError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in read_dir {
        let entry = entry.map_err(|source| StevedoreError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_ignored(&name) {
            continue;
        }

        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| StevedoreError::io(format!("stat {}", path.display()), e))?;

        if file_type.is_dir() {
            collect(root, &path, out)?;
        } else if file_type.is_file() {
            let content = std::fs::read(&path)
                .map_err(|e| StevedoreError::io(format!("read {}", path.display()), e))?;
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(format!("{}:{}", rel, hex::encode(Sha256::digest(&content))));
        }
        // Symlinks and special files do not enter the build context
    }
    Ok(())
}

/// Fingerprint a git working tree: the checked-out commit plus a digest of
/// uncommitted changes, so a dirty tree never reuses the clean tree's image.
pub async fn fingerprint_git_worktree(path: &Path) -> StevedoreResult<String> {
    let commit = git_output(path, &["rev-parse", "HEAD"]).await?;
    let diff = git_output(path, &["diff", "HEAD"]).await?;

    if diff.is_empty() {
        Ok(commit)
    } else {
        Ok(format!("{}+{}", commit, hex::encode(Sha256::digest(diff.as_bytes()))))
    }
}

/// Fingerprint a bare command: the digest of its argv. Identical commands
/// share an image regardless of where they were invoked from.
pub fn fingerprint_command(argv: &[String]) -> String {
    let mut hasher = Sha256::new();
    for arg in argv {
        hasher.update(arg.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

async fn git_output(path: &Path, args: &[&str]) -> StevedoreResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(path)
        .output()
        .await
        .map_err(|e| StevedoreError::command_failed(format!("git {}", args.join(" ")), e))?;

    if !output.status.success() {
        return Err(StevedoreError::command_exec(
            format!("git {}", args.join(" ")),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
