//! Project profiling
//!
//! Inspects a filesystem directory and produces a normalized
//! [`ProjectProfile`]. Detection is an ordered list of independent detector
//! rules, one per ecosystem, evaluated first-match-wins. Adding an ecosystem
//! means adding a rule, not growing a conditional.

mod node;
mod port;
mod python;
mod rust;

pub use port::detect_port;

use crate::error::{StevedoreError, StevedoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Language/runtime family inferred from manifest files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Node,
    Python,
    Rust,
    Unknown,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Package manager driving dependency installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Poetry,
    Uv,
    Pip,
    Cargo,
    None,
}

impl PackageManager {
    /// Is this manager valid for the given ecosystem?
    pub fn fits(&self, ecosystem: Ecosystem) -> bool {
        match self {
            Self::Npm | Self::Yarn | Self::Pnpm => ecosystem == Ecosystem::Node,
            Self::Poetry | Self::Uv | Self::Pip => ecosystem == Ecosystem::Python,
            Self::Cargo => ecosystem == Ecosystem::Rust,
            Self::None => true,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Poetry => "poetry",
            Self::Uv => "uv",
            Self::Pip => "pip",
            Self::Cargo => "cargo",
            Self::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// Which manifest file anchored the detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    PackageJson,
    Pyproject,
    SetupPy,
    Requirements,
    CargoToml,
}

/// Normalized description of a project directory.
///
/// Created once per directory scan and never mutated; a changed directory
/// yields a new profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub ecosystem: Ecosystem,
    pub package_manager: PackageManager,
    pub manifest: ManifestKind,
    pub is_monorepo: bool,
    /// Workspace package globs/paths, empty unless `is_monorepo`
    pub workspace_packages: BTreeSet<String>,
    /// Entry point relative to the project root, if one was resolved
    pub entry_point: Option<String>,
    pub declared_port: Option<u16>,
    pub lockfile_present: bool,
    /// Project name from the manifest, when declared
    pub name: Option<String>,
    /// Runtime version constraint from the manifest (`engines.node`,
    /// `requires-python`), normalized to a bare version
    pub runtime_version: Option<String>,
    /// Executable name from a `bin` entry or script table, preferred over the
    /// raw entry point when present
    pub bin_command: Option<String>,
    /// Whether the manifest declares a start script
    pub has_start_script: bool,
}

impl ProjectProfile {
    /// A profile with nothing detected beyond the ecosystem
    pub(crate) fn bare(
        ecosystem: Ecosystem,
        package_manager: PackageManager,
        manifest: ManifestKind,
    ) -> Self {
        debug_assert!(package_manager.fits(ecosystem));
        Self {
            ecosystem,
            package_manager,
            manifest,
            is_monorepo: false,
            workspace_packages: BTreeSet::new(),
            entry_point: None,
            declared_port: None,
            lockfile_present: false,
            name: None,
            runtime_version: None,
            bin_command: None,
            has_start_script: false,
        }
    }
}

/// A detector rule: reads one ecosystem's signals from a directory and
/// returns a profile when they are present.
type Detector = fn(&Path) -> Option<ProjectProfile>;

/// Detection priority order. First rule to produce a profile wins.
const DETECTORS: &[(&str, Detector)] = &[
    ("node", node::detect),
    ("python", python::detect),
    ("rust", rust::detect),
];

/// Profile a project directory.
///
/// Returns `Ok(None)` when no recognizable manifest exists; that is a normal
/// outcome, not an error. Only failure to read the directory itself is
/// surfaced. Read errors on individual candidate files inside the rules are
/// swallowed and treated as "file absent".
pub fn profile_directory(dir: &Path) -> StevedoreResult<Option<ProjectProfile>> {
    // Surface unreadable directories; everything below degrades gracefully.
    fs::read_dir(dir).map_err(|e| StevedoreError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for (name, detect) in DETECTORS {
        if let Some(profile) = detect(dir) {
            debug!("detector '{}' matched in {}", name, dir.display());
            debug_assert!(profile.package_manager.fits(profile.ecosystem));
            debug_assert!(profile.is_monorepo || profile.workspace_packages.is_empty());
            return Ok(Some(profile));
        }
    }

    debug!("no detector matched in {}", dir.display());
    Ok(None)
}

/// Read a file to string, treating any failure as "file absent".
pub(crate) fn read_opt(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_directory_profiles_to_none() {
        let dir = TempDir::new().unwrap();
        assert!(profile_directory(dir.path()).unwrap().is_none());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = profile_directory(Path::new("/no/such/dir/anywhere")).unwrap_err();
        assert!(matches!(err, StevedoreError::DirectoryUnreadable { .. }));
    }

    #[test]
    fn node_beats_python_in_priority_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();

        let profile = profile_directory(dir.path()).unwrap().unwrap();
        assert_eq!(profile.ecosystem, Ecosystem::Node);
    }

    #[test]
    fn package_manager_ecosystem_consistency() {
        assert!(PackageManager::Poetry.fits(Ecosystem::Python));
        assert!(!PackageManager::Poetry.fits(Ecosystem::Node));
        assert!(PackageManager::Pnpm.fits(Ecosystem::Node));
        assert!(PackageManager::Cargo.fits(Ecosystem::Rust));
        assert!(PackageManager::None.fits(Ecosystem::Unknown));
    }
}
