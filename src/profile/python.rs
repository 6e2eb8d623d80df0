//! Python detector rule
//!
//! Manifest priority: `pyproject.toml` > `setup.py` > `requirements.txt`.
//! A `pyproject.toml` maps to uv only when a `[tool.uv]` table is present;
//! `[tool.poetry]` means Poetry; plain PEP 621 metadata means pip.

use super::{read_opt, Ecosystem, ManifestKind, PackageManager, ProjectProfile};
use std::path::Path;
use toml::Value;
use tracing::debug;

pub(super) fn detect(dir: &Path) -> Option<ProjectProfile> {
    if let Some(raw) = read_opt(&dir.join("pyproject.toml")) {
        return Some(from_pyproject(dir, &raw));
    }

    if dir.join("setup.py").is_file() {
        let mut profile =
            ProjectProfile::bare(Ecosystem::Python, PackageManager::Pip, ManifestKind::SetupPy);
        profile.name = read_opt(&dir.join("setup.py")).and_then(|src| setup_py_name(&src));
        return Some(profile);
    }

    if dir.join("requirements.txt").is_file() {
        return Some(ProjectProfile::bare(
            Ecosystem::Python,
            PackageManager::Pip,
            ManifestKind::Requirements,
        ));
    }

    None
}

fn from_pyproject(dir: &Path, raw: &str) -> ProjectProfile {
    let parsed: Option<Value> = match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("unparseable pyproject.toml in {}: {}", dir.display(), e);
            None
        }
    };

    let manager = match &parsed {
        Some(doc) => {
            if doc.get("tool").and_then(|t| t.get("uv")).is_some() {
                PackageManager::Uv
            } else if doc.get("tool").and_then(|t| t.get("poetry")).is_some() {
                PackageManager::Poetry
            } else {
                PackageManager::Pip
            }
        }
        None => PackageManager::Pip,
    };

    let mut profile = ProjectProfile::bare(Ecosystem::Python, manager, ManifestKind::Pyproject);
    profile.lockfile_present =
        dir.join("poetry.lock").is_file() || dir.join("uv.lock").is_file();

    if let Some(doc) = parsed {
        profile.name = doc
            .pointer_str("/project/name")
            .or_else(|| doc.pointer_str("/tool/poetry/name"))
            .map(str::to_string);

        profile.runtime_version = doc
            .pointer_str("/project/requires-python")
            .or_else(|| doc.pointer_str("/tool/poetry/dependencies/python"))
            .map(normalize_python_version);

        // A declared script gives the entry command
        profile.bin_command = doc
            .get("project")
            .and_then(|p| p.get("scripts"))
            .or_else(|| {
                doc.get("tool")
                    .and_then(|t| t.get("poetry"))
                    .and_then(|p| p.get("scripts"))
            })
            .and_then(Value::as_table)
            .and_then(|t| t.keys().next().cloned());
    }

    profile
}

/// `name="my-pkg"` out of setup.py, best effort
fn setup_py_name(source: &str) -> Option<String> {
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("name=").or_else(|| trimmed.strip_prefix("name =")) {
            let name = rest.trim().trim_matches([',', '"', '\'']);
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

fn normalize_python_version(constraint: &str) -> String {
    let v = constraint.trim().trim_matches('"');
    let v = v.trim_start_matches(['>', '=', '^', '~', ' ']);
    // keep major.minor
    let mut parts = v.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => {
            let minor: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
            if minor.is_empty() {
                major.to_string()
            } else {
                format!("{major}.{minor}")
            }
        }
        (Some(major), None) => major.to_string(),
        _ => v.to_string(),
    }
}

/// TOML has no JSON-pointer helper; small shim for dotted lookups
trait PointerStr {
    fn pointer_str(&self, pointer: &str) -> Option<&str>;
}

impl PointerStr for Value {
    fn pointer_str(&self, pointer: &str) -> Option<&str> {
        let mut current = self;
        for key in pointer.trim_start_matches('/').split('/') {
            current = current.get(key)?;
        }
        current.as_str()
    }
}
