//! Node.js detector rule
//!
//! Signal is a `package.json` at the project root. Package manager, monorepo
//! layout, entry point, and declared port are all resolved here with fixed
//! priority orders; any unreadable candidate file counts as absent.

use super::{read_opt, Ecosystem, ManifestKind, PackageManager, ProjectProfile};
use crate::profile::port::detect_port;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Conventional entry-point stems, in resolution order
const ENTRY_STEMS: &[&str] = &["server", "app", "index"];
const ENTRY_EXTS: &[&str] = &["js", "mjs", "cjs", "ts"];

/// Workspace orchestrator marker files; any one implies a monorepo
const WORKSPACE_MARKERS: &[&str] = &["pnpm-workspace.yaml", "lerna.json", "rush.json", "nx.json"];

pub(super) fn detect(dir: &Path) -> Option<ProjectProfile> {
    let raw = read_opt(&dir.join("package.json"))?;
    let manifest: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("unparseable package.json in {}: {}", dir.display(), e);
            return None;
        }
    };

    let mut profile = ProjectProfile::bare(Ecosystem::Node, PackageManager::Npm, ManifestKind::PackageJson);

    profile.name = manifest
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    profile.runtime_version = manifest
        .pointer("/engines/node")
        .and_then(Value::as_str)
        .and_then(normalize_version);

    profile.package_manager = resolve_package_manager(dir, &manifest);
    profile.lockfile_present = lockfile_present(dir);

    let (is_monorepo, packages) = detect_monorepo(dir, &manifest);
    profile.is_monorepo = is_monorepo;
    profile.workspace_packages = packages;

    profile.has_start_script = manifest.pointer("/scripts/start").is_some();
    profile.bin_command = first_bin_name(&manifest);
    profile.entry_point = resolve_entry_point(dir, &manifest);

    // Port detection is optional enrichment; never aborts the profile.
    // Entry points that open a socket without a literal port get the
    // conventional default.
    if let Some(ref entry) = profile.entry_point {
        if let Some(src) = read_opt(&dir.join(entry)) {
            profile.declared_port = detect_port(&src).or_else(|| {
                (src.contains(".listen(") || src.contains("createServer"))
                    .then_some(super::port::DEFAULT_PORT)
            });
        }
    }

    Some(profile)
}

/// Priority: explicit `packageManager` field > lockfile > npm default
fn resolve_package_manager(dir: &Path, manifest: &Value) -> PackageManager {
    if let Some(field) = manifest.get("packageManager").and_then(Value::as_str) {
        if field.starts_with("pnpm") {
            return PackageManager::Pnpm;
        }
        if field.starts_with("yarn") {
            return PackageManager::Yarn;
        }
        if field.starts_with("npm") {
            return PackageManager::Npm;
        }
    }

    if dir.join("pnpm-lock.yaml").is_file() {
        PackageManager::Pnpm
    } else if dir.join("yarn.lock").is_file() {
        PackageManager::Yarn
    } else {
        PackageManager::Npm
    }
}

fn lockfile_present(dir: &Path) -> bool {
    ["package-lock.json", "npm-shrinkwrap.json", "yarn.lock", "pnpm-lock.yaml"]
        .iter()
        .any(|f| dir.join(f).is_file())
}

/// A monorepo needs at least one workspace indicator: a `workspaces`
/// manifest field, a workspace config file, or an orchestrator marker.
fn detect_monorepo(dir: &Path, manifest: &Value) -> (bool, BTreeSet<String>) {
    let mut packages = BTreeSet::new();

    let mut found = match manifest.get("workspaces") {
        Some(Value::Array(entries)) => {
            packages.extend(entries.iter().filter_map(Value::as_str).map(str::to_string));
            true
        }
        // Yarn also allows `{ "packages": [...] }`
        Some(Value::Object(obj)) => {
            if let Some(Value::Array(entries)) = obj.get("packages") {
                packages.extend(entries.iter().filter_map(Value::as_str).map(str::to_string));
            }
            true
        }
        Some(_) => true,
        None => false,
    };

    if let Some(yaml) = read_opt(&dir.join("pnpm-workspace.yaml")) {
        found = true;
        packages.extend(parse_pnpm_workspace_globs(&yaml));
    }

    for marker in WORKSPACE_MARKERS {
        if dir.join(marker).is_file() {
            found = true;
        }
    }

    if !found {
        packages.clear();
    }
    (found, packages)
}

/// Minimal extraction of the `packages:` list from pnpm-workspace.yaml;
/// anything unparseable just yields no globs.
fn parse_pnpm_workspace_globs(yaml: &str) -> Vec<String> {
    let mut globs = Vec::new();
    let mut in_packages = false;
    for line in yaml.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("packages:") {
            in_packages = true;
            continue;
        }
        if in_packages {
            if let Some(item) = trimmed.strip_prefix("- ") {
                globs.push(item.trim_matches(['"', '\'']).to_string());
            } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
                break;
            }
        }
    }
    globs
}

/// First executable name from the `bin` table, if any
fn first_bin_name(manifest: &Value) -> Option<String> {
    match manifest.get("bin")? {
        Value::String(_) => manifest
            .get("name")
            .and_then(Value::as_str)
            .map(|n| n.rsplit('/').next().unwrap_or(n).to_string()),
        Value::Object(obj) => obj.keys().next().cloned(),
        _ => None,
    }
}

/// Entry point priority: manifest `bin`/`main` (if the file exists) >
/// conventional filenames at root or `src/` > textual scan for a server
/// pattern. First match wins.
fn resolve_entry_point(dir: &Path, manifest: &Value) -> Option<String> {
    let bin_target = match manifest.get("bin") {
        Some(Value::String(path)) => Some(path.clone()),
        Some(Value::Object(obj)) => obj.values().next().and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    for candidate in [
        bin_target,
        manifest.get("main").and_then(Value::as_str).map(str::to_string),
    ]
    .into_iter()
    .flatten()
    {
        let rel = candidate.trim_start_matches("./").to_string();
        if dir.join(&rel).is_file() {
            return Some(rel);
        }
    }

    for prefix in ["", "src/"] {
        for stem in ENTRY_STEMS {
            for ext in ENTRY_EXTS {
                let rel = format!("{}{}.{}", prefix, stem, ext);
                if dir.join(&rel).is_file() {
                    return Some(rel);
                }
            }
        }
    }

    scan_for_server_file(dir)
}

/// Last resort: find a source file that both opens a socket and speaks a
/// protocol. First match in directory order wins.
fn scan_for_server_file(dir: &Path) -> Option<String> {
    for sub in ["", "src"] {
        let scan_dir = if sub.is_empty() { dir.to_path_buf() } else { dir.join(sub) };
        let entries = std::fs::read_dir(&scan_dir).ok()?;
        let mut names: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| ENTRY_EXTS.iter().any(|ext| n.ends_with(&format!(".{ext}"))))
            .collect();
        names.sort();

        for name in names {
            let rel = if sub.is_empty() { name.clone() } else { format!("{sub}/{name}") };
            if let Some(src) = read_opt(&dir.join(&rel)) {
                let networking = src.contains(".listen(") || src.contains("createServer");
                let protocol = src.contains("jsonrpc")
                    || src.contains("stdio")
                    || src.contains("StdioServerTransport");
                if networking && protocol {
                    return Some(rel);
                }
            }
        }
    }
    None
}

/// Reduce an `engines.node` constraint to the leading major digits; the
/// result must be usable inside an image reference. Ranges and wildcards
/// that leave no digits yield `None` so the default base applies.
fn normalize_version(constraint: &str) -> Option<String> {
    let v = constraint.trim_start_matches(['>', '=', '^', '~', 'v', ' ']);
    let digits: String = v.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!digits.is_empty()).then_some(digits)
}
