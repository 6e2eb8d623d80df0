//! Rust detector rule
//!
//! A crate manifest implies ecosystem Rust with cargo; no monorepo
//! distinction is attempted for workspaces.

use super::{read_opt, Ecosystem, ManifestKind, PackageManager, ProjectProfile};
use std::path::Path;
use toml::Value;

pub(super) fn detect(dir: &Path) -> Option<ProjectProfile> {
    let raw = read_opt(&dir.join("Cargo.toml"))?;

    let mut profile = ProjectProfile::bare(Ecosystem::Rust, PackageManager::Cargo, ManifestKind::CargoToml);
    profile.lockfile_present = dir.join("Cargo.lock").is_file();

    if let Ok(doc) = raw.parse::<Value>() {
        profile.name = doc
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    Some(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn cargo_manifest_detected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"my-tool\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("Cargo.lock"), "").unwrap();

        let profile = detect(dir.path()).unwrap();
        assert_eq!(profile.ecosystem, Ecosystem::Rust);
        assert_eq!(profile.package_manager, PackageManager::Cargo);
        assert_eq!(profile.name, Some("my-tool".to_string()));
        assert!(profile.lockfile_present);
    }

    #[test]
    fn no_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(detect(dir.path()).is_none());
    }
}
