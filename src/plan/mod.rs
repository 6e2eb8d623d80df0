//! Build plan synthesis
//!
//! `(BuildTarget, Option<ProjectProfile>) -> BuildPlan`, deterministic and
//! total over the classified domain. Synthesis never consults the clock,
//! randomness, or ambient environment variables; byte-identical inputs give
//! byte-identical plans, which is what keeps cache keys stable.

pub mod render;

use crate::classify::BuildTarget;
use crate::error::{StevedoreError, StevedoreResult};
use crate::profile::{Ecosystem, ManifestKind, PackageManager, ProjectProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment markers every launched server receives, so the inner process
/// self-selects protocol mode instead of human-readable output.
pub const MCP_ENV_MARKERS: [(&str, &str); 2] = [("MCP_ENABLED", "true"), ("MCP_STDIO", "true")];

const NODE_DEFAULT_VERSION: &str = "20";
const PYTHON_DEFAULT_VERSION: &str = "3.11";
const GENERIC_BASE: &str = "debian:bookworm-slim";

/// Fully-resolved, deterministic description of how to construct an image.
///
/// `default_env` is a BTreeMap so canonical serialization is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub base_image: String,
    /// Shell instructions executed before dependency installation
    pub setup_steps: Vec<String>,
    /// Empty string when the command self-installs at run time
    pub install_command: String,
    pub build_command: Option<String>,
    pub run_command: String,
    pub default_env: BTreeMap<String, String>,
    pub declared_port: Option<u16>,
}

impl BuildPlan {
    /// Canonical serialization used as a cache-key input.
    pub fn canonical_json(&self) -> String {
        // BuildPlan is Serialize with only deterministic containers; this
        // cannot fail for any value we construct.
        serde_json::to_string(self).expect("plan serializes")
    }
}

/// Synthesize a build plan for a classified target.
///
/// `Image` targets return `None`: nothing to build, the reference goes
/// straight to the orchestrator. `Command` and `Image` never receive a
/// profile; directory and git targets require one.
pub fn synthesize(
    target: &BuildTarget,
    profile: Option<&ProjectProfile>,
) -> StevedoreResult<Option<BuildPlan>> {
    match target {
        BuildTarget::Image { .. } => Ok(None),
        BuildTarget::Command { argv } => Ok(Some(plan_for_command(argv))),
        BuildTarget::LocalDirectory { path } => {
            let profile = profile.ok_or_else(|| StevedoreError::NoProject(path.clone()))?;
            plan_for_project(profile).map(Some)
        }
        BuildTarget::GitRepository { url, .. } => {
            let profile = profile
                .ok_or_else(|| StevedoreError::NoProject(std::path::PathBuf::from(url)))?;
            plan_for_project(profile).map(Some)
        }
    }
}

fn base_env(declared_port: Option<u16>) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = MCP_ENV_MARKERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if let Some(port) = declared_port {
        env.insert("PORT".to_string(), port.to_string());
    }
    env
}

/// Command targets: base image and setup keyed off the head token. The
/// install step stays empty because these runners fetch on demand.
fn plan_for_command(argv: &[String]) -> BuildPlan {
    let head = argv.first().map(|s| s.to_ascii_lowercase()).unwrap_or_default();
    let run_command = argv.join(" ");

    let (base_image, setup_steps) = match head.as_str() {
        "uvx" => {
            let mut steps = vec!["pip install uv".to_string()];
            // Pre-bake the package so the first container start is instant
            if let Some(package) = argv.iter().skip(1).find(|a| !a.starts_with('-')) {
                steps.push(format!("uv pip install --system {}", package));
            }
            (format!("python:{}-slim", PYTHON_DEFAULT_VERSION), steps)
        }
        "pip" | "pip3" | "python" | "python3" | "uv" => {
            (format!("python:{}-slim", PYTHON_DEFAULT_VERSION), vec![])
        }
        "npm" | "npx" | "node" => (format!("node:{}-slim", NODE_DEFAULT_VERSION), vec![]),
        _ => (GENERIC_BASE.to_string(), vec![]),
    };

    BuildPlan {
        base_image,
        setup_steps,
        install_command: String::new(),
        build_command: None,
        run_command,
        default_env: base_env(None),
        declared_port: None,
    }
}

/// Directory and git targets (identical once cloned): one template per
/// (ecosystem, package manager, monorepo) combination.
fn plan_for_project(profile: &ProjectProfile) -> StevedoreResult<BuildPlan> {
    match profile.ecosystem {
        Ecosystem::Node => Ok(plan_for_node(profile)),
        Ecosystem::Python => Ok(plan_for_python(profile)),
        Ecosystem::Rust => Err(StevedoreError::UnsupportedEcosystem("Rust".to_string())),
        Ecosystem::Unknown => Err(StevedoreError::UnsupportedEcosystem("Unknown".to_string())),
    }
}

fn plan_for_node(profile: &ProjectProfile) -> BuildPlan {
    let version = profile.runtime_version.as_deref().unwrap_or(NODE_DEFAULT_VERSION);
    let manager = profile.package_manager;

    let mut setup_steps = Vec::new();
    // The base image only ships npm. Monorepo installs must run under the
    // manager that wrote the lockfile or workspace-protocol references fail
    // to parse, so install it globally first.
    if profile.is_monorepo {
        match manager {
            PackageManager::Pnpm => setup_steps.push("npm install -g pnpm".to_string()),
            PackageManager::Yarn => setup_steps.push("npm install -g yarn".to_string()),
            _ => {}
        }
    }

    let install_command = match (profile.is_monorepo, manager) {
        (true, PackageManager::Pnpm) => "pnpm install".to_string(),
        (true, PackageManager::Yarn) => "yarn install".to_string(),
        _ => "npm install".to_string(),
    };

    let build_command = profile.bin_command.as_ref().map(|_| {
        let build = match (profile.is_monorepo, manager) {
            (true, PackageManager::Pnpm) => "pnpm run build",
            (true, PackageManager::Yarn) => "yarn build",
            _ => "npm run build",
        };
        format!("{} 2>/dev/null || echo \"no build script, skipping\"", build)
    });

    // Packages with a bin entry get installed globally so the bin name is on
    // PATH; that global install also belongs to setup-after-install, modeled
    // here as a trailing setup step the renderer places after the build.
    let run_command = if let Some(ref bin) = profile.bin_command {
        setup_steps.push(match (profile.is_monorepo, manager) {
            (true, PackageManager::Pnpm) => "pnpm install -g .".to_string(),
            (true, PackageManager::Yarn) => "yarn global add file:.".to_string(),
            _ => "npm install -g .".to_string(),
        });
        bin.clone()
    } else if profile.has_start_script {
        match (profile.is_monorepo, manager) {
            (true, PackageManager::Pnpm) => "pnpm run start".to_string(),
            (true, PackageManager::Yarn) => "yarn start".to_string(),
            _ => "npm run start".to_string(),
        }
    } else if let Some(ref entry) = profile.entry_point {
        format!("node {}", entry)
    } else {
        "npm start".to_string()
    };

    BuildPlan {
        base_image: format!("node:{}-slim", version),
        setup_steps,
        install_command,
        build_command,
        run_command,
        default_env: base_env(profile.declared_port),
        declared_port: profile.declared_port,
    }
}

fn plan_for_python(profile: &ProjectProfile) -> BuildPlan {
    let version = profile
        .runtime_version
        .as_deref()
        .unwrap_or(PYTHON_DEFAULT_VERSION);

    let (setup_steps, install_command, run_command) = match profile.package_manager {
        PackageManager::Poetry => (
            vec![
                "pip install poetry".to_string(),
                "poetry config virtualenvs.create false".to_string(),
            ],
            "poetry install".to_string(),
            match profile.bin_command {
                Some(ref bin) => format!("poetry run {}", bin),
                None => "poetry run python -m src".to_string(),
            },
        ),
        PackageManager::Uv => (
            vec!["pip install uv".to_string()],
            "uv pip install --system -e .".to_string(),
            match profile.bin_command {
                Some(ref bin) => bin.clone(),
                None => "python -m src".to_string(),
            },
        ),
        // Plain pip: setup.py installs editable, requirements installs a list
        _ => {
            let install = match profile.manifest {
                ManifestKind::Requirements => "pip install -r requirements.txt".to_string(),
                _ => "pip install -e .".to_string(),
            };
            let run = match profile.bin_command {
                Some(ref bin) => bin.clone(),
                None => "python main.py".to_string(),
            };
            (vec![], install, run)
        }
    };

    BuildPlan {
        base_image: format!("python:{}-slim", version),
        setup_steps,
        install_command,
        build_command: None,
        run_command,
        default_env: base_env(profile.declared_port),
        declared_port: profile.declared_port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ManifestKind;

    fn node_profile() -> ProjectProfile {
        ProjectProfile::bare(Ecosystem::Node, PackageManager::Npm, ManifestKind::PackageJson)
    }

    #[test]
    fn image_target_synthesizes_nothing() {
        let target = BuildTarget::Image {
            reference: "mcp/time:latest".to_string(),
        };
        assert!(synthesize(&target, None).unwrap().is_none());
    }

    #[test]
    fn synthesis_is_deterministic() {
        let target = BuildTarget::Command {
            argv: vec!["uvx".into(), "mcp-server-time".into(), "--local-timezone".into(), "UTC".into()],
        };
        let a = synthesize(&target, None).unwrap().unwrap();
        let b = synthesize(&target, None).unwrap().unwrap();
        assert_eq!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn uvx_command_uses_python_base_and_prebakes_package() {
        let target = BuildTarget::Command {
            argv: vec!["uvx".into(), "mcp-server-time".into()],
        };
        let plan = synthesize(&target, None).unwrap().unwrap();
        assert!(plan.base_image.starts_with("python:"));
        assert!(plan
            .setup_steps
            .contains(&"uv pip install --system mcp-server-time".to_string()));
        assert!(plan.install_command.is_empty());
        assert_eq!(plan.run_command, "uvx mcp-server-time");
    }

    #[test]
    fn npx_command_uses_node_base() {
        let target = BuildTarget::Command {
            argv: vec!["npx".into(), "-y".into(), "@modelcontextprotocol/server-filesystem".into()],
        };
        let plan = synthesize(&target, None).unwrap().unwrap();
        assert!(plan.base_image.starts_with("node:"));
        assert!(plan.install_command.is_empty());
    }

    #[test]
    fn unknown_head_gets_generic_base() {
        let target = BuildTarget::Command {
            argv: vec!["./my-binary".into()],
        };
        let plan = synthesize(&target, None).unwrap().unwrap();
        assert_eq!(plan.base_image, GENERIC_BASE);
    }

    #[test]
    fn env_markers_always_present() {
        let target = BuildTarget::Command {
            argv: vec!["uvx".into(), "x".into()],
        };
        let plan = synthesize(&target, None).unwrap().unwrap();
        assert_eq!(plan.default_env.get("MCP_ENABLED"), Some(&"true".to_string()));
        assert_eq!(plan.default_env.get("MCP_STDIO"), Some(&"true".to_string()));
    }

    #[test]
    fn declared_port_lands_in_env() {
        let mut profile = node_profile();
        profile.declared_port = Some(4010);
        let plan = plan_for_node(&profile);
        assert_eq!(plan.default_env.get("PORT"), Some(&"4010".to_string()));
    }

    #[test]
    fn directory_without_profile_is_no_project() {
        let target = BuildTarget::LocalDirectory {
            path: "/tmp/whatever".into(),
        };
        let err = synthesize(&target, None).unwrap_err();
        assert!(matches!(err, StevedoreError::NoProject(_)));
    }

    #[test]
    fn monorepo_pnpm_installs_manager_before_dependencies() {
        let mut profile = node_profile();
        profile.package_manager = PackageManager::Pnpm;
        profile.is_monorepo = true;

        let plan = plan_for_node(&profile);
        assert_eq!(plan.setup_steps.first().unwrap(), "npm install -g pnpm");
        assert_eq!(plan.install_command, "pnpm install");
        assert_ne!(plan.install_command, "npm install");
    }

    #[test]
    fn node_base_image_is_a_valid_reference() {
        let mut profile = node_profile();
        profile.runtime_version = Some("16".to_string());
        let plan = plan_for_node(&profile);
        assert_eq!(plan.base_image, "node:16-slim");
        assert!(!plan.base_image.contains(char::is_whitespace));
    }

    #[test]
    fn plain_node_runs_entry_point() {
        let mut profile = node_profile();
        profile.entry_point = Some("server.js".to_string());
        let plan = plan_for_node(&profile);
        assert_eq!(plan.run_command, "node server.js");
        assert!(plan.setup_steps.is_empty());
    }

    #[test]
    fn node_bin_package_installed_globally() {
        let mut profile = node_profile();
        profile.bin_command = Some("my-server".to_string());
        let plan = plan_for_node(&profile);
        assert_eq!(plan.run_command, "my-server");
        assert!(plan.setup_steps.contains(&"npm install -g .".to_string()));
        assert!(plan.build_command.is_some());
    }

    #[test]
    fn poetry_project_plan() {
        let mut profile = ProjectProfile::bare(
            Ecosystem::Python,
            PackageManager::Poetry,
            ManifestKind::Pyproject,
        );
        profile.bin_command = Some("time-server".to_string());
        profile.runtime_version = Some("3.12".to_string());

        let plan = plan_for_python(&profile);
        assert_eq!(plan.base_image, "python:3.12-slim");
        assert_eq!(plan.install_command, "poetry install");
        assert_eq!(plan.run_command, "poetry run time-server");
    }

    #[test]
    fn requirements_project_plan() {
        let profile = ProjectProfile::bare(
            Ecosystem::Python,
            PackageManager::Pip,
            ManifestKind::Requirements,
        );
        let plan = plan_for_python(&profile);
        assert_eq!(plan.install_command, "pip install -r requirements.txt");
    }

    #[test]
    fn rust_projects_unsupported() {
        let profile =
            ProjectProfile::bare(Ecosystem::Rust, PackageManager::Cargo, ManifestKind::CargoToml);
        let target = BuildTarget::LocalDirectory { path: "/p".into() };
        let err = synthesize(&target, Some(&profile)).unwrap_err();
        assert!(matches!(err, StevedoreError::UnsupportedEcosystem(_)));
    }
}
