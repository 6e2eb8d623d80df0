//! Dockerfile rendering
//!
//! Turns a `BuildPlan` into Dockerfile text. Rendering is a pure function of
//! the plan, so two equal plans always produce identical Dockerfiles and the
//! engine's layer cache stays warm across invocations.

use crate::plan::BuildPlan;
use std::fmt::Write;

/// Render the Dockerfile for a project build (directory or git target).
/// The build context contains the project tree; dependencies install inside
/// the image.
pub fn render_project_dockerfile(plan: &BuildPlan) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "FROM {}", plan.base_image);
    let _ = writeln!(out);
    let _ = writeln!(out, "WORKDIR /app");
    let _ = writeln!(out);

    // Setup steps split around the copy: manager installs come first, the
    // trailing global-install of the package itself must follow the build.
    let (pre_copy, post_build): (Vec<&String>, Vec<&String>) = plan
        .setup_steps
        .iter()
        .partition(|s| !s.contains("install -g .") && !s.contains("global add file:."));

    for step in &pre_copy {
        let _ = writeln!(out, "RUN {}", step);
    }
    if !pre_copy.is_empty() {
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "COPY . .");
    let _ = writeln!(out);

    if !plan.install_command.is_empty() {
        let _ = writeln!(out, "RUN {}", plan.install_command);
        let _ = writeln!(out);
    }

    if let Some(ref build) = plan.build_command {
        let _ = writeln!(out, "RUN {}", build);
        let _ = writeln!(out);
    }

    for step in &post_build {
        let _ = writeln!(out, "RUN {}", step);
    }
    if !post_build.is_empty() {
        let _ = writeln!(out);
    }

    render_env_and_cmd(&mut out, plan);
    out
}

/// Render the Dockerfile for a bare command target. No build context beyond
/// the Dockerfile itself; the runner resolves the package at setup or run
/// time.
pub fn render_command_dockerfile(plan: &BuildPlan) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "FROM {}", plan.base_image);
    let _ = writeln!(out);
    let _ = writeln!(out, "WORKDIR /app");
    let _ = writeln!(out);

    for step in &plan.setup_steps {
        let _ = writeln!(out, "RUN {}", step);
    }
    if !plan.setup_steps.is_empty() {
        let _ = writeln!(out);
    }

    render_env_and_cmd(&mut out, plan);
    out
}

fn render_env_and_cmd(out: &mut String, plan: &BuildPlan) {
    for (key, value) in &plan.default_env {
        let _ = writeln!(out, "ENV {}={}", key, value);
    }
    if !plan.default_env.is_empty() {
        let _ = writeln!(out);
    }

    if let Some(port) = plan.declared_port {
        let _ = writeln!(out, "EXPOSE {}", port);
        let _ = writeln!(out);
    }

    // sh -c form so EXTRA_ARGS (user arguments forwarded at run time) expand
    // into the command line when present and vanish when not.
    let _ = writeln!(
        out,
        "CMD [\"sh\", \"-c\", \"{} ${{EXTRA_ARGS:+$EXTRA_ARGS}}\"]",
        plan.run_command
    );
}

/// Pick the renderer that matches how the plan was synthesized: plans with
/// an install command need the project context, the rest are command plans.
pub fn render(plan: &BuildPlan, has_project_context: bool) -> String {
    if has_project_context {
        render_project_dockerfile(plan)
    } else {
        render_command_dockerfile(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BuildTarget;
    use crate::plan::synthesize;
    use crate::profile::{Ecosystem, ManifestKind, PackageManager, ProjectProfile};

    #[test]
    fn command_dockerfile_shape() {
        let target = BuildTarget::Command {
            argv: vec!["uvx".into(), "mcp-server-time".into()],
        };
        let plan = synthesize(&target, None).unwrap().unwrap();
        let text = render_command_dockerfile(&plan);

        assert!(text.starts_with("FROM python:3.11-slim\n"));
        assert!(text.contains("RUN pip install uv\n"));
        assert!(text.contains("ENV MCP_STDIO=true\n"));
        assert!(text.contains(
            "CMD [\"sh\", \"-c\", \"uvx mcp-server-time ${EXTRA_ARGS:+$EXTRA_ARGS}\"]"
        ));
        assert!(!text.contains("COPY"));
    }

    #[test]
    fn project_dockerfile_orders_install_before_run() {
        let mut profile = ProjectProfile::bare(
            Ecosystem::Node,
            PackageManager::Npm,
            ManifestKind::PackageJson,
        );
        profile.entry_point = Some("server.js".to_string());
        profile.declared_port = Some(3000);

        let target = BuildTarget::LocalDirectory { path: "/p".into() };
        let plan = synthesize(&target, Some(&profile)).unwrap().unwrap();
        let text = render_project_dockerfile(&plan);

        let copy = text.find("COPY . .").unwrap();
        let install = text.find("RUN npm install").unwrap();
        let cmd = text.find("CMD [").unwrap();
        assert!(copy < install && install < cmd);
        assert!(text.contains("EXPOSE 3000\n"));
        assert!(text.contains("ENV PORT=3000\n"));
    }

    #[test]
    fn global_bin_install_comes_after_build() {
        let mut profile = ProjectProfile::bare(
            Ecosystem::Node,
            PackageManager::Npm,
            ManifestKind::PackageJson,
        );
        profile.bin_command = Some("my-server".to_string());

        let target = BuildTarget::LocalDirectory { path: "/p".into() };
        let plan = synthesize(&target, Some(&profile)).unwrap().unwrap();
        let text = render_project_dockerfile(&plan);

        let build = text.find("npm run build").unwrap();
        let global = text.find("RUN npm install -g .").unwrap();
        assert!(build < global);
        assert!(text.contains("CMD [\"sh\", \"-c\", \"my-server ${EXTRA_ARGS:+$EXTRA_ARGS}\"]"));
    }

    #[test]
    fn monorepo_manager_installed_before_copy() {
        let mut profile = ProjectProfile::bare(
            Ecosystem::Node,
            PackageManager::Pnpm,
            ManifestKind::PackageJson,
        );
        profile.is_monorepo = true;
        profile.entry_point = Some("index.js".to_string());

        let target = BuildTarget::LocalDirectory { path: "/p".into() };
        let plan = synthesize(&target, Some(&profile)).unwrap().unwrap();
        let text = render_project_dockerfile(&plan);

        let manager = text.find("RUN npm install -g pnpm").unwrap();
        let copy = text.find("COPY . .").unwrap();
        assert!(manager < copy);
        assert!(text.contains("RUN pnpm install\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let target = BuildTarget::Command {
            argv: vec!["npx".into(), "-y".into(), "server".into()],
        };
        let plan = synthesize(&target, None).unwrap().unwrap();
        assert_eq!(
            render_command_dockerfile(&plan),
            render_command_dockerfile(&plan)
        );
    }
}
