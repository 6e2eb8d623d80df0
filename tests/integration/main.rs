//! CLI integration tests
//!
//! Exercise the binary end to end without a container engine: a config file
//! pointing at a nonexistent engine binary makes engine-dependent paths fail
//! fast with a deterministic message.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn stevedore() -> Command {
    Command::cargo_bin("stevedore").unwrap()
}

/// Config isolated to a temp dir: bogus engine, private cache.
fn isolated_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let cache = dir.path().join("cache");
    std::fs::write(
        &path,
        format!(
            "engine_binary = \"stevedore-test-no-such-engine\"\ncache_dir = \"{}\"\n",
            cache.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    stevedore()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("cache"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_prints() {
    stevedore()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stevedore"));
}

#[test]
fn run_requires_a_target() {
    stevedore()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TARGET"));
}

#[test]
fn unbalanced_quotes_fail_before_any_engine_work() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .args(["--config", config.to_str().unwrap(), "run", "npx \"unbalanced"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unbalanced"));
}

#[test]
fn missing_engine_is_reported_with_hint() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .args([
            "--config",
            config.to_str().unwrap(),
            "build",
            "uvx",
            "mcp-server-time",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("runfinch.com"));
}

#[test]
fn cache_stats_on_empty_cache() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .args(["--config", config.to_str().unwrap(), "cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("entries:    0"));
}

#[test]
fn cache_clear_on_empty_cache() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .args(["--config", config.to_str().unwrap(), "cache", "clear"])
        .assert()
        .success();
}

#[test]
fn corrupt_cache_store_degrades_instead_of_failing() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);
    let cache = dir.path().join("cache");
    std::fs::create_dir_all(&cache).unwrap();
    std::fs::write(cache.join("build-cache.json"), "{ not json at all").unwrap();

    stevedore()
        .args(["--config", config.to_str().unwrap(), "cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unreadable"));
}

#[test]
fn mcp_stdio_marker_suppresses_status_lines() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .env("MCP_STDIO", "true")
        .args(["--config", config.to_str().unwrap(), "cache", "clear"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed").not());
}

#[test]
fn mcp_stdio_marker_silences_tracing_even_when_verbose() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .env("MCP_STDIO", "true")
        .env_remove("RUST_LOG")
        .args(["-vv", "--config", config.to_str().unwrap(), "cache", "clear"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn status_reports_missing_engine_without_failing() {
    let dir = TempDir::new().unwrap();
    let config = isolated_config(&dir);

    stevedore()
        .args(["--config", config.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found on PATH"));
}

#[test]
fn invalid_config_is_a_hard_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "grace_period_secs = \"soon\"\n").unwrap();

    stevedore()
        .args(["--config", path.to_str().unwrap(), "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}
