//! `run` command: resolve an image for the target and supervise it.

use crate::classify::{classify, BuildTarget};
use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::engine::{FinchEngine, RunSpec};
use crate::error::{StevedoreError, StevedoreResult};
use crate::orchestrate::RunSession;
use crate::pipeline::Pipeline;
use crate::plan::MCP_ENV_MARKERS;
use std::time::Duration;

pub async fn execute(args: RunArgs, config: &Config) -> StevedoreResult<i32> {
    let target = classify(&args.target, &args.args, args.direct)?;

    let engine = FinchEngine::new(&config.engine_binary);
    engine.ensure_ready().await?;

    let pipeline = Pipeline::new(&engine, config);
    let outcome = pipeline.resolve_image(&target).await?;

    let spec = RunSpec {
        image: outcome.image_reference,
        env: merged_env(&args.env)?,
        volumes: args.volumes,
        host_network: args.host_network,
        extra_args: extra_args(&target, &args.args),
    };

    let mut session = RunSession::new(Duration::from_secs(config.grace_period_secs));
    session.run(&engine, &spec).await
}

/// Protocol markers first, user overrides last so `-e` always wins. The
/// markers are set at run time as well as bake time because direct image
/// targets never went through a build.
fn merged_env(overrides: &[String]) -> StevedoreResult<Vec<(String, String)>> {
    let mut env: Vec<(String, String)> = MCP_ENV_MARKERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for pair in overrides {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            StevedoreError::Classification(format!(
                "environment variable must be KEY=VALUE, got '{}'",
                pair
            ))
        })?;
        env.retain(|(k, _)| k != key);
        env.push((key.to_string(), value.to_string()));
    }
    Ok(env)
}

/// Arguments forwarded into the container. Command targets bake their argv
/// into the image CMD, so only non-command targets forward the trailing args.
fn extra_args(target: &BuildTarget, args: &[String]) -> Vec<String> {
    match target {
        BuildTarget::Command { .. } => Vec::new(),
        _ => args.to_vec(),
    }
}
