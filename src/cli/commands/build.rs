//! `build` command: produce the image and report it without running.

use crate::classify::classify;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::engine::{ContainerEngine, FinchEngine};
use crate::error::StevedoreResult;
use crate::pipeline::Pipeline;
use crate::status;
use serde::Serialize;

#[derive(Serialize)]
struct BuildReport<'a> {
    image_reference: &'a str,
    cache_key: Option<&'a str>,
    cache_hit: bool,
}

pub async fn execute(args: BuildArgs, config: &Config) -> StevedoreResult<i32> {
    let target = classify(&args.target, &args.args, false)?;

    let engine = FinchEngine::new(&config.engine_binary);
    engine.ensure_ready().await?;

    let pipeline = Pipeline::new(&engine, config);
    let outcome = pipeline.resolve_image(&target).await?;

    if let Some(ref tag) = args.tag {
        engine.tag(&outcome.image_reference, tag).await?;
        status!("Tagged {} as {}", outcome.image_reference, tag);
        if args.push {
            engine.push(tag).await?;
            status!("Pushed {}", tag);
        }
    }

    if args.json {
        let report = BuildReport {
            image_reference: &outcome.image_reference,
            cache_key: outcome.cache_key.as_deref(),
            cache_hit: outcome.cache_hit,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", outcome.image_reference);
        if let Some(key) = &outcome.cache_key {
            println!("cache key: {}", key);
        }
        if outcome.cache_hit {
            println!("(cached)");
        }
    }
    Ok(0)
}
