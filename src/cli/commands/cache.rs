//! `cache` subcommands: stats, clear, evict.

use crate::cli::args::CacheCommands;
use crate::config::Config;
use crate::engine::{ContainerEngine, FinchEngine};
use crate::error::StevedoreResult;
use crate::{cache::store::CacheStore, status};
use chrono::{Duration, Utc};
use console::style;
use tracing::debug;

pub async fn execute(command: CacheCommands, config: &Config) -> StevedoreResult<i32> {
    let mut store = CacheStore::open(&config.cache_dir())?;

    match command {
        CacheCommands::Stats => {
            let stats = store.stats();
            println!("{}", style("Build cache").bold());
            println!("  entries:    {}", stats.entry_count);
            println!("  total hits: {}", stats.total_hits);
            println!(
                "  est. size:  {}",
                indicatif::HumanBytes(stats.total_size_bytes)
            );
            if let Some(oldest) = stats.oldest_entry {
                println!("  oldest:     {}", oldest.format("%Y-%m-%d %H:%M UTC"));
            }
            println!("  store:      {}", stats.store_path.display());
            if store.is_degraded() {
                println!(
                    "  {}",
                    style("store file is unreadable; run `stevedore cache clear` to reset").yellow()
                );
            }

            let mut entries: Vec<_> = store.entries().collect();
            entries.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
            for entry in entries {
                println!(
                    "  {}  {} hits  {}",
                    style(&entry.image_reference).cyan(),
                    entry.hits,
                    entry.source
                );
            }
            Ok(0)
        }
        CacheCommands::Clear => {
            let removed = store.clear()?;
            remove_images(config, &removed).await;
            status!("Removed {} cache entries", removed.len());
            Ok(0)
        }
        CacheCommands::Evict { older_than } => {
            let cutoff = Utc::now() - Duration::days(i64::from(older_than));
            // A held lock means a build is using that key right now
            let locks_dir = config.cache_dir().join("locks");
            let removed = store.evict(|entry| {
                entry.last_used_at < cutoff
                    && !locks_dir.join(format!("{}.lock", entry.key)).exists()
            })?;
            remove_images(config, &removed).await;
            status!(
                "Evicted {} entries not used in the last {} days",
                removed.len(),
                older_than
            );
            Ok(0)
        }
    }
}

/// Best-effort image removal: a missing engine or already-pruned image must
/// not fail the metadata operation that already succeeded.
async fn remove_images(config: &Config, removed: &[crate::cache::store::CacheEntry]) {
    if removed.is_empty() {
        return;
    }
    let engine = FinchEngine::new(&config.engine_binary);
    if !engine.is_available().await {
        debug!("engine unavailable, leaving images in place");
        return;
    }
    for entry in removed {
        if let Err(e) = engine.remove_image(&entry.image_reference).await {
            debug!(image = %entry.image_reference, error = %e, "image removal failed");
        }
    }
}
