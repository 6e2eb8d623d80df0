//! `status` command: engine availability, VM state, cache summary.

use crate::cache::store::CacheStore;
use crate::config::Config;
use crate::engine::{ContainerEngine, FinchEngine, VmStatus};
use crate::error::StevedoreResult;
use console::style;

pub async fn execute(config: &Config) -> StevedoreResult<i32> {
    let engine = FinchEngine::new(&config.engine_binary);

    println!("{}", style("Engine").bold());
    if engine.is_available().await {
        println!("  {} {}", style("✓").green(), config.engine_binary);
        match engine.vm_status().await? {
            VmStatus::Running => println!("  {} VM running", style("✓").green()),
            VmStatus::Stopped => {
                println!(
                    "  {} VM stopped (starts automatically on next run)",
                    style("○").yellow()
                )
            }
            VmStatus::NotApplicable => {}
        }
    } else {
        println!(
            "  {} {} not found on PATH",
            style("✗").red(),
            config.engine_binary
        );
    }

    let store = CacheStore::open(&config.cache_dir())?;
    let stats = store.stats();
    println!("{}", style("Cache").bold());
    println!("  {} entries, {} hits", stats.entry_count, stats.total_hits);
    println!("  {}", stats.store_path.display());

    Ok(0)
}
