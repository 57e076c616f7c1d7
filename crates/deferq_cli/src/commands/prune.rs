//! Prune command implementation.

use super::serviceable::plan;
use super::{describe, CommandResult, Stores};
use deferq_store::FileStore;
use deferq_sync::policy::prune_requests;
use tracing::debug;

/// Runs the prune command.
pub async fn run(
    store: FileStore,
    subscribed: bool,
    topic_property: &str,
    dry_run: bool,
) -> CommandResult {
    let stores = Stores::new(store);
    let all = stores.queue.all().await?;
    let plan = plan(&all, subscribed, topic_property);

    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    if plan.discard.is_empty() {
        println!("Nothing to prune");
        return Ok(());
    }

    for entry in &plan.discard {
        println!("  {}", describe(entry));
    }
    if dry_run {
        println!("Would delete {} of {} queued requests", plan.discard.len(), all.len());
        return Ok(());
    }

    let removed = prune_requests(&stores.queue, &all, &plan.keep).await?;
    debug!(removed, kept = plan.keep.len(), "queue pruned");
    println!("✓ Deleted {removed} of {} queued requests", all.len());
    Ok(())
}
