//! Serviceable command implementation.
//!
//! A dry run of the replay selection. The CLI cannot ask the platform
//! whether a push subscription is live, so the caller says so.

use super::{describe, CommandResult, Stores};
use deferq_protocol::policy::select_serviceable;
use deferq_protocol::QueuedRequest;
use deferq_store::FileStore;

/// The entries the next replay would send and discard.
#[derive(Debug, Default)]
pub struct Plan {
    /// Entries that would be replayed, in replay order.
    pub keep: Vec<QueuedRequest>,
    /// Entries that would be deleted unsent.
    pub discard: Vec<QueuedRequest>,
}

/// Splits `all` into what the next replay would send and discard.
pub fn plan(all: &[QueuedRequest], subscribed: bool, topic_property: &str) -> Plan {
    let keep = select_serviceable(all, topic_property, subscribed);
    let discard = all
        .iter()
        .filter(|e| !keep.iter().any(|k| k.timestamp == e.timestamp))
        .cloned()
        .collect();
    Plan { keep, discard }
}

/// Runs the serviceable command.
pub async fn run(store: FileStore, subscribed: bool, topic_property: &str) -> CommandResult {
    let all = Stores::new(store).queue.all().await?;
    let plan = plan(&all, subscribed, topic_property);

    println!("Would replay ({}):", plan.keep.len());
    for entry in &plan.keep {
        println!("  {}", describe(entry));
    }
    println!();
    println!("Would discard ({}):", plan.discard.len());
    for entry in &plan.discard {
        println!("  {}", describe(entry));
    }

    Ok(())
}
