//! Inspect command implementation.

use super::{describe, CommandResult, Stores};
use deferq_protocol::QueuedRequest;
use deferq_store::FileStore;
use serde::Serialize;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Stored push subscription identifier.
    pub subscription_id: Option<String>,
    /// When the application last seeded init data (epoch millis).
    pub last_update: Option<u64>,
    /// Targets with seeded api info.
    pub targets: Vec<String>,
    /// Queued requests in timestamp order.
    pub requests: Vec<QueuedRequest>,
}

/// Runs the inspect command.
pub async fn run(store: FileStore, format: &str) -> CommandResult {
    let stores = Stores::new(store);

    let mut targets: Vec<String> = stores.init.apis().await?.into_keys().collect();
    targets.sort();

    let result = InspectResult {
        subscription_id: stores.subscriptions.get().await?,
        last_update: stores.init.last_update().await?.map(|ts| ts.as_millis()),
        targets,
        requests: stores.queue.all().await?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Subscription: {}", result.subscription_id.as_deref().unwrap_or("(none)"));
    match result.last_update {
        Some(ms) => println!("Init data:    seeded at {ms}"),
        None => println!("Init data:    (never seeded)"),
    }
    if !result.targets.is_empty() {
        println!("Targets:      {}", result.targets.join(", "));
    }
    println!();
    println!("Queued requests: {}", result.requests.len());
    for entry in &result.requests {
        println!("  {}", describe(entry));
    }
}
