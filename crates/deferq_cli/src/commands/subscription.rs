//! Subscription command implementation.

use super::{CommandResult, Stores};
use deferq_store::FileStore;

/// Prints the stored push subscription identifier.
pub async fn run(store: FileStore) -> CommandResult {
    match Stores::new(store).subscriptions.get().await? {
        Some(id) => println!("{id}"),
        None => println!("No subscription stored"),
    }
    Ok(())
}
