use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::core::OptimisticStore;
use super::types::RemoteStageChange;

/// Drain a change feed from other sessions into the store.
///
/// Runs until every sender is dropped and returns how many changes were
/// applied immediately. Deferred and stale changes are not counted.
pub async fn pump_remote_changes(
    store: Arc<OptimisticStore>,
    mut feed: mpsc::Receiver<RemoteStageChange>,
) -> usize {
    let mut applied = 0;
    while let Some(change) = feed.recv().await {
        let id = change.opportunity_id.clone();
        match store.apply_remote(change) {
            Ok(true) => applied += 1,
            Ok(false) => debug!(opportunity = %id, "remote change not applied yet"),
            Err(e) => warn!(opportunity = %id, error = %e, "ignoring remote change"),
        }
    }
    debug!(applied, "remote change feed closed");
    applied
}
