use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::store::InMemoryStore;

/// Background task that rewrites the journal once `threshold` appends have
/// accumulated since the last compaction.
pub async fn run_compactor(store: Arc<InMemoryStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor pass. Returns true when a compaction ran.
pub async fn compact_if_due(store: &InMemoryStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    debug!(appends, threshold, "compacting journal");
    match store.compact().await {
        Ok(()) => true,
        Err(e) => {
            error!("journal compaction failed: {e}");
            false
        }
    }
}
