use std::sync::Arc;
use tracing::warn;

use docrag_core::error::Result;
use docrag_core::traits::IndexStore;
use docrag_core::types::StoreUnavailablePolicy;

/// Answers "has this filepath already been indexed?" by exact match on the
/// stored `filepath` metadata. Callers canonicalize before asking.
#[derive(Clone)]
pub struct DedupGuard {
    store: Arc<dyn IndexStore>,
    policy: StoreUnavailablePolicy,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn IndexStore>, policy: StoreUnavailablePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn exists(&self, filepath: &str) -> Result<bool> {
        match self.store.count_by_filepath(filepath).await {
            Ok(n) => Ok(n > 0),
            Err(e) => match self.policy {
                StoreUnavailablePolicy::FailOpen => {
                    // Duplicate ingestion is possible while the store is down.
                    warn!("Dedup check failed for {}, treating as not indexed: {}", filepath, e);
                    Ok(false)
                }
                StoreUnavailablePolicy::FailClosed => Err(e),
            },
        }
    }
}
