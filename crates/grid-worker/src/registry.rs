use std::collections::HashMap;
use std::sync::Arc;

use grid_domain::StateGuid;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Concurrent mapping from producer guid to a per-producer mutex, with
/// lazy entry creation (§5: "a concurrent mapping from `state_guid` to
/// mutex, with lazy entry creation"). Writes for distinct producers
/// proceed in parallel; writes for the same producer serialize on the
/// mutex returned here.
#[derive(Debug, Default)]
pub struct ProducerLockRegistry {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ProducerLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_for(&self, producer: StateGuid) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(producer.as_uuid())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
