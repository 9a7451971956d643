//! Last-sync timestamp, stamped as a side effect of profile and archive writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thyself_shared::{Result, SyncStatus};

use crate::{Storage, keys};

/// Read/stamp access to the global [`SyncStatus`].
#[derive(Clone)]
pub struct StatusStore {
    storage: Arc<Storage>,
}

impl StatusStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Current status; `last_sync_at` is `None` until the first sync write.
    pub async fn get(&self) -> Result<SyncStatus> {
        Ok(self
            .storage
            .get_json::<SyncStatus>(keys::STATUS)
            .await?
            .unwrap_or_default())
    }

    /// Only the profile and archive stores call this.
    pub(crate) async fn stamp(&self, now: DateTime<Utc>) -> Result<()> {
        let status = SyncStatus {
            last_sync_at: Some(now),
        };
        self.storage.set_json(keys::STATUS, &status).await
    }
}
