//! Last-write-wins topic histogram.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thyself_shared::{ProfileHistogram, Result};
use tracing::debug;

use crate::{StatusStore, Storage, keys};

/// Stores the orchestrator's [`ProfileHistogram`]. No merge logic lives here.
#[derive(Clone)]
pub struct ProfileStore {
    storage: Arc<Storage>,
    status: StatusStore,
}

impl ProfileStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        let status = StatusStore::new(storage.clone());
        Self { storage, status }
    }

    /// Replace the stored histogram, stamping `updated_at` and the sync status.
    pub async fn set(&self, histogram: ProfileHistogram) -> Result<ProfileHistogram> {
        self.set_at(histogram, Utc::now()).await
    }

    pub async fn set_at(
        &self,
        mut histogram: ProfileHistogram,
        now: DateTime<Utc>,
    ) -> Result<ProfileHistogram> {
        histogram.updated_at = Some(now);
        self.storage.set_json(keys::PROFILE, &histogram).await?;
        self.status.stamp(now).await?;
        debug!(
            t0 = histogram.t0.len(),
            t1 = histogram.t1.len(),
            "profile replaced"
        );
        Ok(histogram)
    }

    pub async fn get(&self) -> Result<Option<ProfileHistogram>> {
        self.storage.get_json(keys::PROFILE).await
    }

    /// Reset to "no profile". Does not touch the sync status.
    pub async fn clear(&self) -> Result<()> {
        self.storage.remove(keys::PROFILE).await
    }
}
