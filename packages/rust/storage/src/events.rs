//! Debug log of sanitized events, bounded to the most recent window.

use std::sync::Arc;

use thyself_shared::{Event, Result};
use tokio::sync::Mutex;

use crate::{Storage, keys};

/// Most-recent-window event log. Stored oldest first.
#[derive(Clone)]
pub struct EventLog {
    storage: Arc<Storage>,
    cap: usize,
    write_lock: Arc<Mutex<()>>,
}

impl EventLog {
    pub fn new(storage: Arc<Storage>, cap: usize) -> Self {
        Self {
            storage,
            cap,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append an event, evicting the oldest beyond the cap.
    pub async fn append(&self, event: Event) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut events = self.load().await?;
        events.push(event);
        if events.len() > self.cap {
            let excess = events.len() - self.cap;
            events.drain(..excess);
        }
        self.storage.set_json(keys::EVENTS, &events).await
    }

    /// Up to `limit` events, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Event>> {
        let events = self.load().await?;
        Ok(events.into_iter().rev().take(limit).collect())
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove(keys::EVENTS).await
    }

    async fn load(&self) -> Result<Vec<Event>> {
        Ok(self
            .storage
            .get_json::<Vec<Event>>(keys::EVENTS)
            .await?
            .unwrap_or_default())
    }
}
