//! Content-addressed, time-bounded set of unique titles.
//!
//! Every mutating method here is a read-modify-write over one storage
//! document. Callers must serialize them (see the title lane in
//! `thyself-core`); two overlapping updates can otherwise lose an append.

use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fnv::FnvHasher;
use thyself_shared::{Event, Result, TitleBatchEntry};
use tracing::{debug, trace};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::{Storage, keys};

/// Characters dropped from titles before hashing.
const QUOTE_CHARS: &[char] = &[
    '"', '\'', '`', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{201C}', '\u{201D}',
    '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}',
];

/// Normalize a title for deduplication: lowercase, strip diacritics and
/// quotes, collapse whitespace, trim.
pub fn normalize_title(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c) && !QUOTE_CHARS.contains(c))
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Entry id for a title: FNV-1a 64 of the normalized form, as 16 hex digits.
pub fn title_id(title: &str) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(normalize_title(title).as_bytes());
    format!("{:016x}", hasher.finish())
}

/// The deduplicated title batch awaiting pickup.
#[derive(Clone)]
pub struct TitleStore {
    storage: Arc<Storage>,
    retention: Duration,
}

impl TitleStore {
    pub fn new(storage: Arc<Storage>, retention_days: i64) -> Self {
        Self {
            storage,
            retention: Duration::days(retention_days),
        }
    }

    /// Record a sighting. Repeated sightings of the same normalized title
    /// only move `ts` forward.
    pub async fn update(&self, event: &Event) -> Result<()> {
        self.update_at(event, Utc::now()).await
    }

    pub async fn update_at(&self, event: &Event, now: DateTime<Utc>) -> Result<()> {
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| !self.is_expired(e, now));
        let pruned = before - entries.len();

        let id = title_id(&event.title);
        match entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => {
                existing.ts = existing.ts.max(event.ts);
                if existing.length.is_none() {
                    existing.length = event.length.clone();
                }
                trace!(%id, "title refreshed");
            }
            None => {
                entries.push(TitleBatchEntry {
                    id: id.clone(),
                    title: event.title.clone(),
                    ts: event.ts,
                    platform: event.platform.clone(),
                    length: event.length.clone(),
                });
                debug!(%id, title = %event.title, "title added");
            }
        }

        if pruned > 0 {
            debug!(pruned, "expired titles dropped");
        }
        self.storage.set_json(keys::TITLES, &entries).await
    }

    /// Current batch, with expired entries filtered out.
    pub async fn list(&self) -> Result<Vec<TitleBatchEntry>> {
        self.list_at(Utc::now()).await
    }

    pub async fn list_at(&self, now: DateTime<Utc>) -> Result<Vec<TitleBatchEntry>> {
        let mut entries = self.load().await?;
        entries.retain(|e| !self.is_expired(e, now));
        Ok(entries)
    }

    /// Remove the entries whose id is listed. Unknown ids are ignored.
    /// Returns how many entries were removed.
    pub async fn acknowledge(&self, ids: &[String]) -> Result<usize> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| !wanted.contains(e.id.as_str()));
        let removed = before - entries.len();
        if removed > 0 {
            self.storage.set_json(keys::TITLES, &entries).await?;
        }
        debug!(requested = ids.len(), removed, "titles acknowledged");
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.remove(keys::TITLES).await
    }

    fn is_expired(&self, entry: &TitleBatchEntry, now: DateTime<Utc>) -> bool {
        now - entry.ts > self.retention
    }

    async fn load(&self) -> Result<Vec<TitleBatchEntry>> {
        Ok(self
            .storage
            .get_json::<Vec<TitleBatchEntry>>(keys::TITLES)
            .await?
            .unwrap_or_default())
    }
}
