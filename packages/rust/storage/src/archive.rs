//! Bounded, newest-first archive of recommended pieces.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use thyself_shared::{ArchivePiece, Result};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{StatusStore, Storage, keys};

/// Date format used for archive entries.
const DATE_FORMAT: &str = "%Y/%m/%d";

/// Append-only archive; index 0 is the newest piece.
#[derive(Clone)]
pub struct ArchiveStore {
    storage: Arc<Storage>,
    status: StatusStore,
    cap: usize,
    write_lock: Arc<Mutex<()>>,
}

impl ArchiveStore {
    pub fn new(storage: Arc<Storage>, cap: usize) -> Self {
        let status = StatusStore::new(storage.clone());
        Self {
            storage,
            status,
            cap,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Insert `piece` at the front, fill a missing date with today, and drop
    /// the oldest entries beyond the cap.
    pub async fn append(&self, piece: ArchivePiece) -> Result<ArchivePiece> {
        self.append_at(piece, Local::now()).await
    }

    pub async fn append_at(
        &self,
        mut piece: ArchivePiece,
        now: DateTime<Local>,
    ) -> Result<ArchivePiece> {
        if piece.date.trim().is_empty() {
            piece.date = now.format(DATE_FORMAT).to_string();
        }

        let _guard = self.write_lock.lock().await;
        let mut pieces = self.list().await?;
        pieces.insert(0, piece.clone());
        pieces.truncate(self.cap);
        self.storage.set_json(keys::ARCHIVE, &pieces).await?;
        self.status.stamp(now.with_timezone(&Utc)).await?;

        debug!(count = pieces.len(), title = %piece.title, "archive piece appended");
        Ok(piece)
    }

    /// All pieces, newest first. Image aliases are canonicalized on read.
    pub async fn list(&self) -> Result<Vec<ArchivePiece>> {
        Ok(self
            .storage
            .get_json::<Vec<ArchivePiece>>(keys::ARCHIVE)
            .await?
            .unwrap_or_default())
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove(keys::ARCHIVE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;

    fn piece(title: &str) -> ArchivePiece {
        ArchivePiece {
            date: "2024/01/01".into(),
            title: title.into(),
            source: "Example".into(),
            url: format!("https://example.com/{title}"),
            image_url: String::new(),
        }
    }

    #[tokio::test]
    async fn newest_first_and_bounded() {
        let archive = ArchiveStore::new(test_storage().await, 365);
        for i in 0..400 {
            archive.append(piece(&format!("p{i}"))).await.unwrap();
        }

        let pieces = archive.list().await.unwrap();
        assert_eq!(pieces.len(), 365);
        assert_eq!(pieces[0].title, "p399");
        assert_eq!(pieces[364].title, "p35");
        assert!(!pieces.iter().any(|p| p.title == "p34"));
    }

    #[tokio::test]
    async fn missing_date_defaults_to_today() {
        let storage = test_storage().await;
        let archive = ArchiveStore::new(storage.clone(), 365);
        let status = StatusStore::new(storage);

        let mut bare = piece("X");
        bare.date = String::new();
        let stored = archive.append(bare).await.unwrap();

        let today = Local::now().format(DATE_FORMAT).to_string();
        assert_eq!(stored.date, today);
        assert_eq!(archive.list().await.unwrap()[0].date, today);
        assert!(status.get().await.unwrap().last_sync_at.is_some());
    }

    #[tokio::test]
    async fn legacy_image_key_resolves_on_read() {
        let storage = test_storage().await;
        storage
            .set_raw(
                keys::ARCHIVE,
                r#"[{"date":"2023/05/01","title":"Old","source":"s","url":"u","imageUrl":"http://img"}]"#,
            )
            .await
            .unwrap();

        let archive = ArchiveStore::new(storage.clone(), 365);
        let pieces = archive.list().await.unwrap();
        assert_eq!(pieces[0].image_url, "http://img");

        // The next write persists both keys.
        archive.append(piece("New")).await.unwrap();
        let raw = storage.get_raw(keys::ARCHIVE).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[1]["image_url"], "http://img");
        assert_eq!(json[1]["imageUrl"], "http://img");
    }

    #[tokio::test]
    async fn clear_empties_archive() {
        let archive = ArchiveStore::new(test_storage().await, 3);
        archive.append(piece("a")).await.unwrap();
        archive.clear().await.unwrap();
        assert!(archive.list().await.unwrap().is_empty());
    }
}
