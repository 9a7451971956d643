//! Message router: the single entry point into the stores.
//!
//! Every request is `(action, payload)` and every answer is a [`Response`].
//! Handler failures are caught here and turned into `{ok: false, error}`;
//! nothing propagates past [`Router::dispatch`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thyself_shared::{ArchivePiece, Event, ProfileHistogram, Result, RetentionConfig, ThyselfError};
use thyself_storage::{ArchiveStore, EventLog, ProfileStore, StatusStore, Storage, TitleStore};
use tracing::{debug, warn};

use crate::lane::TitleLane;
use crate::sanitizer::sanitize_event;

/// Default `GET_RECENT` window.
pub const DEFAULT_RECENT_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Closed set of protocol actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetTitles,
    AckTitles,
    ClearTitles,
    SetProfile,
    GetProfile,
    AppendPiece,
    GetArchive,
    GetStatus,
    ClearProfileArchive,
    /// Debug: record an event.
    AddEvent,
    /// Debug: newest events.
    GetRecent,
    /// Debug: empty the event log.
    Clear,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Self::GetTitles,
        Self::AckTitles,
        Self::ClearTitles,
        Self::SetProfile,
        Self::GetProfile,
        Self::AppendPiece,
        Self::GetArchive,
        Self::GetStatus,
        Self::ClearProfileArchive,
        Self::AddEvent,
        Self::GetRecent,
        Self::Clear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetTitles => "GET_TITLES",
            Self::AckTitles => "ACK_TITLES",
            Self::ClearTitles => "CLEAR_TITLES",
            Self::SetProfile => "SET_PROFILE",
            Self::GetProfile => "GET_PROFILE",
            Self::AppendPiece => "APPEND_PIECE",
            Self::GetArchive => "GET_ARCHIVE",
            Self::GetStatus => "GET_STATUS",
            Self::ClearProfileArchive => "CLEAR_PROFILE_ARCHIVE",
            Self::AddEvent => "ADD_EVENT",
            Self::GetRecent => "GET_RECENT",
            Self::Clear => "CLEAR",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform answer to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(data: Option<Value>) -> Self {
        Self {
            ok: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Decode `data` (absent reads as `null`), or surface `error`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        if !self.ok {
            return Err(ThyselfError::Protocol(
                self.error.unwrap_or_else(|| "request failed".into()),
            ));
        }
        Ok(serde_json::from_value(self.data.unwrap_or(Value::Null))?)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AckPayload {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct SetProfilePayload {
    profile: ProfileHistogram,
}

#[derive(Deserialize)]
struct AppendPiecePayload {
    piece: ArchivePiece,
}

#[derive(Deserialize)]
struct AddEventPayload {
    event: Event,
}

#[derive(Deserialize, Default)]
struct RecentPayload {
    #[serde(default)]
    limit: Option<usize>,
}

fn parse_payload<T: DeserializeOwned>(action: Action, payload: Value) -> Result<T> {
    let payload = if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload
    };
    serde_json::from_value(payload)
        .map_err(|e| ThyselfError::validation(format!("invalid {action} payload: {e}")))
}

fn to_data<T: Serialize>(value: &T) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(value)?))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Owns the stores and the title lane. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct Router {
    lane: TitleLane,
    titles: TitleStore,
    profile: ProfileStore,
    archive: ArchiveStore,
    events: EventLog,
    status: StatusStore,
}

impl Router {
    pub fn new(storage: Arc<Storage>, retention: &RetentionConfig) -> Self {
        let titles = TitleStore::new(storage.clone(), retention.title_days);
        Self {
            lane: TitleLane::spawn(titles.clone()),
            titles,
            profile: ProfileStore::new(storage.clone()),
            archive: ArchiveStore::new(storage.clone(), retention.archive_cap),
            events: EventLog::new(storage.clone(), retention.event_log_cap),
            status: StatusStore::new(storage),
        }
    }

    /// Handle a request by wire name. Unknown actions get an error response.
    pub async fn handle(&self, action: &str, payload: Value) -> Response {
        match Action::from_wire(action) {
            Some(action) => self.dispatch(action, payload).await,
            None => {
                debug!(%action, "unknown action");
                Response::failure(format!("unknown action: {action}"))
            }
        }
    }

    pub async fn dispatch(&self, action: Action, payload: Value) -> Response {
        match self.route(action, payload).await {
            Ok(data) => {
                debug!(%action, ok = true, "dispatched");
                Response::success(data)
            }
            Err(e) => {
                warn!(%action, error = %e, "handler failed");
                Response::failure(e.to_string())
            }
        }
    }

    /// Log a sanitized event and queue its title update.
    pub async fn record(&self, event: Event) -> Result<()> {
        self.events.append(event.clone()).await?;
        self.lane.update(event).await
    }

    async fn route(&self, action: Action, payload: Value) -> Result<Option<Value>> {
        match action {
            Action::GetTitles => to_data(&self.titles.list().await?),
            Action::AckTitles => {
                let AckPayload { ids } = parse_payload(action, payload)?;
                self.lane.acknowledge(ids).await?;
                Ok(None)
            }
            Action::ClearTitles => {
                self.lane.clear().await?;
                Ok(None)
            }
            Action::SetProfile => {
                let SetProfilePayload { profile } = parse_payload(action, payload)?;
                self.profile.set(profile).await?;
                Ok(None)
            }
            Action::GetProfile => to_data(&self.profile.get().await?),
            Action::AppendPiece => {
                let AppendPiecePayload { piece } = parse_payload(action, payload)?;
                self.archive.append(piece).await?;
                Ok(None)
            }
            Action::GetArchive => to_data(&self.archive.list().await?),
            Action::GetStatus => to_data(&self.status.get().await?),
            Action::ClearProfileArchive => {
                self.profile.clear().await?;
                self.archive.clear().await?;
                Ok(None)
            }
            Action::AddEvent => {
                let AddEventPayload { event } = parse_payload(action, payload)?;
                let event = sanitize_event(&event)
                    .ok_or_else(|| ThyselfError::validation("event rejected: empty title"))?;
                self.record(event).await?;
                Ok(None)
            }
            Action::GetRecent => {
                let RecentPayload { limit } = parse_payload(action, payload)?;
                let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT);
                to_data(&self.events.recent(limit).await?)
            }
            Action::Clear => {
                self.events.clear().await?;
                Ok(None)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::{Local, TimeDelta, Utc};
    use serde_json::json;
    use thyself_observer::{FeedObserver, Observation};
    use thyself_shared::TitleBatchEntry;
    use thyself_storage::{keys, title_id};

    use super::test_support::test_router;
    use super::*;
    use crate::sanitizer::sanitize_at;

    fn event_json(title: &str) -> Value {
        json!({
            "ts": Utc::now().to_rfc3339(),
            "type": "feed_item",
            "title": title,
            "itemId": "vid1",
            "href": "/watch?v=vid1",
            "page": "/",
            "platform": "youtube"
        })
    }

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_wire(action.as_str()), Some(action));
        }
        assert_eq!(Action::from_wire("get_titles"), None);
    }

    #[tokio::test]
    async fn unknown_action_is_an_error_response() {
        let (router, _) = test_router().await;
        let response = router.handle("DROP_TABLES", Value::Null).await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("unknown action: DROP_TABLES"));
    }

    #[tokio::test]
    async fn titles_flow() {
        let (router, _) = test_router().await;

        for title in ["Alpha", "alpha", "Beta"] {
            let r = router
                .handle("ADD_EVENT", json!({ "event": event_json(title) }))
                .await;
            assert!(r.ok, "{r:?}");
        }

        let entries: Vec<TitleBatchEntry> = router
            .handle("GET_TITLES", Value::Null)
            .await
            .into_data()
            .unwrap();
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);

        let r = router
            .handle("ACK_TITLES", json!({ "ids": [title_id("beta"), "nope"] }))
            .await;
        assert!(r.ok);
        let entries: Vec<TitleBatchEntry> = router
            .handle("GET_TITLES", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Alpha");

        let r = router.handle("CLEAR_TITLES", Value::Null).await;
        assert!(r.ok);
        let entries: Vec<TitleBatchEntry> = router
            .handle("GET_TITLES", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn repeated_sighting_keeps_one_entry_with_latest_time() {
        let (router, _) = test_router().await;
        let mut observer = FeedObserver::new();
        observer.navigate("https://www.youtube.com/");
        observer.apply_mutation(
            r#"
            <ytd-rich-item-renderer>
              <a id="thumbnail" href="/watch?v=news01"></a>
              <yt-formatted-string id="video-title">Breaking News Today - 3 minutes, 12 seconds</yt-formatted-string>
            </ytd-rich-item-renderer>
            "#,
        );
        let candidate = match observer.sweep().pop() {
            Some(Observation::Emitted(c)) => c,
            other => panic!("expected a candidate, got {other:?}"),
        };

        let first = Utc::now() - TimeDelta::hours(1);
        let second = first + TimeDelta::seconds(100);
        for at in [first, second] {
            router
                .record(sanitize_at(&candidate, at).unwrap())
                .await
                .unwrap();
        }

        let entries: Vec<TitleBatchEntry> = router
            .handle("GET_TITLES", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, title_id("Breaking News Today"));
        assert_eq!(entry.title, "Breaking News Today");
        assert_eq!(entry.length.as_deref(), Some("3:12"));
        assert_eq!(entry.ts, second);
    }

    #[tokio::test]
    async fn add_event_rejects_bad_input() {
        let (router, _) = test_router().await;

        let r = router
            .handle("ADD_EVENT", json!({ "event": event_json("   ") }))
            .await;
        assert!(!r.ok);
        assert!(r.error.unwrap().contains("empty title"));

        let mut bad_type = event_json("x");
        bad_type["type"] = json!("ad_item");
        let r = router.handle("ADD_EVENT", json!({ "event": bad_type })).await;
        assert!(!r.ok);
        assert!(r.error.unwrap().contains("invalid ADD_EVENT payload"));

        let r = router.handle("ADD_EVENT", Value::Null).await;
        assert!(!r.ok);
    }

    #[tokio::test]
    async fn recent_events_newest_first() {
        let (router, _) = test_router().await;
        for title in ["one", "two", "three"] {
            router
                .handle("ADD_EVENT", json!({ "event": event_json(title) }))
                .await;
        }

        let recent: Vec<Event> = router
            .handle("GET_RECENT", json!({ "limit": 2 }))
            .await
            .into_data()
            .unwrap();
        let titles: Vec<&str> = recent.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["three", "two"]);
        assert_eq!(recent[0].href, "https://www.youtube.com/watch?v=vid1");

        let all: Vec<Event> = router
            .handle("GET_RECENT", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert_eq!(all.len(), 3);

        assert!(router.handle("CLEAR", Value::Null).await.ok);
        let none: Vec<Event> = router
            .handle("GET_RECENT", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn profile_and_status() {
        let (router, _) = test_router().await;

        let status = router.handle("GET_STATUS", Value::Null).await;
        assert_eq!(status.data, Some(json!({ "last_sync_at": null })));

        let profile = router.handle("GET_PROFILE", Value::Null).await;
        assert!(profile.ok);
        assert_eq!(profile.data, Some(Value::Null));

        let r = router
            .handle(
                "SET_PROFILE",
                json!({ "profile": { "t0": { "Science": 3 }, "t1": { "Science > Physics": 2 } } }),
            )
            .await;
        assert!(r.ok);

        let stored: Option<ProfileHistogram> = router
            .handle("GET_PROFILE", Value::Null)
            .await
            .into_data()
            .unwrap();
        let stored = stored.unwrap();
        assert_eq!(stored.t0["Science"], 3);
        assert!(stored.updated_at.is_some());

        let status = router.handle("GET_STATUS", Value::Null).await;
        assert!(status.data.unwrap()["last_sync_at"].is_string());

        let r = router.handle("SET_PROFILE", json!({ "profile": 7 })).await;
        assert!(!r.ok);
    }

    #[tokio::test]
    async fn append_piece_fills_date_and_both_image_keys() {
        let (router, storage) = test_router().await;

        let r = router
            .handle(
                "APPEND_PIECE",
                json!({ "piece": { "title": "X", "source": "S", "url": "https://x.test" } }),
            )
            .await;
        assert!(r.ok, "{r:?}");

        let raw = storage.get_raw(keys::ARCHIVE).await.unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        let today = Local::now().format("%Y/%m/%d").to_string();
        assert_eq!(stored[0]["date"], json!(today));
        assert_eq!(stored[0]["image_url"], json!(""));
        assert_eq!(stored[0]["imageUrl"], json!(""));

        let archive = router.handle("GET_ARCHIVE", Value::Null).await;
        assert_eq!(archive.data.unwrap()[0]["title"], "X");
    }

    #[tokio::test]
    async fn clear_profile_archive_resets_both() {
        let (router, _) = test_router().await;
        router
            .handle("SET_PROFILE", json!({ "profile": { "t0": { "A": 1 } } }))
            .await;
        router
            .handle("APPEND_PIECE", json!({ "piece": { "title": "P" } }))
            .await;

        assert!(router.handle("CLEAR_PROFILE_ARCHIVE", Value::Null).await.ok);

        let profile: Option<ProfileHistogram> = router
            .handle("GET_PROFILE", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert!(profile.is_none());
        let archive: Vec<ArchivePiece> = router
            .handle("GET_ARCHIVE", Value::Null)
            .await
            .into_data()
            .unwrap();
        assert!(archive.is_empty());
    }
}
