//! Core domain types for harvested feed items and the derived stores.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform tag stamped on every harvested item.
pub const DEFAULT_PLATFORM: &str = "youtube";

// ---------------------------------------------------------------------------
// Item categories
// ---------------------------------------------------------------------------

/// Allowed event categories. Anything else is rejected at sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Long-form item from a grid or list feed.
    FeedItem,
    /// Short-form item (`/shorts/<id>`).
    ShortItem,
}

impl EventType {
    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeedItem => "feed_item",
            Self::ShortItem => "short_item",
        }
    }

    /// Resolve a wire name against the allow-list.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "feed_item" => Some(Self::FeedItem),
            "short_item" => Some(Self::ShortItem),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural layout a candidate was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceVariant {
    /// Dense grid (home, subscriptions).
    Primary,
    /// Linear list (watch-page sidebar, search results).
    Compact,
    /// Short-form shelf or reel.
    Shorts,
}

// ---------------------------------------------------------------------------
// RawCandidate
// ---------------------------------------------------------------------------

/// Transient item produced by the feed observer. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    /// Extracted title, duration phrase already stripped.
    pub title: String,
    /// Channel or author name, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Normalized `H:MM:SS` / `M:SS` length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_hint: Option<String>,
    /// Badge labels (e.g. "LIVE", "New").
    #[serde(default)]
    pub badges: Vec<String>,
    /// Anchor href as found in the node.
    pub anchor_href: String,
    /// Layout the node came from.
    pub source_variant: SourceVariant,
    /// Category wire name (`feed_item` / `short_item`).
    pub item_type: String,
    /// Video or short identifier.
    pub item_id: String,
    /// Page key of the session that emitted this candidate.
    pub page: String,
    /// Platform tag.
    pub platform: String,
    /// 1-based emission order within the navigation session.
    pub position: usize,
    /// Sighting time, if the producer stamped one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Canonical sanitized sighting. Retained in the debug log and fed to the title store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub item_id: String,
    pub href: String,
    pub page: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// One unique title awaiting pickup by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleBatchEntry {
    /// Hash of the normalized title.
    pub id: String,
    /// Title in first-seen casing.
    pub title: String,
    /// Most recent sighting.
    pub ts: DateTime<Utc>,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
}

/// Topic-count profile written wholesale by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileHistogram {
    /// Top-level topic counts.
    #[serde(default)]
    pub t0: BTreeMap<String, u64>,
    /// Sub-topic counts.
    #[serde(default)]
    pub t1: BTreeMap<String, u64>,
    /// Stamped by the profile store on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileHistogram {
    /// Add counts into this histogram (read-modify-write on the caller side).
    pub fn merge_counts(&mut self, t0: &BTreeMap<String, u64>, t1: &BTreeMap<String, u64>) {
        for (label, count) in t0 {
            *self.t0.entry(label.clone()).or_default() += count;
        }
        for (label, count) in t1 {
            *self.t1.entry(label.clone()).or_default() += count;
        }
    }
}

/// A recommended piece in the archive.
///
/// The image field is written under both `image_url` and `imageUrl` and read
/// from whichever is non-empty, so older entries still resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ArchivePieceRecord", into = "ArchivePieceRecord")]
pub struct ArchivePiece {
    /// `YYYY/MM/DD`; empty means "fill on append".
    pub date: String,
    pub title: String,
    pub source: String,
    pub url: String,
    /// Canonical image field.
    pub image_url: String,
}

/// On-disk / on-wire shape of an [`ArchivePiece`], with both image aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArchivePieceRecord {
    #[serde(default)]
    date: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default, rename = "imageUrl")]
    image_url_camel: Option<String>,
}

impl From<ArchivePieceRecord> for ArchivePiece {
    fn from(rec: ArchivePieceRecord) -> Self {
        let image_url = [rec.image_url, rec.image_url_camel]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        Self {
            date: rec.date,
            title: rec.title,
            source: rec.source,
            url: rec.url,
            image_url,
        }
    }
}

impl From<ArchivePiece> for ArchivePieceRecord {
    fn from(piece: ArchivePiece) -> Self {
        Self {
            date: piece.date,
            title: piece.title,
            source: piece.source,
            url: piece.url,
            image_url: Some(piece.image_url.clone()),
            image_url_camel: Some(piece.image_url),
        }
    }
}

/// Last time the orchestrator wrote a profile or archive piece.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_allow_list() {
        assert_eq!(EventType::from_wire("feed_item"), Some(EventType::FeedItem));
        assert_eq!(EventType::from_wire("short_item"), Some(EventType::ShortItem));
        assert_eq!(EventType::from_wire("ad_item"), None);
        assert_eq!(EventType::ShortItem.to_string(), "short_item");
    }

    #[test]
    fn event_uses_wire_field_names() {
        let event = Event {
            ts: Utc::now(),
            event_type: EventType::FeedItem,
            title: "A title".into(),
            item_id: "abc123".into(),
            href: "https://www.youtube.com/watch?v=abc123".into(),
            page: "/".into(),
            platform: DEFAULT_PLATFORM.into(),
            length: None,
            channel: None,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "feed_item");
        assert_eq!(json["itemId"], "abc123");
        assert!(json.get("length").is_none());
    }

    #[test]
    fn archive_piece_reads_either_image_key() {
        let legacy: ArchivePiece =
            serde_json::from_str(r#"{"title":"T","url":"u","imageUrl":"http://img"}"#)
                .expect("legacy");
        assert_eq!(legacy.image_url, "http://img");

        let current: ArchivePiece =
            serde_json::from_str(r#"{"title":"T","url":"u","image_url":"http://img2","imageUrl":""}"#)
                .expect("current");
        assert_eq!(current.image_url, "http://img2");

        let neither: ArchivePiece = serde_json::from_str(r#"{"title":"T"}"#).expect("bare");
        assert_eq!(neither.image_url, "");
        assert_eq!(neither.date, "");
    }

    #[test]
    fn archive_piece_writes_both_image_keys() {
        let piece = ArchivePiece {
            image_url: "http://img".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&piece).expect("serialize");
        assert_eq!(json["image_url"], "http://img");
        assert_eq!(json["imageUrl"], "http://img");
    }

    #[test]
    fn profile_merge_is_additive() {
        let mut profile = ProfileHistogram::default();
        profile.t0.insert("Science".into(), 2);

        let t0 = BTreeMap::from([("Science".to_string(), 3), ("Arts".to_string(), 1)]);
        let t1 = BTreeMap::from([("Science > Physics".to_string(), 2)]);
        profile.merge_counts(&t0, &t1);

        assert_eq!(profile.t0["Science"], 5);
        assert_eq!(profile.t0["Arts"], 1);
        assert_eq!(profile.t1["Science > Physics"], 2);
    }

    #[test]
    fn sync_status_serializes_absent_as_null() {
        let json = serde_json::to_value(SyncStatus::default()).expect("serialize");
        assert!(json["last_sync_at"].is_null());
    }
}
