//! Raw candidate → canonical [`Event`].

use chrono::{DateTime, Utc};
use thyself_shared::{Event, EventType, RawCandidate};
use tracing::trace;
use url::Url;

/// Longest title kept, in characters.
pub const MAX_TITLE_CHARS: usize = 300;

const SITE_BASE: &str = "https://www.youtube.com/";

/// Validate and normalize a candidate, stamping `now` when it carries no time.
pub fn sanitize(candidate: &RawCandidate) -> Option<Event> {
    sanitize_at(candidate, Utc::now())
}

pub fn sanitize_at(candidate: &RawCandidate, now: DateTime<Utc>) -> Option<Event> {
    let Some(event_type) = EventType::from_wire(&candidate.item_type) else {
        trace!(item_type = %candidate.item_type, "rejected: category not allowed");
        return None;
    };
    let Some(title) = clean_title(&candidate.title) else {
        trace!(item_id = %candidate.item_id, "rejected: empty title");
        return None;
    };

    Some(Event {
        ts: candidate.ts.unwrap_or(now),
        event_type,
        title,
        item_id: candidate.item_id.trim().to_string(),
        href: absolute_href(&candidate.anchor_href),
        page: candidate.page.clone(),
        platform: candidate.platform.clone(),
        length: candidate.length_hint.clone(),
        channel: candidate.channel.clone(),
    })
}

/// Re-apply the same rules to an event that arrived from outside the
/// observer. A sanitized event passes through unchanged.
pub fn sanitize_event(event: &Event) -> Option<Event> {
    let title = clean_title(&event.title)?;
    Some(Event {
        title,
        item_id: event.item_id.trim().to_string(),
        href: absolute_href(&event.href),
        ..event.clone()
    })
}

fn clean_title(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    let clamped: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    Some(clamped.trim_end().to_string())
}

fn absolute_href(href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    Url::parse(SITE_BASE)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use thyself_observer::{FeedObserver, Observation};
    use thyself_shared::SourceVariant;

    use super::*;

    fn candidate(title: &str, item_type: &str) -> RawCandidate {
        RawCandidate {
            title: title.into(),
            channel: None,
            length_hint: None,
            badges: Vec::new(),
            anchor_href: "/watch?v=abc".into(),
            source_variant: SourceVariant::Primary,
            item_type: item_type.into(),
            item_id: "abc".into(),
            page: "/".into(),
            platform: "youtube".into(),
            position: 1,
            ts: None,
        }
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn rejects_disallowed_category_and_empty_title() {
        assert!(sanitize(&candidate("Title", "ad_slot")).is_none());
        assert!(sanitize(&candidate("Title", "")).is_none());
        assert!(sanitize(&candidate("   \n\t ", "feed_item")).is_none());
        assert!(sanitize(&candidate("Title", "short_item")).is_some());
    }

    #[test]
    fn normalizes_fields() {
        let mut raw = candidate("  Many   spaces\there ", "feed_item");
        raw.anchor_href = "/shorts/xyz".into();
        let event = sanitize_at(&raw, at_ms(5)).unwrap();

        assert_eq!(event.title, "Many spaces here");
        assert_eq!(event.href, "https://www.youtube.com/shorts/xyz");
        assert_eq!(event.ts, at_ms(5));
        assert_eq!(event.event_type, EventType::FeedItem);
    }

    #[test]
    fn candidate_time_wins_over_now() {
        let mut raw = candidate("Title", "feed_item");
        raw.ts = Some(at_ms(42));
        assert_eq!(sanitize_at(&raw, at_ms(99)).unwrap().ts, at_ms(42));
    }

    #[test]
    fn clamps_long_titles() {
        let long = "x".repeat(MAX_TITLE_CHARS + 50);
        let event = sanitize(&candidate(&long, "feed_item")).unwrap();
        assert_eq!(event.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let mut raw = candidate("  Spaced   Title ", "short_item");
        raw.length_hint = Some("0:45".into());
        let once = sanitize_at(&raw, at_ms(7)).unwrap();
        assert_eq!(sanitize_at(&raw, at_ms(7)), Some(once.clone()));
        let twice = sanitize_event(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn spoken_duration_scenario() {
        let html = r#"
            <ytd-rich-item-renderer>
              <a id="thumbnail" href="/watch?v=news01"></a>
              <yt-formatted-string id="video-title">Breaking News Today - 3 minutes, 12 seconds</yt-formatted-string>
            </ytd-rich-item-renderer>
        "#;
        let mut observer = FeedObserver::new();
        observer.navigate("https://www.youtube.com/");
        observer.apply_mutation(html);
        let candidate = match observer.sweep().pop() {
            Some(Observation::Emitted(c)) => c,
            other => panic!("expected a candidate, got {other:?}"),
        };

        let event = sanitize_at(&candidate, at_ms(100)).unwrap();
        assert_eq!(event.title, "Breaking News Today");
        assert_eq!(event.length.as_deref(), Some("3:12"));
        assert_eq!(event.ts, at_ms(100));
        assert_eq!(event.href, "https://www.youtube.com/watch?v=news01");
    }
}
