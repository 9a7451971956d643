//! Per-navigation-session observer state machine.
//!
//! The observer holds the latest page snapshot and turns host signals
//! (mutation, visibility, sweep, retry, navigation) into candidates. It is
//! synchronous; every check-and-insert on the `seen` sets completes before
//! control returns to the caller.

use std::collections::{HashMap, HashSet};

use scraper::Html;
use thyself_shared::{DEFAULT_PLATFORM, EventType, RawCandidate, SourceVariant};
use tracing::{debug, info, trace};

use crate::adapters::AdapterRegistry;
use crate::extract::{Extraction, page_key, resolve_item};

/// Outcome of looking at one item node.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// A new candidate for this session.
    Emitted(RawCandidate),
    /// Title not populated yet; the caller should `retry` this key once.
    Deferred(String),
}

/// Node key used in host signals: `<category>:<itemId>`.
pub fn item_key(kind: EventType, id: &str) -> String {
    format!("{kind}:{id}")
}

#[derive(Debug, Default)]
struct SessionState {
    page_key: String,
    /// `itemId|pageKey` of emitted long-form items.
    seen: HashSet<String>,
    /// Same, for short-form items.
    seen_shorts: HashSet<String>,
    position: usize,
    /// Discovered by a mutation, waiting for visibility.
    observed: HashSet<String>,
    /// Waiting for their one retry.
    deferred: HashSet<String>,
    retried: HashSet<String>,
}

struct ScannedItem {
    key: String,
    kind: EventType,
    id: String,
    href: String,
    variant: SourceVariant,
    extraction: Extraction,
}

/// Feed observer for one tab.
pub struct FeedObserver {
    registry: AdapterRegistry,
    platform: String,
    session: SessionState,
    snapshot: Option<String>,
}

impl FeedObserver {
    pub fn new() -> Self {
        Self::with_registry(AdapterRegistry::new(), DEFAULT_PLATFORM)
    }

    pub fn with_registry(registry: AdapterRegistry, platform: impl Into<String>) -> Self {
        Self {
            registry,
            platform: platform.into(),
            session: SessionState::default(),
            snapshot: None,
        }
    }

    /// Key of the page the current session belongs to.
    pub fn page_key(&self) -> &str {
        &self.session.page_key
    }

    /// Start a new session. Always resets, even when the page key is unchanged.
    ///
    /// The snapshot is kept: an in-page navigation leaves the old nodes in
    /// place until the next mutation replaces them.
    pub fn navigate(&mut self, url: &str) {
        let key = page_key(url);
        info!(
            page = %key,
            emitted = self.session.position,
            "navigation, session reset"
        );
        self.session = SessionState {
            page_key: key,
            ..SessionState::default()
        };
    }

    /// Replace the snapshot. Returns keys of newly discovered, not yet
    /// visible items.
    pub fn apply_mutation(&mut self, html: impl Into<String>) -> Vec<String> {
        self.snapshot = Some(html.into());

        let mut discovered = Vec::new();
        for item in self.scan() {
            if self.is_seen(&item) {
                continue;
            }
            if self.session.observed.insert(item.key.clone()) {
                discovered.push(item.key);
            }
        }
        trace!(count = discovered.len(), "mutation scanned");
        discovered
    }

    /// Process items that entered the viewport.
    pub fn on_visible(&mut self, keys: &[String]) -> Vec<Observation> {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let items: Vec<ScannedItem> = self
            .scan()
            .into_iter()
            .filter(|item| wanted.contains(item.key.as_str()))
            .collect();
        items
            .into_iter()
            .filter_map(|item| self.observe(item))
            .collect()
    }

    /// Process every item in the snapshot.
    pub fn sweep(&mut self) -> Vec<Observation> {
        let out: Vec<Observation> = self
            .scan()
            .into_iter()
            .filter_map(|item| self.observe(item))
            .collect();
        debug!(
            page = %self.session.page_key,
            observations = out.len(),
            "sweep"
        );
        out
    }

    /// One-shot re-extraction of a deferred item. `None` if it was never
    /// deferred in this session, was already retried, or is still empty.
    pub fn retry(&mut self, key: &str) -> Option<RawCandidate> {
        if !self.session.deferred.remove(key) {
            return None;
        }
        self.session.retried.insert(key.to_string());

        let item = self.scan().into_iter().find(|item| item.key == key)?;
        match self.observe(item) {
            Some(Observation::Emitted(candidate)) => Some(candidate),
            _ => {
                debug!(%key, "still not hydrated after retry, giving up");
                None
            }
        }
    }

    fn observe(&mut self, item: ScannedItem) -> Option<Observation> {
        if self.is_seen(&item) {
            return None;
        }

        let Some((title, parsed_length)) = item.extraction.resolve_title() else {
            if self.session.retried.contains(&item.key)
                || !self.session.deferred.insert(item.key.clone())
            {
                return None;
            }
            trace!(key = %item.key, "title empty, deferring");
            return Some(Observation::Deferred(item.key));
        };

        let seen_key = self.seen_key(&item.id);
        let seen = match item.kind {
            EventType::ShortItem => &mut self.session.seen_shorts,
            EventType::FeedItem => &mut self.session.seen,
        };
        seen.insert(seen_key);
        self.session.position += 1;
        self.session.deferred.remove(&item.key);
        self.session.observed.remove(&item.key);

        let Extraction {
            channel,
            length,
            badges,
            ..
        } = item.extraction;

        debug!(
            id = %item.id,
            position = self.session.position,
            %title,
            "candidate emitted"
        );
        Some(Observation::Emitted(RawCandidate {
            title,
            channel,
            length_hint: length.or(parsed_length),
            badges,
            anchor_href: item.href,
            source_variant: item.variant,
            item_type: item.kind.as_str().to_string(),
            item_id: item.id,
            page: self.session.page_key.clone(),
            platform: self.platform.clone(),
            position: self.session.position,
            ts: None,
        }))
    }

    fn seen_key(&self, id: &str) -> String {
        format!("{id}|{}", self.session.page_key)
    }

    fn is_seen(&self, item: &ScannedItem) -> bool {
        let seen = match item.kind {
            EventType::ShortItem => &self.session.seen_shorts,
            EventType::FeedItem => &self.session.seen,
        };
        seen.contains(&self.seen_key(&item.id))
    }

    /// Every item with a resolvable id in the snapshot, in discovery order.
    /// When two adapters find the same item, a populated title wins.
    fn scan(&self) -> Vec<ScannedItem> {
        let Some(html) = self.snapshot.as_deref() else {
            return Vec::new();
        };
        let doc = Html::parse_document(html);

        let mut items: Vec<ScannedItem> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for adapter in self.registry.adapters() {
            for node in adapter.discover(&doc) {
                let extraction = adapter.extract(node);
                let Some(href) = extraction.href.clone() else {
                    continue;
                };
                let Some((kind, id)) = resolve_item(&href) else {
                    continue;
                };

                let item = ScannedItem {
                    key: item_key(kind, &id),
                    kind,
                    id,
                    href,
                    variant: adapter.variant(),
                    extraction,
                };
                match index.get(&item.key) {
                    Some(&i) => {
                        if items[i].extraction.resolve_title().is_none()
                            && item.extraction.resolve_title().is_some()
                        {
                            items[i] = item;
                        }
                    }
                    None => {
                        index.insert(item.key.clone(), items.len());
                        items.push(item);
                    }
                }
            }
        }
        items
    }
}

impl Default for FeedObserver {
    fn default() -> Self {
        Self::new()
    }
}
