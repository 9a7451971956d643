//! Feed observer: item discovery and field extraction over page snapshots.
//!
//! This crate provides:
//! - [`adapters`] — Layout-specific discovery (dense grid, compact list, shorts shelf)
//! - [`extract`] — Field heuristics (title fallbacks, duration parsing, id and page keys)
//! - [`FeedObserver`] — Per-navigation-session state machine emitting [`Observation`]s

pub mod adapters;
pub mod extract;
pub mod observer;

pub use adapters::{
    AdapterRegistry, CompactListAdapter, LayoutAdapter, PrimaryGridAdapter, ShortsShelfAdapter,
};
pub use extract::{Extraction, FieldSelectors, page_key, resolve_item, strip_duration};
pub use observer::{FeedObserver, Observation, item_key};
