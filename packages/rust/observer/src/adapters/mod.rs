//! Layout adapters: how to find and read feed items in each page layout.
//!
//! Each adapter lists its container selectors newest-markup first; the first
//! selector that matches anything wins, older ones are only a fallback.

mod compact;
mod grid;
mod shorts;

use scraper::{ElementRef, Html, Selector};
use thyself_shared::SourceVariant;

use crate::extract::{Extraction, FieldSelectors, extract_fields};

pub use compact::CompactListAdapter;
pub use grid::PrimaryGridAdapter;
pub use shorts::ShortsShelfAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for layout-specific item discovery and field extraction.
pub trait LayoutAdapter: Send + Sync {
    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// Layout tag stamped on candidates from this adapter.
    fn variant(&self) -> SourceVariant;

    /// Container selectors in priority order.
    fn container_selectors(&self) -> &'static [&'static str];

    /// Field selectors for nodes found by this adapter.
    fn fields(&self) -> &'static FieldSelectors;

    /// Find item containers, using the first selector that matches anything.
    fn discover<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        for sel_str in self.container_selectors() {
            let Ok(sel) = Selector::parse(sel_str) else {
                continue;
            };
            let nodes: Vec<ElementRef<'a>> = doc.select(&sel).collect();
            if !nodes.is_empty() {
                tracing::trace!(
                    adapter = self.name(),
                    selector = sel_str,
                    count = nodes.len(),
                    "containers found"
                );
                return nodes;
            }
        }
        Vec::new()
    }

    /// Pull raw fields from one container.
    fn extract(&self, node: ElementRef<'_>) -> Extraction {
        extract_fields(node, self.fields())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters. Every adapter is run on every snapshot.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn LayoutAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with the built-in adapters.
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(PrimaryGridAdapter),
                Box::new(CompactListAdapter),
                Box::new(ShortsShelfAdapter),
            ],
        }
    }

    pub fn adapters(&self) -> impl Iterator<Item = &dyn LayoutAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
