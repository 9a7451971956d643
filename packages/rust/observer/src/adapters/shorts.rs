//! Short-form shelves and reels. Items link to `/shorts/<id>`.

use thyself_shared::SourceVariant;

use super::LayoutAdapter;
use crate::extract::FieldSelectors;

static FIELDS: FieldSelectors = FieldSelectors {
    title: &[
        ".shortsLockupViewModelHostMetadataTitle",
        "#video-title",
        "h3",
    ],
    label: &[
        "a.shortsLockupViewModelHostEndpoint",
        "a[href*=\"/shorts/\"]",
    ],
    href: &[
        "a.shortsLockupViewModelHostEndpoint",
        "a[href*=\"/shorts/\"]",
    ],
    channel: &[],
    length: &[],
    badges: &[],
};

pub struct ShortsShelfAdapter;

impl LayoutAdapter for ShortsShelfAdapter {
    fn name(&self) -> &str {
        "shorts-shelf"
    }

    fn variant(&self) -> SourceVariant {
        SourceVariant::Shorts
    }

    fn container_selectors(&self) -> &'static [&'static str] {
        &["ytm-shorts-lockup-view-model", "ytd-reel-item-renderer"]
    }

    fn fields(&self) -> &'static FieldSelectors {
        &FIELDS
    }
}
