//! Linear list layout (watch-page sidebar, search results).

use thyself_shared::SourceVariant;

use super::LayoutAdapter;
use crate::extract::FieldSelectors;

static FIELDS: FieldSelectors = FieldSelectors {
    title: &[
        ".yt-lockup-metadata-view-model__title",
        "#video-title",
    ],
    label: &[
        ".yt-lockup-metadata-view-model__title",
        "#video-title",
        "a#thumbnail",
    ],
    href: &[
        "a.yt-lockup-view-model__content-image",
        "a#thumbnail",
        "a.yt-simple-endpoint",
    ],
    channel: &[
        ".yt-content-metadata-view-model__metadata-row a",
        "ytd-channel-name #text",
        "#channel-name",
    ],
    length: &[
        ".yt-badge-shape__text",
        "ytd-thumbnail-overlay-time-status-renderer #text",
    ],
    badges: &[".badge-shape-wiz__text", "ytd-badge-supported-renderer .badge"],
};

/// Sidebar and result lists.
pub struct CompactListAdapter;

impl LayoutAdapter for CompactListAdapter {
    fn name(&self) -> &str {
        "compact-list"
    }

    fn variant(&self) -> SourceVariant {
        SourceVariant::Compact
    }

    fn container_selectors(&self) -> &'static [&'static str] {
        &[
            "#secondary yt-lockup-view-model",
            "ytd-compact-video-renderer",
            "ytd-video-renderer",
        ]
    }

    fn fields(&self) -> &'static FieldSelectors {
        &FIELDS
    }
}
