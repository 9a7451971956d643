//! Dense grid layout (home, subscriptions, channel tabs).

use thyself_shared::SourceVariant;

use super::LayoutAdapter;
use crate::extract::FieldSelectors;

static FIELDS: FieldSelectors = FieldSelectors {
    title: &[
        ".yt-lockup-metadata-view-model__title",
        "#video-title",
        "#video-title-link",
    ],
    label: &[
        ".yt-lockup-metadata-view-model__title",
        "#video-title-link",
        "#video-title",
    ],
    href: &[
        "a.yt-lockup-view-model__content-image",
        "a.yt-lockup-metadata-view-model__title",
        "a#thumbnail",
        "a#video-title-link",
        "a#video-title",
    ],
    channel: &[
        ".yt-content-metadata-view-model__metadata-row a",
        "ytd-channel-name #text",
        "#channel-name a",
    ],
    length: &[
        ".yt-badge-shape__text",
        "ytd-thumbnail-overlay-time-status-renderer #text",
        "ytd-thumbnail-overlay-time-status-renderer",
    ],
    badges: &[".badge-shape-wiz__text", "ytd-badge-supported-renderer .badge"],
};

/// Grid items, lockup markup first, then the older renderer elements.
pub struct PrimaryGridAdapter;

impl LayoutAdapter for PrimaryGridAdapter {
    fn name(&self) -> &str {
        "primary-grid"
    }

    fn variant(&self) -> SourceVariant {
        SourceVariant::Primary
    }

    fn container_selectors(&self) -> &'static [&'static str] {
        &[
            "ytd-rich-item-renderer yt-lockup-view-model",
            "ytd-rich-item-renderer",
            "ytd-grid-video-renderer",
        ]
    }

    fn fields(&self) -> &'static FieldSelectors {
        &FIELDS
    }
}
