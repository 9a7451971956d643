//! Field heuristics shared by the layout adapters.
//!
//! Everything here degrades gracefully: a missing or malformed field yields
//! `None`, never an error.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use thyself_shared::EventType;
use url::Url;

/// Base used to resolve relative anchors.
pub const SITE_BASE: &str = "https://www.youtube.com/";

/// Tokens that end the title part of an accessible label.
const LABEL_SEPARATORS: &[&str] = &[" by ", " - play Short"];

/// Trailing spoken duration set off by a separator, e.g.
/// `" - 1 hour, 3 minutes, 12 seconds"`. Separators: ` - `, en/em dash,
/// `|`, middle dot, bullet, comma.
static DURATION_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(.*?\S)\s*(?:\s-|[\x{2013}\x{2014}|\x{00B7}\x{2022},])\s*((?:\d+\s+(?:hours?|minutes?|seconds?)\b,?\s*)+)$",
    )
    .expect("valid regex")
});

static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+(hour|minute|second)").expect("valid regex"));

/// Overlay text that already is a clock-style length.
static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}(?::\d{2}){1,2}$").expect("valid regex"));

/// Per-layout selector lists, each tried in order.
#[derive(Debug, Clone, Copy)]
pub struct FieldSelectors {
    pub title: &'static [&'static str],
    /// Elements whose `aria-label` may carry the title.
    pub label: &'static [&'static str],
    pub href: &'static [&'static str],
    pub channel: &'static [&'static str],
    pub length: &'static [&'static str],
    pub badges: &'static [&'static str],
}

/// Raw fields pulled from one container node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Visible title text; `None` while the node is not hydrated.
    pub title: Option<String>,
    /// Accessible label of the title link or container.
    pub label: Option<String>,
    pub href: Option<String>,
    pub channel: Option<String>,
    /// Clock-style overlay length.
    pub length: Option<String>,
    pub badges: Vec<String>,
}

impl Extraction {
    /// Resolve the display title and any length parsed out of it.
    ///
    /// Order: title text, then the label's first segment before a separator.
    /// The trailing duration phrase is stripped from whichever wins.
    pub fn resolve_title(&self) -> Option<(String, Option<String>)> {
        let raw = self
            .title
            .as_deref()
            .map(collapse_ws)
            .filter(|t| !t.is_empty())
            .or_else(|| self.label.as_deref().map(label_title).filter(|t| !t.is_empty()))?;

        let (title, length) = strip_duration(&raw);
        if title.is_empty() {
            return None;
        }
        Some((title, length))
    }
}

/// Pull every field for `node` using `fields`.
pub fn extract_fields(node: ElementRef<'_>, fields: &FieldSelectors) -> Extraction {
    let label = first_attr(node, fields.label, "aria-label")
        .or_else(|| non_empty(node.value().attr("aria-label")));

    let href = first_attr(node, fields.href, "href").or_else(|| {
        first_attr(
            node,
            &[r#"a[href*="/watch?v="]"#, r#"a[href*="/shorts/"]"#],
            "href",
        )
    });

    let mut badges = all_texts(node, fields.badges);
    let length = match first_text(node, fields.length) {
        Some(text) if CLOCK.is_match(&text) => Some(text),
        Some(text) => {
            if !badges.contains(&text) {
                badges.push(text);
            }
            None
        }
        None => None,
    };

    Extraction {
        title: first_text(node, fields.title),
        label,
        href,
        channel: first_text(node, fields.channel),
        length,
        badges,
    }
}

/// Title part of an accessible label.
pub fn label_title(label: &str) -> String {
    let mut end = label.len();
    for sep in LABEL_SEPARATORS {
        if let Some(idx) = label.find(sep) {
            end = end.min(idx);
        }
    }
    collapse_ws(&label[..end])
}

/// Split a trailing spoken duration off `title`.
///
/// Returns the remaining title and, if a phrase was found, its clock form.
/// A phrase without a separator before it is part of the title.
pub fn strip_duration(title: &str) -> (String, Option<String>) {
    let title = collapse_ws(title);
    let Some((rest, phrase)) = DURATION_TAIL
        .captures(&title)
        .map(|caps| (caps[1].trim().to_string(), caps[2].to_string()))
        .filter(|(rest, _)| !rest.is_empty())
    else {
        return (title, None);
    };

    let (mut hours, mut minutes, mut seconds) = (0u64, 0u64, 0u64);
    for part in DURATION_PART.captures_iter(&phrase) {
        let n: u64 = part[1].parse().unwrap_or(0);
        match part[2].to_ascii_lowercase().as_str() {
            "hour" => hours += n,
            "minute" => minutes += n,
            _ => seconds += n,
        }
    }

    let length = if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    };
    (rest, Some(length))
}

/// Category and id of an item link. Anything but a watch or shorts link is `None`.
pub fn resolve_item(href: &str) -> Option<(EventType, String)> {
    let base = Url::parse(SITE_BASE).ok()?;
    let url = base.join(href).ok()?;

    let mut segments = url.path_segments()?;
    let (kind, id) = match segments.next()? {
        "shorts" => (EventType::ShortItem, segments.next()?.to_string()),
        "watch" => (
            EventType::FeedItem,
            url.query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())?,
        ),
        _ => return None,
    };

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some((kind, id))
}

/// Page identity: path plus the `v`, `list` and `search_query` parameters.
pub fn page_key(url: &str) -> String {
    let parsed = Url::parse(url).or_else(|_| Url::parse(SITE_BASE).and_then(|b| b.join(url)));
    let Ok(parsed) = parsed else {
        return url.to_string();
    };

    let kept: Vec<String> = ["v", "list", "search_query"]
        .iter()
        .filter_map(|name| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(k, v)| format!("{k}={v}"))
        })
        .collect();

    if kept.is_empty() {
        parsed.path().to_string()
    } else {
        format!("{}?{}", parsed.path(), kept.join("&"))
    }
}

pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(collapse_ws).filter(|s| !s.is_empty())
}

fn selectors<'a>(list: &'a [&'a str]) -> impl Iterator<Item = Selector> + 'a {
    list.iter().filter_map(|s| Selector::parse(s).ok())
}

fn first_text(node: ElementRef<'_>, list: &[&str]) -> Option<String> {
    selectors(list).find_map(|sel| {
        node.select(&sel)
            .map(|el| collapse_ws(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

fn first_attr(node: ElementRef<'_>, list: &[&str], attr: &str) -> Option<String> {
    selectors(list).find_map(|sel| {
        node.select(&sel)
            .find_map(|el| non_empty(el.value().attr(attr)))
    })
}

fn all_texts(node: ElementRef<'_>, list: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for sel in selectors(list) {
        for el in node.select(&sel) {
            let text = collapse_ws(&el.text().collect::<String>());
            if !text.is_empty() && !out.contains(&text) {
                out.push(text);
            }
        }
    }
    out
}
