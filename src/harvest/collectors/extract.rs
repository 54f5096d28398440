//! Page extraction helpers shared by the scrape tiers.
//!
//! Two strategies, tried in this order by [`structured_then_dom`]:
//! 1. Structured: JSON embedded in a `<script>` element (Next.js
//!    `__NEXT_DATA__`, app-state blobs, JSON-LD).
//! 2. DOM: CSS selectors over the rendered markup, described by a
//!    [`DomLayout`].
//!
//! Both depend on third-party markup that changes without notice, so every
//! failure is reported as a [`CollectionError`] and never panics.

use crate::model::ChartEntry;
use crate::traits::CollectionError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

// ============================================================================
// Structured extraction
// ============================================================================

/// Parses the JSON captured by group 1 of `pattern`.
pub fn capture_json(html: &str, pattern: &str) -> Result<Value, CollectionError> {
    let re = Regex::new(pattern)
        .map_err(|e| CollectionError::Parse(format!("invalid pattern: {}", e)))?;
    let captured = re
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| CollectionError::MarkerNotFound(pattern.to_string()))?;
    Ok(serde_json::from_str(captured.as_str().trim())?)
}

/// JSON body of `<script id="{id}">`.
pub fn script_json_by_id(html: &str, id: &str) -> Result<Value, CollectionError> {
    let pattern = format!(
        r#"(?s)<script[^>]*id="{}"[^>]*>(.*?)</script>"#,
        regex::escape(id)
    );
    capture_json(html, &pattern).map_err(|e| match e {
        CollectionError::MarkerNotFound(_) => {
            CollectionError::MarkerNotFound(format!("script#{}", id))
        }
        other => other,
    })
}

/// Every parseable `application/ld+json` block on the page.
pub fn json_ld_blocks(html: &str) -> Result<Vec<Value>, CollectionError> {
    let selector = selector(r#"script[type="application/ld+json"]"#)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .filter_map(|script| {
            let body: String = script.text().collect();
            serde_json::from_str(body.trim()).ok()
        })
        .collect())
}

/// Case-insensitive key sets that identify a chart row object.
const ITEM_KEY_SETS: &[&[&str]] = &[
    &["title", "artist"],
    &["title", "artiste"],
    &["name", "artists"],
    &["name", "artistname"],
    &["track", "position"],
    &["sng_title", "art_name"],
];

fn looks_like_chart_item(obj: &Map<String, Value>) -> bool {
    ITEM_KEY_SETS.iter().any(|set| {
        set.iter()
            .all(|wanted| obj.keys().any(|k| k.eq_ignore_ascii_case(wanted)))
    })
}

/// Depth-first search for the first array that holds chart rows.
pub fn find_chart_items(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Object(map) => map.values().find_map(find_chart_items),
        Value::Array(items) => {
            if items
                .iter()
                .any(|v| v.as_object().is_some_and(looks_like_chart_item))
            {
                Some(items)
            } else {
                items.iter().find_map(find_chart_items)
            }
        }
        _ => None,
    }
}

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    names.iter().find_map(|name| {
        obj.iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_null())
            .map(|(_, v)| v)
    })
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    field(value, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number_field(value: &Value, names: &[&str]) -> Option<u64> {
    match field(value, names)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

/// Renders an artist value that may be a string, an object with a name,
/// or a list of either.
fn artist_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(_) => string_field(value, &["name"]),
        Value::Array(items) => {
            let names: Vec<String> = items.iter().filter_map(artist_text).collect();
            (!names.is_empty()).then(|| names.join(", "))
        }
        _ => None,
    }
}

const ARTIST_KEYS: &[&str] = &[
    "artiste",
    "artist",
    "artistName",
    "art_name",
    "author",
    "artists",
    "byArtist",
];

/// Best-effort mapping of one JSON chart row.
pub fn entry_from_json(item: &Value) -> Option<ChartEntry> {
    let nested = |key: &str| field(item, &[key]);

    let title = string_field(item, &["title", "name", "sng_title"])
        .or_else(|| nested("track").and_then(|t| string_field(t, &["title", "name"])))
        .or_else(|| nested("song").and_then(|s| string_field(s, &["title", "name"])))?;

    let artist = field(item, ARTIST_KEYS)
        .and_then(artist_text)
        .or_else(|| nested("track").and_then(|t| field(t, ARTIST_KEYS)).and_then(artist_text))
        .or_else(|| nested("song").and_then(|s| field(s, ARTIST_KEYS)).and_then(artist_text));

    Some(ChartEntry {
        title: Some(title),
        artist,
        rank: number_field(item, &["position", "rank", "index"])
            .and_then(|r| u32::try_from(r).ok())
            .filter(|r| *r > 0),
        streams: number_field(item, &["plays", "streams", "playCount", "play_count"]),
        source_url: string_field(item, &["url", "link", "musicLink", "permalink"]),
        weeks_on_chart: number_field(item, &["weeksOnChart", "weeks_on_chart"])
            .and_then(|w| u32::try_from(w).ok()),
    })
}

/// Maps chart rows, skipping ones without a title. Rows stay in source
/// order; ranking and truncation happen in `normalise`.
pub fn entries_from_items(items: &[Value]) -> Vec<ChartEntry> {
    items.iter().filter_map(entry_from_json).collect()
}

// ============================================================================
// DOM extraction
// ============================================================================

/// CSS selectors describing one chart layout.
#[derive(Debug, Clone, Copy)]
pub struct DomLayout {
    /// One match per chart row
    pub item: &'static str,
    /// Title element, relative to the row
    pub title: &'static str,
    /// Row attribute preferred over the title element when present
    pub title_attr: Option<&'static str>,
    pub artist: &'static str,
    pub link: &'static str,
}

pub fn selector(css: &str) -> Result<Selector, CollectionError> {
    Selector::parse(css)
        .map_err(|e| CollectionError::Parse(format!("invalid selector '{}': {:?}", css, e)))
}

/// Whitespace-normalised text content.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a possibly relative `href` against `base` (scheme + host).
pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

pub fn extract_dom(
    html: &str,
    layout: &DomLayout,
    base_url: &str,
) -> Result<Vec<ChartEntry>, CollectionError> {
    let item_sel = selector(layout.item)?;
    let title_sel = selector(layout.title)?;
    let artist_sel = selector(layout.artist)?;
    let link_sel = selector(layout.link)?;

    let document = Html::parse_document(html);
    let rows: Vec<ElementRef<'_>> = document.select(&item_sel).collect();
    if rows.is_empty() {
        return Err(CollectionError::MarkerNotFound(layout.item.to_string()));
    }

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let title = layout
                .title_attr
                .and_then(|attr| row.value().attr(attr))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .or_else(|| {
                    row.select(&title_sel)
                        .next()
                        .map(element_text)
                        .filter(|t| !t.is_empty())
                })?;
            let artist = row
                .select(&artist_sel)
                .next()
                .map(element_text)
                .filter(|a| !a.is_empty());
            let source_url = row
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| absolute_url(base_url, href));

            Some(ChartEntry {
                title: Some(title),
                artist,
                source_url,
                ..Default::default()
            })
        })
        .collect())
}

/// Tries `structured` first, then the DOM layout.
pub fn structured_then_dom<F>(
    platform: &str,
    html: &str,
    structured: F,
    layout: &DomLayout,
    base_url: &str,
) -> Result<Vec<ChartEntry>, CollectionError>
where
    F: FnOnce(&str) -> Result<Vec<ChartEntry>, CollectionError>,
{
    match structured(html) {
        Ok(entries) if !entries.is_empty() => Ok(entries),
        Ok(_) => {
            debug!(platform, "Structured extraction found no rows, trying DOM");
            extract_dom(html, layout, base_url)
        }
        Err(err) => {
            debug!(platform, error = %err, "Structured extraction failed, trying DOM");
            extract_dom(html, layout, base_url)
        }
    }
}
