//! TurnTable Top 100 (Nigeria).
//!
//! TurnTable has no public API. The chart page is a Next.js app whose
//! `__NEXT_DATA__` usually carries the full chart, including weeks on
//! chart; older layouts render a plain table.

use super::extract;
use super::http::{FetchRequest, PageFetcher};
use super::{PlatformDefaults, SourceContext};
use crate::harvest::traits::{sample, ChartSource, SampleEntry, TieredCollector};
use crate::model::ChartEntry;
use crate::traits::{CollectionError, Collector};
use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const PLATFORM_ID: &str = "turntable";
const DISPLAY_NAME: &str = "TurnTable Top 100";

const CHART_URL: &str = "https://www.turntablecharts.com/charts/1";
const HOMEPAGE_URL: &str = "https://www.turntablecharts.com/";
const BASE_URL: &str = "https://www.turntablecharts.com";

pub const DEFAULTS: PlatformDefaults = PlatformDefaults {
    platform_id: PLATFORM_ID,
    display_name: DISPLAY_NAME,
    homepage_url: HOMEPAGE_URL,
    description: "TurnTable Charts (Nigeria) weekly rankings.",
    requires_authentication: false,
    rate_limit_per_minute: 10,
    build,
};

const SAMPLE: &[SampleEntry] = &[
    sample("Water", "Tyla"),
    sample("Lonely At The Top", "Asake"),
    sample("Pay Me", "FAVE"),
    sample("Ngozi", "Crayon feat. Ayra Starr"),
    sample("Party No Dey Stop", "Adekunle Gold"),
    sample("Jaho", "Kizz Daniel"),
    sample("My G", "Kizz Daniel"),
    sample("Bandana", "Fireboy DML & Asake"),
    sample("Sittin' On Top Of The World", "Burna Boy"),
    sample("Feel", "Davido"),
];

fn build(ctx: SourceContext) -> Arc<dyn Collector> {
    Arc::new(TieredCollector::new(
        PLATFORM_ID,
        DISPLAY_NAME,
        TurntableSource {
            fetcher: ctx.fetcher,
        },
        ctx.streams,
    ))
}

pub struct TurntableSource {
    fetcher: Arc<dyn PageFetcher>,
}

/// Known locations of the chart list inside `pageProps`, newest layout
/// first.
const ITEM_POINTERS: &[&str] = &[
    "/chartData/chartItems",
    "/chart/items",
    "/chart/songs",
    "/data/chart/items",
    "/data/chart/songs",
];

fn next_data_entries(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    let data = extract::script_json_by_id(html, "__NEXT_DATA__")?;
    let page_props = data
        .pointer("/props/pageProps")
        .ok_or_else(|| CollectionError::MarkerNotFound("props.pageProps".into()))?;

    let items = ITEM_POINTERS
        .iter()
        .filter_map(|pointer| page_props.pointer(pointer).and_then(Value::as_array))
        .find(|items| !items.is_empty())
        .or_else(|| extract::find_chart_items(page_props))
        .ok_or_else(|| CollectionError::MarkerNotFound("chart items in pageProps".into()))?;

    Ok(extract::entries_from_items(items))
}

/// `table tbody tr` rows: position, title, artist, weeks on chart, then
/// any further columns.
fn table_entries(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    let row_sel = extract::selector("table tbody tr")?;
    let cell_sel = extract::selector("td")?;
    let link_sel = extract::selector("a[href]")?;

    let document = Html::parse_document(html);
    let mut entries = Vec::new();
    for row in document.select(&row_sel) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 4 {
            continue;
        }
        let title = extract::element_text(cells[1]);
        if title.is_empty() {
            continue;
        }
        let artist = extract::element_text(cells[2]);
        entries.push(ChartEntry {
            title: Some(title),
            artist: Some(artist).filter(|a| !a.is_empty()),
            rank: extract::element_text(cells[0])
                .trim_start_matches('#')
                .parse()
                .ok()
                .filter(|r: &u32| *r > 0),
            source_url: cells[1]
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| extract::absolute_url(BASE_URL, href)),
            weeks_on_chart: extract::element_text(cells[3]).parse().ok(),
            ..Default::default()
        });
    }

    if entries.is_empty() {
        return Err(CollectionError::MarkerNotFound("table tbody tr".into()));
    }
    Ok(entries)
}

fn parse_chart_page(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    match next_data_entries(html) {
        Ok(entries) if !entries.is_empty() => return Ok(entries),
        Ok(_) => debug!(platform = PLATFORM_ID, "__NEXT_DATA__ had no rows, trying table"),
        Err(err) => {
            debug!(platform = PLATFORM_ID, error = %err, "__NEXT_DATA__ unusable, trying table")
        }
    }
    table_entries(html)
}

#[async_trait]
impl ChartSource for TurntableSource {
    async fn primary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        Err(CollectionError::TierUnavailable(
            "TurnTable has no public chart API".to_string(),
        ))
    }

    async fn secondary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let html = self.fetcher.fetch(&FetchRequest::get(CHART_URL)).await?;
        parse_chart_page(&html)
    }

    fn sample_chart(&self) -> &'static [SampleEntry] {
        SAMPLE
    }
}
