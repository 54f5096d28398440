//! Boomplay Top 100 Nigeria. Boomplay publishes no chart API, so only the
//! chart page and the sample chart are available.

use super::extract::{self, DomLayout};
use super::http::{FetchRequest, PageFetcher};
use super::{PlatformDefaults, SourceContext};
use crate::harvest::traits::{sample, ChartSource, SampleEntry, TieredCollector};
use crate::model::ChartEntry;
use crate::traits::{CollectionError, Collector};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const PLATFORM_ID: &str = "boomplay";
const DISPLAY_NAME: &str = "Boomplay Top 100 Nigeria";

const CHART_URL: &str = "https://www.boomplay.com/charts/Top100Nigeria";
const BASE_URL: &str = "https://www.boomplay.com";

const LAYOUT: DomLayout = DomLayout {
    item: ".chart-list .chart-item",
    title: ".title",
    title_attr: None,
    artist: ".artist",
    link: "a[href]",
};

pub const DEFAULTS: PlatformDefaults = PlatformDefaults {
    platform_id: PLATFORM_ID,
    display_name: DISPLAY_NAME,
    homepage_url: CHART_URL,
    description: "Scraped Boomplay Top 100 Nigeria chart.",
    requires_authentication: false,
    rate_limit_per_minute: 10,
    build,
};

const SAMPLE: &[SampleEntry] = &[
    sample("Calm Down", "Rema"),
    sample("Ku Lo Sa", "Oxlade"),
    sample("Rush", "Ayra Starr"),
    sample("Last Last", "Burna Boy"),
    sample("Organise", "Asake"),
    sample("Bandana", "Fireboy DML"),
    sample("Terminator", "Asake"),
    sample("Sugarcane", "Camidoh"),
    sample("Electricity", "Pheelz"),
    sample("Soso", "Omah Lay"),
];

fn build(ctx: SourceContext) -> Arc<dyn Collector> {
    Arc::new(TieredCollector::new(
        PLATFORM_ID,
        DISPLAY_NAME,
        BoomplaySource {
            fetcher: ctx.fetcher,
        },
        ctx.streams,
    ))
}

pub struct BoomplaySource {
    fetcher: Arc<dyn PageFetcher>,
}

/// Chart rows from a JSON-LD `MusicPlaylist` (`track`) or `ItemList`
/// (`itemListElement`).
fn json_ld_entries(blocks: &[Value]) -> Vec<ChartEntry> {
    for block in blocks {
        if let Some(tracks) = block.get("track").and_then(Value::as_array) {
            let entries = extract::entries_from_items(tracks);
            if !entries.is_empty() {
                return entries;
            }
        }
        if let Some(elements) = block.get("itemListElement").and_then(Value::as_array) {
            let entries: Vec<ChartEntry> = elements
                .iter()
                .filter_map(|element| {
                    let item = element.get("item").unwrap_or(element);
                    let mut entry = extract::entry_from_json(item)?;
                    if entry.rank.is_none() {
                        entry.rank = element
                            .get("position")
                            .and_then(Value::as_u64)
                            .and_then(|p| u32::try_from(p).ok())
                            .filter(|p| *p > 0);
                    }
                    Some(entry)
                })
                .collect();
            if !entries.is_empty() {
                return entries;
            }
        }
    }
    Vec::new()
}

fn parse_chart_page(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    extract::structured_then_dom(
        PLATFORM_ID,
        html,
        |html| Ok(json_ld_entries(&extract::json_ld_blocks(html)?)),
        &LAYOUT,
        BASE_URL,
    )
}

#[async_trait]
impl ChartSource for BoomplaySource {
    async fn primary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        Err(CollectionError::TierUnavailable(
            "Boomplay has no public chart API".to_string(),
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
