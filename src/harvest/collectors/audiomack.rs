//! Audiomack trending songs.
//!
//! The API tier needs a key (`AUDIOMACK_API_KEY` or `[platforms.audiomack]
//! api_key`); without one it reports missing authentication and the
//! trending page is scraped instead.

use super::extract::{self, DomLayout};
use super::http::{FetchRequest, PageFetcher};
use super::{PlatformDefaults, SourceContext};
use crate::harvest::traits::{sample, ChartSource, SampleEntry, TieredCollector};
use crate::model::ChartEntry;
use crate::traits::{CollectionError, Collector};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const PLATFORM_ID: &str = "audiomack";
const DISPLAY_NAME: &str = "Audiomack Trending";

const API_URL: &str = "https://api.audiomack.com/v1/music/trending/song";
const TRENDING_URL: &str = "https://audiomack.com/trending";
const BASE_URL: &str = "https://audiomack.com";

const LAYOUT: DomLayout = DomLayout {
    item: "article.music__item",
    title: ".music__title",
    title_attr: Some("data-title"),
    artist: ".music__artist",
    link: "a[href]",
};

pub const DEFAULTS: PlatformDefaults = PlatformDefaults {
    platform_id: PLATFORM_ID,
    display_name: DISPLAY_NAME,
    homepage_url: TRENDING_URL,
    description: "Trending songs from the Audiomack charts.",
    requires_authentication: true,
    rate_limit_per_minute: 30,
    build,
};

const SAMPLE: &[SampleEntry] = &[
    sample("Alone", "Burna Boy"),
    sample("Sability", "Ayra Starr"),
    sample("Party No Dey Stop", "Adekunle Gold"),
    sample("Who Is Your Guy", "Spyro"),
    sample("Unavailable", "Davido"),
    sample("Charm", "Rema"),
    sample("Feel", "Davido"),
    sample("Gwagwalada", "BNXN"),
    sample("City Boys", "Burna Boy"),
    sample("Asiwaju", "Ruger"),
];

fn build(ctx: SourceContext) -> Arc<dyn Collector> {
    Arc::new(TieredCollector::new(
        PLATFORM_ID,
        DISPLAY_NAME,
        AudiomackSource {
            fetcher: ctx.fetcher,
            api_key: ctx.api_key,
            requires_authentication: ctx.requires_authentication,
        },
        ctx.streams,
    ))
}

pub struct AudiomackSource {
    fetcher: Arc<dyn PageFetcher>,
    api_key: Option<String>,
    requires_authentication: bool,
}

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    results: Vec<ApiSong>,
}

#[derive(Debug, Deserialize)]
struct ApiSong {
    title: Option<String>,
    artist: Option<String>,
    url_slug: Option<String>,
    uploader: Option<Uploader>,
    stats: Option<Stats>,
}

#[derive(Debug, Deserialize)]
struct Uploader {
    url_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Stats {
    #[serde(rename = "plays-raw")]
    plays: Option<u64>,
}

impl ApiSong {
    fn song_url(&self) -> Option<String> {
        let uploader = self.uploader.as_ref()?.url_slug.as_deref()?;
        let slug = self.url_slug.as_deref()?;
        Some(format!("{}/{}/song/{}", BASE_URL, uploader, slug))
    }
}

fn parse_api(body: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    let response: TrendingResponse = serde_json::from_str(body)?;
    Ok(response
        .results
        .into_iter()
        .map(|song| ChartEntry {
            source_url: song.song_url(),
            streams: song.stats.as_ref().and_then(|s| s.plays),
            title: song.title,
            artist: song.artist,
            ..Default::default()
        })
        .collect())
}

fn parse_trending_page(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    extract::structured_then_dom(
        PLATFORM_ID,
        html,
        |html| {
            let data = extract::script_json_by_id(html, "__NEXT_DATA__")?;
            let items = extract::find_chart_items(&data)
                .ok_or_else(|| CollectionError::MarkerNotFound("__NEXT_DATA__ songs".into()))?;
            Ok(extract::entries_from_items(items))
        },
        &LAYOUT,
        BASE_URL,
    )
}

#[async_trait]
impl ChartSource for AudiomackSource {
    async fn primary(&self, limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let mut request = FetchRequest::get(API_URL).query("limit", limit);
        match self.api_key.as_deref() {
            Some(key) => request = request.bearer(key),
            None if self.requires_authentication => {
                return Err(CollectionError::MissingAuthentication(
                    PLATFORM_ID.to_string(),
                ))
            }
            None => {}
        }
        let body = self.fetcher.fetch(&request).await?;
        parse_api(&body)
    }

    async fn secondary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let html = self.fetcher.fetch(&FetchRequest::get(TRENDING_URL)).await?;
        parse_trending_page(&html)
    }

    fn sample_chart(&self) -> &'static [SampleEntry] {
        SAMPLE
    }
}
