//! Deezer global chart.

use super::extract::{self, DomLayout};
use super::http::{FetchRequest, PageFetcher};
use super::{PlatformDefaults, SourceContext};
use crate::harvest::traits::{sample, ChartSource, SampleEntry, TieredCollector};
use crate::model::ChartEntry;
use crate::traits::{CollectionError, Collector};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const PLATFORM_ID: &str = "deezer";
const DISPLAY_NAME: &str = "Deezer Global Chart";

const API_URL: &str = "https://api.deezer.com/chart/0/tracks";
const EXPLORE_URL: &str = "https://www.deezer.com/en/channels/explore";
const BASE_URL: &str = "https://www.deezer.com";

const APP_STATE_PATTERN: &str = r"(?s)window\.__DZR_APP_STATE__\s*=\s*(\{.*?\})\s*;?\s*</script>";

const LAYOUT: DomLayout = DomLayout {
    item: "div.datagrid-row.song",
    title: "[itemprop=\"name\"]",
    title_attr: None,
    artist: "[itemprop=\"byArtist\"]",
    link: "a[href]",
};

pub const DEFAULTS: PlatformDefaults = PlatformDefaults {
    platform_id: PLATFORM_ID,
    display_name: DISPLAY_NAME,
    homepage_url: EXPLORE_URL,
    description: "Top tracks from Deezer's public chart API.",
    requires_authentication: false,
    rate_limit_per_minute: 50,
    build,
};

const SAMPLE: &[SampleEntry] = &[
    sample("Calm Down", "Rema"),
    sample("Rush", "Ayra Starr"),
    sample("Soweto", "Victony"),
    sample("Who Is Your Guy?", "Spyro"),
    sample("Bounce", "Rema"),
    sample("City Boys", "Burna Boy"),
    sample("Lonely At The Top", "Asake"),
    sample("Peru", "Fireboy DML"),
    sample("Bandana", "Fireboy DML & Asake"),
    sample("Essence", "Wizkid"),
];

fn build(ctx: SourceContext) -> Arc<dyn Collector> {
    Arc::new(TieredCollector::new(
        PLATFORM_ID,
        DISPLAY_NAME,
        DeezerSource {
            fetcher: ctx.fetcher,
        },
        ctx.streams,
    ))
}

pub struct DeezerSource {
    fetcher: Arc<dyn PageFetcher>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    data: Vec<ApiTrack>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    title: Option<String>,
    link: Option<String>,
    position: Option<u32>,
    artist: Option<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: Option<String>,
}

/// Parses the chart API response. Deezer's `rank` field is a popularity
/// score rather than a chart position, so only `position` is used.
fn parse_api(body: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    let response: ChartResponse = serde_json::from_str(body)?;
    if let Some(error) = response.error {
        return Err(CollectionError::Parse(format!(
            "API error: {}",
            error.message
        )));
    }

    Ok(response
        .data
        .into_iter()
        .map(|track| ChartEntry {
            title: track.title,
            artist: track.artist.and_then(|a| a.name),
            rank: track.position.filter(|p| *p > 0),
            source_url: track.link,
            ..Default::default()
        })
        .collect())
}

fn parse_explore_page(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    extract::structured_then_dom(
        PLATFORM_ID,
        html,
        |html| {
            let state = extract::capture_json(html, APP_STATE_PATTERN)?;
            let items = extract::find_chart_items(&state)
                .ok_or_else(|| CollectionError::MarkerNotFound("app state chart".into()))?;
            let mut entries = extract::entries_from_items(items);
            for entry in &mut entries {
                entry.rank = None;
            }
            Ok(entries)
        },
        &LAYOUT,
        BASE_URL,
    )
}

#[async_trait]
impl ChartSource for DeezerSource {
    async fn primary(&self, limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let request = FetchRequest::get(API_URL).query("limit", limit);
        let body = self.fetcher.fetch(&request).await?;
        parse_api(&body)
    }

    async fn secondary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let html = self.fetcher.fetch(&FetchRequest::get(EXPLORE_URL)).await?;
        parse_explore_page(&html)
    }

    fn sample_chart(&self) -> &'static [SampleEntry] {
        SAMPLE
    }
}

#[cfg(test)]
mod tests {
    use super::super::http::stub::StaticFetcher;
    use super::*;
    use crate::config::StreamEstimate;
    use crate::model::Tier;
    use std::num::NonZeroUsize;

    const API_BODY: &str = r#"{
        "data": [
            {"id": 1, "title": "Water", "link": "https://www.deezer.com/track/1",
             "position": 1, "rank": 998877, "artist": {"name": "Tyla"}},
            {"id": 2, "title": "Espresso", "link": "https://www.deezer.com/track/2",
             "position": 2, "rank": 887766, "artist": {"name": "Sabrina Carpenter"}},
            {"id": 3, "title": "Rush", "position": 3, "artist": {"name": "Ayra Starr"}}
        ],
        "total": 3
    }"#;

    const EXPLORE_PAGE: &str = r#"<html><body>
        <script>window.__DZR_APP_STATE__ = {"TOP_TRACK": {"data": [
            {"SNG_TITLE": "Ozeba", "ART_NAME": "Rema", "RANK": "654321"},
            {"SNG_TITLE": "Love Me JeJe", "ART_NAME": "Tems", "RANK": "543210"}
        ]}};</script>
        </body></html>"#;

    fn collector(fetcher: StaticFetcher) -> TieredCollector<DeezerSource> {
        TieredCollector::new(
            PLATFORM_ID,
            DISPLAY_NAME,
            DeezerSource {
                fetcher: Arc::new(fetcher),
            },
            StreamEstimate::default(),
        )
    }

    #[test]
    fn test_parse_api_ignores_popularity_rank() {
        let entries = parse_api(API_BODY).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].title.as_deref(), Some("Espresso"));
        assert_eq!(entries[1].rank, Some(2));
        assert_eq!(entries[0].artist.as_deref(), Some("Tyla"));
        assert!(entries[2].source_url.is_none());
    }

    #[test]
    fn test_parse_api_error_payload() {
        let body = r#"{"error": {"type": "Exception", "message": "Quota limit exceeded", "code": 4}}"#;
        assert!(matches!(parse_api(body), Err(CollectionError::Parse(_))));
    }

    #[test]
    fn test_parse_explore_page_app_state() {
        let entries = parse_explore_page(EXPLORE_PAGE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Ozeba"));
        assert_eq!(entries[1].artist.as_deref(), Some("Tems"));
        assert!(entries.iter().all(|e| e.rank.is_none()));
    }

    #[tokio::test]
    async fn test_primary_tier_wins() {
        let fetcher = StaticFetcher::default().with(API_URL, API_BODY);
        let collector = collector(fetcher);
        let snapshot = collector.collect(NonZeroUsize::new(2).unwrap()).await.unwrap();

        assert_eq!(snapshot.tier_used, Tier::PrimaryApi);
        assert_eq!(snapshot.tracks.len(), 2);
        assert_eq!(snapshot.tracks[0].title, "Water");
    }

    #[tokio::test]
    async fn test_falls_back_to_explore_page() {
        let fetcher = StaticFetcher::default().with(EXPLORE_URL, EXPLORE_PAGE);
        let snapshot = collector(fetcher)
            .collect(NonZeroUsize::new(5).unwrap())
            .await
            .unwrap();

        assert_eq!(snapshot.tier_used, Tier::SecondaryScrape);
        assert_eq!(snapshot.tracks[0].artist, "Rema");
    }

    #[tokio::test]
    async fn test_limit_is_sent_to_api() {
        let fetcher = Arc::new(StaticFetcher::default().with(API_URL, API_BODY));
        let source = DeezerSource {
            fetcher: fetcher.clone(),
        };
        source.primary(7).await.unwrap();
        assert_eq!(
            fetcher.seen()[0].query,
            vec![("limit".to_string(), "7".to_string())]
        );
    }

    #[tokio::test]
    async fn test_oversized_api_page_is_cut_by_position() {
        let body = r#"{"data": [
            {"title": "Rush", "position": 3, "artist": {"name": "Ayra Starr"}},
            {"title": "Espresso", "position": 2, "artist": {"name": "Sabrina Carpenter"}},
            {"title": "Water", "position": 1, "artist": {"name": "Tyla"}}
        ]}"#;
        let snapshot = collector(StaticFetcher::default().with(API_URL, body))
            .collect(NonZeroUsize::new(2).unwrap())
            .await
            .unwrap();

        assert_eq!(snapshot.tier_used, Tier::PrimaryApi);
        let titles: Vec<_> = snapshot.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Water", "Espresso"]);
    }
}
