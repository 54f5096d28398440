//! Apple Music top songs in Nigeria.
//!
//! The primary tier reads Apple's marketing tools feed, which only serves
//! fixed page sizes; the smallest feed covering the limit is requested.

use super::extract::{self, DomLayout};
use super::http::{FetchRequest, PageFetcher};
use super::{PlatformDefaults, SourceContext};
use crate::harvest::traits::{sample, ChartSource, SampleEntry, TieredCollector};
use crate::model::ChartEntry;
use crate::traits::{CollectionError, Collector};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const PLATFORM_ID: &str = "apple-music";
const DISPLAY_NAME: &str = "Apple Music Top Songs Nigeria";

const FEED_BASE: &str = "https://rss.applemarketingtools.com/api/v2/ng/music/most-played";
const FEED_SIZES: &[usize] = &[10, 25, 50, 100];
const PLAYLIST_URL: &str =
    "https://music.apple.com/ng/playlist/top-songs-in-nigeria/pl.2a7a5b0c62724d42af7d19e7936e70ef";
const BASE_URL: &str = "https://music.apple.com";

const LAYOUT: DomLayout = DomLayout {
    item: "div.songs-list-row",
    title: ".songs-list-row__song-name",
    title_attr: None,
    artist: ".songs-list-row__by-line",
    link: "a[href]",
};

pub const DEFAULTS: PlatformDefaults = PlatformDefaults {
    platform_id: PLATFORM_ID,
    display_name: DISPLAY_NAME,
    homepage_url: PLAYLIST_URL,
    description: "Official Apple Music Nigeria Top Songs feed.",
    requires_authentication: false,
    rate_limit_per_minute: 20,
    build,
};

const SAMPLE: &[SampleEntry] = &[
    sample("Calm Down", "Rema & Selena Gomez"),
    sample("Unavailable", "Davido feat. Musa Keys"),
    sample("Soso", "Omah Lay"),
    sample("Charm", "Rema"),
    sample("Reason", "Omah Lay"),
    sample("People", "Libianca"),
    sample("FEEL", "Davido"),
    sample("Over Me", "Davido"),
    sample("City Boys", "Burna Boy"),
    sample("Lonely At The Top", "Asake"),
];

fn build(ctx: SourceContext) -> Arc<dyn Collector> {
    Arc::new(TieredCollector::new(
        PLATFORM_ID,
        DISPLAY_NAME,
        AppleMusicSource {
            fetcher: ctx.fetcher,
        },
        ctx.streams,
    ))
}

pub struct AppleMusicSource {
    fetcher: Arc<dyn PageFetcher>,
}

fn feed_url(limit: usize) -> String {
    let size = FEED_SIZES
        .iter()
        .copied()
        .find(|size| *size >= limit)
        .unwrap_or(100);
    format!("{}/{}/songs.json", FEED_BASE, size)
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    feed: Feed,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    results: Vec<FeedSong>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedSong {
    name: Option<String>,
    artist_name: Option<String>,
    url: Option<String>,
}

fn parse_feed(body: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    let response: FeedResponse = serde_json::from_str(body)?;
    Ok(response
        .feed
        .results
        .into_iter()
        .map(|song| ChartEntry {
            title: song.name,
            artist: song.artist_name,
            source_url: song.url,
            ..Default::default()
        })
        .collect())
}

fn parse_playlist_page(html: &str) -> Result<Vec<ChartEntry>, CollectionError> {
    extract::structured_then_dom(
        PLATFORM_ID,
        html,
        |html| {
            let data = extract::script_json_by_id(html, "serialized-server-data")?;
            let items = extract::find_chart_items(&data).ok_or_else(|| {
                CollectionError::MarkerNotFound("serialized-server-data tracks".into())
            })?;
            Ok(extract::entries_from_items(items))
        },
        &LAYOUT,
        BASE_URL,
    )
}

#[async_trait]
impl ChartSource for AppleMusicSource {
    async fn primary(&self, limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let body = self.fetcher.fetch(&FetchRequest::get(feed_url(limit))).await?;
        parse_feed(&body)
    }

    async fn secondary(&self, _limit: usize) -> Result<Vec<ChartEntry>, CollectionError> {
        let html = self.fetcher.fetch(&FetchRequest::get(PLAYLIST_URL)).await?;
        parse_playlist_page(&html)
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

    const FEED: &str = r#"{"feed": {"title": "Top Songs", "results": [
        {"artistName": "Asake", "id": "1", "name": "Active", "url": "https://music.apple.com/ng/song/1"},
        {"artistName": "Burna Boy", "id": "2", "name": "Higher", "url": "https://music.apple.com/ng/song/2"},
        {"artistName": "Olamide", "id": "3", "name": "Metaverse"}
    ]}}"#;

    const PLAYLIST_DOM: &str = r#"<html><body>
        <div class="songs-list-row">
            <div class="songs-list-row__song-name">Sensational</div>
            <div class="songs-list-row__by-line">Chris Brown, Davido &amp; Lojay</div>
            <a href="/ng/song/sensational/1">open</a>
        </div>
        <div class="songs-list-row">
            <div class="songs-list-row__song-name">Tshwala Bam</div>
            <div class="songs-list-row__by-line">TitoM &amp; Yuppe</div>
        </div>
    </body></html>"#;

    #[test]
    fn test_feed_url_picks_covering_size() {
        assert!(feed_url(1).ends_with("/10/songs.json"));
        assert!(feed_url(20).ends_with("/25/songs.json"));
        assert!(feed_url(50).ends_with("/50/songs.json"));
        assert!(feed_url(500).ends_with("/100/songs.json"));
    }

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title.as_deref(), Some("Active"));
        assert_eq!(entries[1].artist.as_deref(), Some("Burna Boy"));
    }

    #[test]
    fn test_parse_feed_rejects_unexpected_shape() {
        assert!(matches!(
            parse_feed(r#"{"status": "ok"}"#),
            Err(CollectionError::Parse(_))
        ));
    }

    #[test]
    fn test_playlist_dom_fallback() {
        let entries = parse_playlist_page(PLAYLIST_DOM).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].artist.as_deref(), Some("Chris Brown, Davido & Lojay"));
        assert_eq!(
            entries[0].source_url.as_deref(),
            Some("https://music.apple.com/ng/song/sensational/1")
        );
    }

    #[tokio::test]
    async fn test_collect_from_feed() {
        let fetcher = StaticFetcher::default().with(&feed_url(20), FEED);
        let collector = TieredCollector::new(
            PLATFORM_ID,
            DISPLAY_NAME,
            AppleMusicSource {
                fetcher: Arc::new(fetcher),
            },
            StreamEstimate::default(),
        );
        let snapshot = collector.collect(NonZeroUsize::new(20).unwrap()).await.unwrap();

        assert_eq!(snapshot.tier_used, Tier::PrimaryApi);
        assert_eq!(snapshot.tracks.len(), 3);
        assert_eq!(snapshot.tracks[2].title, "Metaverse");
        assert_eq!(snapshot.tracks[2].rank, 3);
    }
}
