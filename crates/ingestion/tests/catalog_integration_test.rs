//! End-to-end catalog tests against a mocked upstream provider
//!
//! Every test runs on the in-memory store and the memory cache tier, so no
//! database or Redis is needed.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vod_catalog_ingestion::{
    ApiVersion, AssumeReachable, BestStream, CacheTier, CatalogComponents, CatalogService,
    CatalogStore, EpisodeId, InMemoryCatalogStore, IngestionConfig, MemoryCacheTier, Quality,
    ResponseNormalizer, StreamType, TieredCache, TtlPolicy, UpstreamClient, UpstreamOperation,
    NOT_FOUND_DESCRIPTION,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> IngestionConfig {
    let mut config = IngestionConfig::with_upstream(base_url);
    config.sync.inter_movie_delay = Duration::ZERO;
    config.enrichment.batch_deadline = Duration::from_secs(2);
    config
}

fn build_service(config: &IngestionConfig) -> (CatalogService, Arc<InMemoryCatalogStore>) {
    let store = Arc::new(InMemoryCatalogStore::new());
    let tiers: Vec<Arc<dyn CacheTier>> = vec![Arc::new(MemoryCacheTier::new(
        config.cache.memory_capacity,
        config.cache.memory_ttl,
    ))];

    let service = CatalogService::new(
        config,
        CatalogComponents {
            upstream: UpstreamClient::new(&config.upstream).unwrap(),
            normalizer: ResponseNormalizer::default(),
            cache: TieredCache::new(tiers, TtlPolicy::from(&config.cache)),
            store: store.clone(),
            probe: Arc::new(AssumeReachable),
        },
    );
    (service, store)
}

fn complete_movie(slug: &str, title: &str) -> serde_json::Value {
    json!({
        "slug": slug,
        "name": title,
        "content": "A plot",
        "poster_url": format!("https://img.example.com/{}-poster.jpg", slug),
        "thumb_url": format!("https://img.example.com/{}-thumb.jpg", slug),
        "year": 2023
    })
}

/// Two episodes, each with an embed and an m3u8 link on one server
fn series_detail(slug: &str) -> serde_json::Value {
    json!({
        "data": {
            "item": {
                "slug": slug,
                "name": "Series",
                "poster_url": "https://img.example.com/p.jpg",
                "thumb_url": "https://img.example.com/t.jpg",
                "episodes": [{
                    "server_name": "Vietsub #1",
                    "server_data": [
                        {
                            "name": "Tập 1",
                            "link_embed": "https://player.example.com/embed/e1",
                            "link_m3u8": "https://stream.example.com/e1/index.m3u8"
                        },
                        {
                            "name": "Tập 2",
                            "link_embed": "https://player.example.com/embed/e2",
                            "link_m3u8": "https://stream.example.com/e2/index.m3u8"
                        }
                    ]
                }]
            }
        }
    })
}

#[tokio::test]
async fn test_fallback_stops_at_first_successful_version() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/foo"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/phim/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_movie("foo", "Foo")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/phim/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_movie("foo", "Foo v1")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = test_config(&mock_server.uri());
    let client = UpstreamClient::new(&config.upstream).unwrap();
    let payload = client
        .fetch(&UpstreamOperation::MovieDetail { slug: "foo".into() }, None)
        .await
        .unwrap();

    assert_eq!(payload.version, ApiVersion::V2);
    assert_eq!(payload.status, 200);
    assert_eq!(client.available_permits(), config.upstream.max_concurrency);
}

#[tokio::test]
async fn test_empty_body_moves_to_next_version() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/tim-kiem"))
        .respond_with(ResponseTemplate::new(200).set_body_string("   "))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/tim-kiem"))
        .and(query_param("keyword", "foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&mock_server)
        .await;

    let client = UpstreamClient::new(&test_config(&mock_server.uri()).upstream).unwrap();
    let op = UpstreamOperation::Search {
        keyword: "foo".into(),
        page: 1,
        limit: 20,
    };
    let payload = client.fetch(&op, None).await.unwrap();
    assert_eq!(payload.version, ApiVersion::V2);
}

#[tokio::test]
async fn test_movie_detail_from_v2_when_v3_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/foo"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/phim/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "slug": "foo",
            "title": "Foo",
            "description": "From v2",
            "poster_url": "https://img.example.com/p.jpg",
            "thumb_url": "https://img.example.com/t.jpg",
            "category": [{ "name": "Drama" }]
        })))
        // The second lookup is served from cache
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, store) = build_service(&test_config(&mock_server.uri()));

    let movie = service.get_movie_detail("foo").await;
    assert_eq!(movie.slug, "foo");
    assert_eq!(movie.title, "Foo");
    assert_eq!(movie.description, "From v2");
    assert!(!movie.is_placeholder());
    assert!(store.get_movie("foo").await.unwrap().is_some());

    let again = service.get_movie_detail("foo").await;
    assert_eq!(again.title, "Foo");
    assert_eq!(service.cache().stats().memory_hits, 1);
}

#[tokio::test]
async fn test_missing_movie_returns_placeholder_and_is_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (service, store) = build_service(&test_config(&mock_server.uri()));

    for _ in 0..2 {
        let movie = service.get_movie_detail("ghost").await;
        assert_eq!(movie.slug, "ghost");
        assert_eq!(movie.description, NOT_FOUND_DESCRIPTION);
        assert_eq!(movie.poster_url, "/images/placeholder.jpg");
    }
    assert!(store.get_movie("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_episodes_prefer_m3u8_and_keep_embed_as_candidate() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/series"))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_detail("series")))
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    let episodes = service.get_episodes("series").await;
    assert_eq!(episodes.len(), 2);

    let first = &episodes[0];
    assert_eq!(first.episode_number, 1);
    assert_eq!(first.url, "https://stream.example.com/e1/index.m3u8");
    assert_eq!(first.servers.len(), 2);
    assert_eq!(first.servers[0].stream_type, StreamType::SegmentedStream);
    assert_eq!(first.servers[1].stream_type, StreamType::Embed);
}

#[tokio::test]
async fn test_best_stream_syncs_on_demand() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/series"))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_detail("series")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    let best = service
        .get_best_stream(&EpisodeId::new("series", 2), Quality::HD)
        .await;
    let server = best.server().unwrap();
    assert_eq!(server.url, "https://stream.example.com/e2/index.m3u8");
    assert!(server.is_working);

    let missing = service
        .get_best_stream(&EpisodeId::new("series", 7), Quality::HD)
        .await;
    assert_eq!(missing, BestStream::NoServersAvailable);
}

#[tokio::test]
async fn test_best_stream_falls_back_to_lowest_priority() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "movie": {
                "slug": "show",
                "name": "Show",
                "poster_url": "https://img.example.com/p.jpg",
                "thumb_url": "https://img.example.com/t.jpg"
            },
            "episodes": [{
                "server_name": "Mixed",
                "server_data": [{
                    "name": "Tập 1",
                    "link_embed": "https://player.example.com/embed/sd/1",
                    "link_m3u8": "https://stream.example.com/1080p/1.m3u8"
                }]
            }]
        })))
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    // Neither server is HD, so the lowest-priority one wins regardless of quality
    let best = service
        .get_best_stream(&EpisodeId::new("show", 1), Quality::HD)
        .await;
    let server = best.server().unwrap();
    assert_eq!(server.stream_type, StreamType::SegmentedStream);
    assert_eq!(server.quality, Quality::FHD);

    // An exact quality match is preferred when one exists
    let sd = service
        .get_best_stream(&EpisodeId::new("show", 1), Quality::SD)
        .await;
    assert_eq!(sd.server().unwrap().stream_type, StreamType::Embed);
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/series"))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_detail("series")))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (service, store) = build_service(&test_config(&mock_server.uri()));

    let first = service.sync_episodes("series").await;
    assert_eq!((first.added, first.updated, first.failed), (2, 0, 0));
    let after_first = store.get_episodes("series").await.unwrap();

    let second = service.sync_episodes("series").await;
    assert_eq!((second.added, second.updated, second.failed), (0, 2, 0));
    let after_second = store.get_episodes("series").await.unwrap();

    assert_eq!(after_first.len(), 2);
    assert_eq!(after_second, after_first);
}

/// Detail document with inline episodes but no artwork
fn bare_detail(slug: &str) -> serde_json::Value {
    json!({
        "movie": { "slug": slug, "name": "Bare" },
        "episodes": [{
            "server_name": "Vietsub #1",
            "server_data": [{
                "name": "Tập 1",
                "link_m3u8": "https://stream.example.com/b1/index.m3u8"
            }]
        }]
    })
}

#[tokio::test]
async fn test_sync_keeps_enriched_artwork() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bare_detail("foo")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/phim/foo/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "poster_url": "https://img.example.com/foo-poster.jpg"
        })))
        .mount(&mock_server)
        .await;

    let (service, store) = build_service(&test_config(&mock_server.uri()));

    let before = service.get_movie_detail("foo").await;
    assert_eq!(before.poster_url, "https://img.example.com/foo-poster.jpg");

    let report = service.sync_episodes("foo").await;
    assert_eq!((report.added, report.updated, report.failed), (1, 0, 0));

    let after = service.get_movie_detail("foo").await;
    assert_eq!(after.poster_url, "https://img.example.com/foo-poster.jpg");
    let stored = store.get_movie("foo").await.unwrap().unwrap();
    assert_eq!(stored.poster_url, "https://img.example.com/foo-poster.jpg");
}

#[tokio::test]
async fn test_sync_backfills_artwork_for_new_movie() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/bar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bare_detail("bar")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/phim/bar/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "poster_url": "https://img.example.com/bar-poster.jpg",
            "thumb_url": "https://img.example.com/bar-thumb.jpg"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, store) = build_service(&test_config(&mock_server.uri()));

    service.sync_episodes("bar").await;

    let stored = store.get_movie("bar").await.unwrap().unwrap();
    assert_eq!(stored.poster_url, "https://img.example.com/bar-poster.jpg");
    assert_eq!(stored.thumb_url, "https://img.example.com/bar-thumb.jpg");
}

#[tokio::test]
async fn test_movie_without_episodes_is_fetched_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/film"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_movie("film", "Film")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/phim/film/tap-phim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    for _ in 0..3 {
        assert!(service.get_episodes("film").await.is_empty());
    }
}

#[tokio::test]
async fn test_upstream_calls_capped_by_max_concurrency() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/phim/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(complete_movie("slow", "Slow"))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(4)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server.uri());
    config.upstream.max_concurrency = 2;
    let client = UpstreamClient::new(&config.upstream).unwrap();
    let op = UpstreamOperation::MovieDetail {
        slug: "slow".into(),
    };
    let versions = [ApiVersion::V1];

    let started = std::time::Instant::now();
    let fetches = futures::future::join_all((0..4).map(|_| client.fetch(&op, Some(&versions))));
    let in_flight = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.available_permits()
    };
    let (results, permits_in_flight) = tokio::join!(fetches, in_flight);

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(permits_in_flight, 0);
    // Four calls through two permits take two rounds of the delay
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(client.available_permits(), 2);
}

#[tokio::test]
async fn test_sync_counts_unreachable_movie_as_failed() {
    let mock_server = MockServer::start().await;
    let (service, _) = build_service(&test_config(&mock_server.uri()));

    let report = service.sync_episodes("nowhere").await;
    assert_eq!((report.added, report.updated, report.failed), (0, 0, 1));
}

#[tokio::test]
async fn test_free_text_episode_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/legacy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_movie("legacy", "Legacy")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/phim/legacy/tap-phim"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "Tập 4|https://stream.example.com/4.m3u8\nTập 7|https://stream.example.com/7.m3u8\n",
        ))
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    let episodes = service.get_episodes("legacy").await;
    let numbers: Vec<u32> = episodes.iter().map(|e| e.episode_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(episodes[0].title, "Tập 4");
    assert_eq!(episodes[1].url, "https://stream.example.com/7.m3u8");
}

#[tokio::test]
async fn test_latest_movies_served_from_memory_on_repeat() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/danh-sach/phim-moi-cap-nhat"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "items": [complete_movie("a", "A"), complete_movie("b", "B")],
                "params": { "pagination": { "totalItems": 42, "totalItemsPerPage": 20, "currentPage": 1 } }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, store) = build_service(&test_config(&mock_server.uri()));

    let page = service.get_latest_movies(1, 20).await;
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.pagination.total_items, 42);
    assert_eq!(page.pagination.total_pages, 3);

    let cached = service.get_latest_movies(1, 20).await;
    assert_eq!(cached.items, page.items);
    assert_eq!(service.cache().stats().memory_hits, 1);

    // Listed movies become sync targets
    assert_eq!(store.recent_movies(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_latest_movies_empty_page_when_upstream_down() {
    let mock_server = MockServer::start().await;
    let (service, _) = build_service(&test_config(&mock_server.uri()));

    let page = service.get_latest_movies(1, 20).await;
    assert!(page.items.is_empty());
    assert_eq!(page.pagination.total_items, 0);
}

#[tokio::test]
async fn test_blank_search_makes_no_upstream_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    let page = service.search("   ", 1, 20).await;
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_recent_movies_sync_walks_listed_movies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/danh-sach/phim-moi-cap-nhat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [complete_movie("series", "Series")]
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/phim/series"))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_detail("series")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    service.get_latest_movies(1, 20).await;
    let report = service.sync_recent_movies(5).await;
    assert_eq!((report.added, report.updated, report.failed), (2, 0, 0));
}

#[tokio::test]
async fn test_record_view_increments_stored_movie() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/phim/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_movie("foo", "Foo")))
        .mount(&mock_server)
        .await;

    let (service, _) = build_service(&test_config(&mock_server.uri()));

    assert_eq!(service.record_view("foo").await, None);
    service.get_movie_detail("foo").await;
    assert_eq!(service.record_view("foo").await, Some(1));
    assert_eq!(service.record_view("foo").await, Some(2));
}
