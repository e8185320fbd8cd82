mod common;

use common::{fixture, FakeSource};
use eagate_scraper::crawler::Crawler;
use eagate_scraper::db;
use eagate_scraper::models::{Chart, Difficulty, Mode, Song, Tier};
use eagate_scraper::sources::ddr::{chart_detail_uri, music_data_uri, music_detail_uri};
use eagate_scraper::sync;
use std::sync::Arc;

const CATALOG_PAGE_2: &str = r#"<html><body><table id="data_tbl">
    <tr><td><a href="/game/ddr/ddra20/p/playdata/music_detail.html?index=9999">LAST SONG</a></td></tr>
    <tr><td><a href="/game/ddr/ddra20/p/playdata/music_detail.html?index=8Il6980di8P89lil1PDIqqIbiq1QO8lQ">MAX 300</a></td></tr>
</table></body></html>"#;

fn charts(count: usize) -> Vec<Chart> {
    (0..count)
        .map(|i| Chart { song_id: format!("song{}", i), mode: Mode::Single, tier: Tier::Difficult })
        .collect()
}

#[tokio::test]
async fn test_chart_crawl_counts_failures() {
    let charts = charts(10);
    let mut source = FakeSource::new();
    for (i, chart) in charts.iter().enumerate() {
        let url = chart_detail_uri(&chart.song_id, chart.mode, chart.tier).unwrap();
        source = if i == 3 || i == 7 {
            source.with_broken(url)
        } else {
            source.with_html(url, fixture("chart_statistics.html"))
        };
    }

    let crawler = Crawler::new(Arc::new(source), 4);
    let partial = crawler.crawl_chart_statistics(charts, 12345678).await;
    assert_eq!(partial.records.len(), 8);
    assert_eq!(partial.failed, 2);
    assert_eq!(partial.total, 10);
    assert_eq!(partial.error().expect("partial crawl").to_string(), "2/10 failed");
    assert!(partial.records.iter().all(|s| s.song_id != "song3" && s.song_id != "song7"));
}

#[tokio::test]
async fn test_chart_crawl_skips_unplayed() {
    let charts = charts(3);
    let mut source = FakeSource::new();
    for (i, chart) in charts.iter().enumerate() {
        let url = chart_detail_uri(&chart.song_id, chart.mode, chart.tier).unwrap();
        let page = if i == 0 {
            fixture("chart_no_play.html")
        } else {
            fixture("chart_statistics.html")
        };
        source = source.with_html(url, page);
    }

    let partial = Crawler::new(Arc::new(source), 2).crawl_chart_statistics(charts, 1).await;
    assert!(partial.is_complete());
    assert_eq!(partial.records.len(), 2);
}

#[tokio::test]
async fn test_song_id_crawl() {
    let source = FakeSource::new()
        .with_html(music_data_uri(0), fixture("music_data.html"))
        .with_html(music_data_uri(1), CATALOG_PAGE_2)
        .with_broken(music_data_uri(2));

    let partial = Crawler::new(Arc::new(source), 2).crawl_song_ids().await.unwrap();
    assert_eq!(partial.total, 3);
    assert_eq!(partial.failed, 1);
    assert_eq!(
        partial.records,
        vec!["01lbO69qQiP691ll6DIiqPbIdd9O806o", "8Il6980di8P89lil1PDIqqIbiq1QO8lQ", "9999"]
    );
}

#[tokio::test]
async fn test_song_id_crawl_needs_first_page() {
    let source = FakeSource::new().with_broken(music_data_uri(0));
    assert!(Crawler::new(Arc::new(source), 2).crawl_song_ids().await.is_err());
}

#[tokio::test]
async fn test_song_data_is_stored_once() {
    let id = "01lbO69qQiP691ll6DIiqPbIdd9O806o";
    let source = FakeSource::new().with_html(music_detail_uri(id), fixture("music_detail.html"));
    let crawler = Crawler::new(Arc::new(source), 2);

    let songs = crawler.crawl_song_data(vec![id.to_string(), "missing".to_string()], false).await;
    assert_eq!(songs.records.len(), 1);
    assert_eq!(songs.failed, 1);
    let difficulties = crawler.crawl_difficulties(vec![id.to_string()]).await;
    assert_eq!(difficulties.records.len(), 9);

    let mut conn = db::init_memory_db().unwrap();
    let tx = conn.transaction().unwrap();
    assert_eq!(db::upsert_songs(&tx, &songs.records).unwrap(), 1);
    assert_eq!(db::upsert_songs(&tx, &songs.records).unwrap(), 0);
    db::save_difficulties(&tx, &difficulties.records).unwrap();
    tx.commit().unwrap();

    // unrevealed charts are excluded and flag the song for another pass
    assert_eq!(db::load_charts(&conn).unwrap().len(), 7);
    assert_eq!(db::song_ids_with_unrevealed(&conn).unwrap(), vec![id.to_string()]);
    assert!(db::song_ids_not_in(&conn, &[id.to_string()]).unwrap().is_empty());
}

fn level(song_id: &str, tier: Tier, level: i32) -> Difficulty {
    Difficulty { song_id: song_id.into(), mode: Mode::Single, tier, level }
}

#[tokio::test]
async fn test_songs_without_levels_are_crawled_again() {
    let mut conn = db::init_memory_db().unwrap();
    let song = |id: &str| Song {
        id: id.into(),
        name: id.to_uppercase(),
        artist: "A".into(),
        image_url: None,
        cover_art: None,
    };
    let tx = conn.transaction().unwrap();
    // "lost" was stored on a run whose level fetch failed
    db::upsert_songs(&tx, &[song("lost"), song("known"), song("hidden")]).unwrap();
    db::save_difficulties(
        &tx,
        &[
            level("known", Tier::Basic, 5),
            level("hidden", Tier::Basic, 6),
            level("hidden", Tier::Challenge, -1),
        ],
    )
    .unwrap();
    tx.commit().unwrap();

    assert_eq!(db::song_ids_without_difficulties(&conn).unwrap(), vec!["lost"]);
    assert!(db::load_charts(&conn).unwrap().iter().all(|c| c.song_id != "lost"));

    let ids = sync::level_crawl_ids(&conn, vec!["new".into(), "lost".into()]).unwrap();
    assert_eq!(ids, vec!["hidden", "lost", "new"]);

    // a later pass that stores the levels takes the song off the list
    let source =
        FakeSource::new().with_html(music_detail_uri("lost"), fixture("music_detail.html"));
    let crawler = Crawler::new(Arc::new(source), 2);
    let difficulties = crawler.crawl_difficulties(vec!["lost".into()]).await;
    assert!(difficulties.is_complete());
    let tx = conn.transaction().unwrap();
    db::save_difficulties(&tx, &difficulties.records).unwrap();
    tx.commit().unwrap();
    assert!(db::song_ids_without_difficulties(&conn).unwrap().is_empty());
}
