//! Fan-out crawls over catalog pages, songs and charts.
//!
//! Items go into one shared queue drained by a fixed number of workers.
//! Every outcome is sent over a channel to a single collector, so a failed
//! item is counted and never cancels its siblings. Outbound pacing is still
//! the transport's rate limiter; the pool only bounds how many requests and
//! parsed pages exist at once.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::error::{Result, ScrapeError};
use crate::fetcher::PageSource;
use crate::models::{Chart, ChartStatistic, Difficulty, Song};
use crate::sources::ddr::{songs, statistics};

pub const DEFAULT_WORKERS: usize = 16;

/// Records of a crawl together with how many items failed.
///
/// The records are usable even when `failed > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Partial<T> {
    pub records: Vec<T>,
    pub failed: usize,
    pub total: usize,
}

impl<T> Partial<T> {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// `PartialCrawl` summary when anything failed
    pub fn error(&self) -> Option<ScrapeError> {
        if self.failed > 0 {
            Some(ScrapeError::PartialCrawl { failed: self.failed, total: self.total })
        } else {
            None
        }
    }
}

/// Run `task` for every item on `workers` concurrent workers.
///
/// Each task yields zero or more records. All items are attempted.
pub async fn run_pool<I, T, F, Fut>(items: Vec<I>, workers: usize, task: F) -> Partial<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Partial { records: Vec::new(), failed: 0, total };
    }

    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let task = Arc::new(task);
    let workers = workers.clamp(1, total);
    let (tx, mut rx) = mpsc::channel::<Result<Vec<T>>>(workers * 2);

    let mut pool = JoinSet::new();
    for _ in 0..workers {
        let queue = queue.clone();
        let task = task.clone();
        let tx = tx.clone();
        pool.spawn(async move {
            loop {
                let next = queue.lock().await.pop_front();
                let Some(item) = next else { break };
                let outcome = task(item).await;
                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut records = Vec::new();
    let mut received = 0;
    let mut failed = 0;
    while let Some(outcome) = rx.recv().await {
        received += 1;
        match outcome {
            Ok(batch) => records.extend(batch),
            Err(e) => {
                log::error!("crawl item failed: {}", e);
                failed += 1;
            }
        }
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            log::error!("crawl worker aborted: {}", e);
        }
    }
    // items lost with a panicked worker count as failures
    failed += total - received;

    Partial { records, failed, total }
}

/// Crawls one account's pages through a shared [`PageSource`].
#[derive(Clone)]
pub struct Crawler {
    source: Arc<dyn PageSource>,
    workers: usize,
}

impl Crawler {
    pub fn new(source: Arc<dyn PageSource>, workers: usize) -> Self {
        Self { source, workers: workers.max(1) }
    }

    /// Every song id in the catalog.
    ///
    /// Page 0 yields the page count; failing to load it fails the crawl.
    /// Later pages are crawled concurrently and counted in the summary.
    pub async fn crawl_song_ids(&self) -> Result<Partial<String>> {
        let (pages, first_ids) = songs::load_catalog_head(self.source.as_ref()).await?;
        log::info!("song catalog has {} pages", pages);

        let source = self.source.clone();
        let rest = run_pool((1..pages).collect(), self.workers, move |page| {
            let source = source.clone();
            async move { songs::load_catalog_page(source.as_ref(), page).await }
        })
        .await;

        let mut seen = HashSet::new();
        let records: Vec<String> = first_ids
            .into_iter()
            .chain(rest.records)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        log::info!("found {} song ids ({}/{} pages failed)", records.len(), rest.failed, pages);
        Ok(Partial { records, failed: rest.failed, total: pages })
    }

    /// Song details for each id; jackets are downloaded when `fetch_cover_art`
    pub async fn crawl_song_data(&self, ids: Vec<String>, fetch_cover_art: bool) -> Partial<Song> {
        log::info!("loading song data for {} songs", ids.len());
        let source = self.source.clone();
        run_pool(ids, self.workers, move |id| {
            let source = source.clone();
            async move {
                let mut song = songs::load_song(source.as_ref(), &id).await?;
                if fetch_cover_art {
                    if let Some(url) = song.image_url.clone() {
                        song.cover_art = Some(songs::load_cover_art(source.as_ref(), &url).await?);
                    }
                }
                Ok(vec![song])
            }
        })
        .await
    }

    pub async fn crawl_difficulties(&self, ids: Vec<String>) -> Partial<Difficulty> {
        log::info!("loading difficulties for {} songs", ids.len());
        let source = self.source.clone();
        run_pool(ids, self.workers, move |id| {
            let source = source.clone();
            async move { songs::load_difficulties(source.as_ref(), &id).await }
        })
        .await
    }

    /// Statistics of each chart; charts never played yield no record
    pub async fn crawl_chart_statistics(
        &self,
        charts: Vec<Chart>,
        player_code: i32,
    ) -> Partial<ChartStatistic> {
        log::info!("loading statistics for player code {} ({} charts)", player_code, charts.len());
        let source = self.source.clone();
        let partial = run_pool(charts, self.workers, move |chart| {
            let source = source.clone();
            async move {
                let stat =
                    statistics::load_chart_statistic(source.as_ref(), &chart, player_code).await?;
                Ok(stat.into_iter().collect())
            }
        })
        .await;
        if partial.failed > 0 {
            log::error!(
                "failed loading chart statistics for player code {}: {}/{} charts",
                player_code,
                partial.failed,
                partial.total
            );
        }
        partial
    }
}
