//! One complete crawl of one account: session, player data, catalog,
//! chart statistics, recent plays and workout history.

use chrono::Utc;
use rusqlite::Connection;
use std::fmt;
use std::sync::Arc;

use crate::auth::{Authenticator, Credentials};
use crate::client::{AccountSource, EaClient};
use crate::config::Config;
use crate::crawler::{Crawler, Partial};
use crate::db;
use crate::error::{Result, ScrapeError};
use crate::fetcher::{is_maintenance_mode, PageSource};
use crate::session::Session;
use crate::sources::ddr::{player, recent, workout};
use crate::sources::drs;

/// Counts of what one run stored
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub player_code: i32,
    pub songs_added: usize,
    pub difficulties: usize,
    pub statistics: usize,
    pub recent_scores: usize,
    pub workouts: usize,
    pub failed_items: usize,
    pub dancerush: bool,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "player {}: {} new songs, {} difficulties, {} chart statistics, \
             {} new recent scores, {} workout days, {} failed items",
            self.player_code,
            self.songs_added,
            self.difficulties,
            self.statistics,
            self.recent_scores,
            self.workouts,
            self.failed_items
        )?;
        if self.dancerush {
            write!(f, ", dancerush snapshot stored")?;
        }
        Ok(())
    }
}

fn note_partial<T>(report: &mut SyncReport, what: &str, partial: &Partial<T>) {
    if let Some(e) = partial.error() {
        log::warn!("{} incomplete: {}", what, e);
        report.failed_items += partial.failed;
    }
}

/// Reuse the stored session when it is still accepted, otherwise log in
/// again with a fresh captcha per attempt.
pub async fn ensure_session<C: AccountSource + ?Sized>(
    client: &C,
    conn: &Connection,
    config: &Config,
    authenticator: &Authenticator,
) -> Result<()> {
    let session = client.session();
    if let Some(stored) = db::load_session(conn, client.account())? {
        if stored.is_expired_at(Utc::now()) {
            log::info!("stored session for {} has expired", client.account());
        } else {
            session.set_cookie(stored.cookie);
            if session.is_valid(client).await {
                log::info!("reusing stored session for {}", client.account());
                return save_current_session(client, conn);
            }
            log::info!("stored session for {} was rejected", client.account());
        }
    }
    session.clear();

    let credentials = Credentials::new(
        client.account(),
        &config.account.password,
        config.account.otp.as_deref(),
    );
    let attempts = config.crawl.login_attempts.max(1);
    for attempt in 1..=attempts {
        match authenticator.login(client, &credentials).await {
            Ok(cookie) => {
                session.set_cookie(cookie);
                if session.is_valid(client).await {
                    return save_current_session(client, conn);
                }
                log::warn!(
                    "login attempt {}/{} returned a cookie the portal rejects",
                    attempt,
                    attempts
                );
            }
            Err(e) => log::warn!("login attempt {}/{} failed: {}", attempt, attempts, e),
        }
        session.clear();
    }
    Err(ScrapeError::Authentication(format!("login failed after {} attempts", attempts)))
}

fn save_current_session<C: AccountSource + ?Sized>(client: &C, conn: &Connection) -> Result<()> {
    let cookie = client.session().cookie().ok_or(ScrapeError::SessionExpired)?;
    db::save_session(conn, &Session::new(client.account(), cookie))?;
    Ok(())
}

/// Songs whose levels should be crawled: the new ones, stored ones that
/// have no levels yet, and stored ones with a level still hidden.
pub fn level_crawl_ids(conn: &Connection, new_ids: Vec<String>) -> Result<Vec<String>> {
    let mut ids = new_ids;
    ids.extend(db::song_ids_without_difficulties(conn)?);
    ids.extend(db::song_ids_with_unrevealed(conn)?);
    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Build the client and database from `config` and sync the account
pub async fn run(config: &Config) -> Result<SyncReport> {
    let transport = Arc::new(config.transport.create_transport()?);
    let client = Arc::new(EaClient::new(transport, &config.account.username));
    let mut conn = db::init_db(&config.database_path)?;
    sync_account(client, &mut conn, config, &Authenticator::default()).await
}

pub async fn sync_account<C: AccountSource + 'static>(
    client: Arc<C>,
    conn: &mut Connection,
    config: &Config,
    authenticator: &Authenticator,
) -> Result<SyncReport> {
    if is_maintenance_mode(client.as_ref()).await {
        log::warn!("portal is in maintenance mode, nothing to do");
        return Err(ScrapeError::Maintenance);
    }
    ensure_session(client.as_ref(), conn, config, authenticator).await?;

    let mut report = SyncReport::default();

    let (profile, play_count) =
        player::load_player_information(client.as_ref(), client.account()).await?;
    db::save_profile(conn, &profile)?;
    db::save_play_count(conn, &play_count)?;
    report.player_code = profile.code;

    let source: Arc<dyn PageSource> = client.clone();
    let crawler = Crawler::new(source, config.crawl.workers);

    let ids = crawler.crawl_song_ids().await?;
    note_partial(&mut report, "song id crawl", &ids);
    let new_ids = db::song_ids_not_in(conn, &ids.records)?;
    log::info!("{} of {} songs are new", new_ids.len(), ids.records.len());

    let songs = crawler.crawl_song_data(new_ids.clone(), config.crawl.fetch_cover_art).await;
    note_partial(&mut report, "song data crawl", &songs);

    let level_ids = level_crawl_ids(conn, new_ids)?;
    let difficulties = crawler.crawl_difficulties(level_ids).await;
    note_partial(&mut report, "difficulty crawl", &difficulties);

    {
        let tx = conn.transaction()?;
        report.songs_added = db::upsert_songs(&tx, &songs.records)?;
        db::save_difficulties(&tx, &difficulties.records)?;
        tx.commit()?;
    }
    report.difficulties = difficulties.records.len();

    let charts = db::load_charts(conn)?;
    let stats = crawler.crawl_chart_statistics(charts, profile.code).await;
    note_partial(&mut report, "chart statistics crawl", &stats);
    {
        let tx = conn.transaction()?;
        db::save_chart_statistics(&tx, &stats.records)?;
        tx.commit()?;
    }
    report.statistics = stats.records.len();

    match recent::load_recent_scores(client.as_ref(), profile.code).await {
        Ok(scores) => {
            let tx = conn.transaction()?;
            report.recent_scores = db::save_recent_scores(&tx, &scores)?;
            tx.commit()?;
        }
        Err(e) => {
            log::error!("failed recent scores for {}: {}", client.account(), e);
            report.failed_items += 1;
        }
    }

    match workout::load_workouts(client.as_ref(), profile.code).await {
        Ok(entries) => {
            let tx = conn.transaction()?;
            db::save_workouts(&tx, &entries)?;
            tx.commit()?;
            report.workouts = entries.len();
        }
        Err(e) => {
            log::error!("failed workout data for {}: {}", client.account(), e);
            report.failed_items += 1;
        }
    }

    if config.crawl.dancerush {
        match drs::load_snapshot(client.as_ref()).await {
            Ok(snapshot) => {
                db::save_drs_snapshot(conn, &snapshot, Utc::now())?;
                report.dancerush = true;
            }
            Err(e) => {
                log::error!("failed dancerush data for {}: {}", client.account(), e);
                report.failed_items += 1;
            }
        }
    }

    save_current_session(client.as_ref(), conn)?;
    log::info!("sync finished for {}: {}", client.account(), report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = SyncReport {
            player_code: 12345678,
            songs_added: 2,
            difficulties: 18,
            statistics: 5,
            recent_scores: 3,
            workouts: 1,
            failed_items: 0,
            dancerush: true,
        };
        let text = report.to_string();
        assert!(text.starts_with("player 12345678: 2 new songs"));
        assert!(text.ends_with("dancerush snapshot stored"));
    }
}
