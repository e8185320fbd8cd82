use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Transaction};
use std::collections::HashSet;

use crate::cookie::Cookie;
use crate::models::{
    Chart, ChartStatistic, Difficulty, PlayCountSummary, PlayerProfile, RecentScore, Song,
    WorkoutEntry,
};
use crate::session::Session;
use crate::sources::drs::DrsSnapshot;

pub fn init_db(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    create_tables(&conn)?;
    Ok(conn)
}

pub fn init_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    log::info!("Creating tables if not exists...");

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            account TEXT PRIMARY KEY,
            cookie TEXT NOT NULL,
            expires TEXT
        );

        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            artist TEXT NOT NULL,
            image_url TEXT,
            cover_art BLOB
        );

        CREATE TABLE IF NOT EXISTS difficulties (
            song_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            tier TEXT NOT NULL,
            level INTEGER NOT NULL,
            PRIMARY KEY (song_id, mode, tier),
            FOREIGN KEY (song_id) REFERENCES songs (id)
        );

        CREATE TABLE IF NOT EXISTS players (
            code INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            prefecture TEXT NOT NULL,
            affiliation TEXT NOT NULL,
            single_rank TEXT NOT NULL,
            double_rank TEXT NOT NULL,
            eagate_account TEXT
        );

        CREATE TABLE IF NOT EXISTS play_counts (
            player_code INTEGER NOT NULL,
            play_count INTEGER NOT NULL,
            last_play TEXT,
            single_play_count INTEGER NOT NULL,
            single_last_play TEXT,
            double_play_count INTEGER NOT NULL,
            double_last_play TEXT,
            PRIMARY KEY (player_code, play_count)
        );

        CREATE TABLE IF NOT EXISTS chart_statistics (
            song_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            tier TEXT NOT NULL,
            player_code INTEGER NOT NULL,
            best_score INTEGER NOT NULL,
            lamp TEXT NOT NULL,
            rank TEXT NOT NULL,
            max_combo INTEGER NOT NULL,
            play_count INTEGER NOT NULL,
            clear_count INTEGER NOT NULL,
            last_played TEXT,
            PRIMARY KEY (song_id, mode, tier, player_code)
        );

        CREATE TABLE IF NOT EXISTS recent_scores (
            song_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            tier TEXT NOT NULL,
            player_code INTEGER NOT NULL,
            score INTEGER NOT NULL,
            cleared BOOLEAN NOT NULL,
            played_at TEXT NOT NULL,
            PRIMARY KEY (player_code, played_at, song_id, mode, tier)
        );

        CREATE TABLE IF NOT EXISTS workouts (
            player_code INTEGER NOT NULL,
            date TEXT NOT NULL,
            play_count INTEGER NOT NULL,
            kcal REAL NOT NULL,
            PRIMARY KEY (player_code, date)
        );

        CREATE TABLE IF NOT EXISTS drs_snapshots (
            player_code INTEGER NOT NULL,
            taken_at TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            PRIMARY KEY (player_code, taken_at)
        );

        CREATE INDEX IF NOT EXISTS idx_stats_player ON chart_statistics(player_code);",
    )?;

    log::info!("Tables ensured.");
    Ok(())
}

fn ts(t: &Option<DateTime<FixedOffset>>) -> Option<String> {
    t.map(|t| t.to_rfc3339())
}

// ---- sessions ----

pub fn load_session(conn: &Connection, account: &str) -> Result<Option<Session>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT cookie FROM sessions WHERE account = ?1",
            params![account],
            |row| row.get(0),
        )
        .optional()?;

    let Some(raw) = raw else { return Ok(None) };
    let Some(cookie) = Cookie::parse(&raw) else {
        log::warn!("discarding unparseable stored cookie for {}", account);
        return Ok(None);
    };
    Ok(Some(Session::new(account, cookie)))
}

pub fn save_session(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sessions (account, cookie, expires) VALUES (?1, ?2, ?3)",
        params![
            session.account,
            session.cookie.to_string(),
            session.cookie.expires.map(|e| e.to_rfc3339())
        ],
    )?;
    Ok(())
}

// ---- songs ----

/// Insert songs that are not stored yet; known ids are left untouched
pub fn upsert_songs(tx: &Transaction, songs: &[Song]) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO songs (id, name, artist, image_url, cover_art) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut inserted = 0;
    for song in songs {
        inserted += stmt.execute(params![
            song.id,
            song.name,
            song.artist,
            song.image_url,
            song.cover_art
        ])?;
    }
    Ok(inserted)
}

pub fn load_song_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM songs ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let ids = rows.collect::<Result<Vec<String>>>()?;
    Ok(ids)
}

/// Ids from `ids` that are not stored yet
pub fn song_ids_not_in(conn: &Connection, ids: &[String]) -> Result<Vec<String>> {
    let known: HashSet<String> = load_song_ids(conn)?.into_iter().collect();
    Ok(ids.iter().filter(|id| !known.contains(*id)).cloned().collect())
}

/// Levels may be revealed later, so stored rows are replaced
pub fn save_difficulties(tx: &Transaction, difficulties: &[Difficulty]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO difficulties (song_id, mode, tier, level) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for d in difficulties {
        stmt.execute(params![d.song_id, d.mode.as_str(), d.tier.as_str(), d.level])?;
    }
    Ok(())
}

/// Songs with at least one chart whose level is still hidden
pub fn song_ids_with_unrevealed(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT song_id FROM difficulties WHERE level < 0 ORDER BY song_id",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let ids = rows.collect::<Result<Vec<String>>>()?;
    Ok(ids)
}

/// Stored songs that have no difficulty rows at all
pub fn song_ids_without_difficulties(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM songs WHERE id NOT IN (SELECT song_id FROM difficulties) ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let ids = rows.collect::<Result<Vec<String>>>()?;
    Ok(ids)
}

/// Every chart with a revealed level
pub fn load_charts(conn: &Connection) -> Result<Vec<Chart>> {
    let mut stmt = conn.prepare(
        "SELECT song_id, mode, tier FROM difficulties WHERE level > 0 ORDER BY song_id, mode, tier",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;

    let mut charts = Vec::new();
    for row in rows {
        let (song_id, mode, tier) = row?;
        match (mode.parse(), tier.parse()) {
            (Ok(mode), Ok(tier)) => charts.push(Chart { song_id, mode, tier }),
            _ => log::warn!("skipping stored chart {} {} {}", song_id, mode, tier),
        }
    }
    Ok(charts)
}

// ---- player data ----

pub fn save_profile(conn: &Connection, profile: &PlayerProfile) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO players (code, name, prefecture, affiliation, single_rank, double_rank, eagate_account)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            profile.code,
            profile.name,
            profile.prefecture,
            profile.affiliation,
            profile.single_rank,
            profile.double_rank,
            profile.eagate_account
        ],
    )?;
    Ok(())
}

/// Play counts only grow, so one row per distinct total is kept as history
pub fn save_play_count(conn: &Connection, summary: &PlayCountSummary) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO play_counts
            (player_code, play_count, last_play, single_play_count, single_last_play, double_play_count, double_last_play)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            summary.player_code,
            summary.play_count,
            ts(&summary.last_play),
            summary.single_play_count,
            ts(&summary.single_last_play),
            summary.double_play_count,
            ts(&summary.double_last_play)
        ],
    )?;
    Ok(())
}

pub fn save_chart_statistics(tx: &Transaction, stats: &[ChartStatistic]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO chart_statistics
            (song_id, mode, tier, player_code, best_score, lamp, rank, max_combo, play_count, clear_count, last_played)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for s in stats {
        stmt.execute(params![
            s.song_id,
            s.mode.as_str(),
            s.tier.as_str(),
            s.player_code,
            s.best_score,
            s.lamp,
            s.rank,
            s.max_combo,
            s.play_count,
            s.clear_count,
            ts(&s.last_played)
        ])?;
    }
    Ok(())
}

/// Scores without a timestamp cannot be told apart and are skipped
pub fn save_recent_scores(tx: &Transaction, scores: &[RecentScore]) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO recent_scores (song_id, mode, tier, player_code, score, cleared, played_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut inserted = 0;
    for s in scores {
        let Some(played_at) = ts(&s.played_at) else { continue };
        inserted += stmt.execute(params![
            s.song_id,
            s.mode.as_str(),
            s.tier.as_str(),
            s.player_code,
            s.score,
            s.cleared,
            played_at
        ])?;
    }
    Ok(inserted)
}

pub fn save_workouts(tx: &Transaction, entries: &[WorkoutEntry]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO workouts (player_code, date, play_count, kcal) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for w in entries {
        stmt.execute(params![w.player_code, w.date.to_string(), w.play_count, w.kcal as f64])?;
    }
    Ok(())
}

pub fn save_drs_snapshot(
    conn: &Connection,
    snapshot: &DrsSnapshot,
    taken_at: DateTime<Utc>,
) -> Result<()> {
    let json = serde_json::to_string(snapshot)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT OR REPLACE INTO drs_snapshots (player_code, taken_at, snapshot) VALUES (?1, ?2, ?3)",
        params![snapshot.player.code, taken_at.to_rfc3339(), json],
    )?;
    Ok(())
}
