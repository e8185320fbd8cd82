//! DANCERUSH STARDOM play data.
//!
//! Unlike the DDR pages this game exposes JSON through a single POST
//! endpoint selected by the `service_kind` / `pdata_kind` form fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::fetcher::{build_uri, post_form, PageSource};

const PDATA_URI: &str = "/game/dan/1st/json/pdata_getdata.html";
const CHART_KEY_PREFIX: &str = "fumen_";

// ---- wire format ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DancerInfo {
    #[serde(default)]
    pub data: DancerInfoData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DancerInfoData {
    #[serde(default)]
    pub ea_site: EaSite,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EaSite {
    #[serde(default)]
    pub profile: SiteProfile,
    #[serde(default)]
    pub statistics: SiteStatistics,
    #[serde(default, rename = "coin")]
    pub coins: SiteCoins,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteProfile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteStatistics {
    #[serde(default, rename = "play_cnt")]
    pub play_count: i32,
    #[serde(default, rename = "play_sec")]
    pub play_seconds: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteCoins {
    #[serde(default)]
    pub total: i32,
    #[serde(default)]
    pub used: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicData {
    #[serde(default)]
    pub data: MusicDataData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicDataData {
    #[serde(default)]
    pub player_data: MusicPlayerData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicPlayerData {
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub music_db: MusicDb,
    #[serde(default)]
    pub score_data: ScoreData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserId {
    #[serde(default)]
    pub code: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicDb {
    #[serde(default, rename = "music")]
    pub songs: BTreeMap<String, SongEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongEntry {
    #[serde(default)]
    pub info: SongInfo,
    #[serde(default, rename = "difficulty")]
    pub difficulties: BTreeMap<String, RawDifficulty>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongInfo {
    #[serde(default)]
    pub title_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub bpm_max: i32,
    #[serde(default)]
    pub bpm_min: i32,
    #[serde(default)]
    pub limitation_type: i32,
    #[serde(default)]
    pub genre: i32,
    #[serde(default)]
    pub play_video_flags: i32,
    #[serde(default)]
    pub license: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDifficulty {
    #[serde(default, rename = "difnum")]
    pub level: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreData {
    #[serde(default)]
    pub music: Vec<ChartRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartRecord {
    #[serde(default)]
    pub music_id: String,
    #[serde(default)]
    pub music_type: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub combo: i32,
    #[serde(default, rename = "play_cnt")]
    pub play_count: i32,
    #[serde(default)]
    pub param: i32,
    #[serde(default)]
    pub best_score_date: i64,
    #[serde(default)]
    pub last_play_date: i64,
    #[serde(default, rename = "player_1")]
    pub player1: PlayerResult,
    #[serde(default, rename = "player_2")]
    pub player2: Option<PlayerResult>,
}

/// One side of a (possibly two player) play
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PlayerResult {
    #[serde(default, alias = "player_code")]
    pub code: i32,
    #[serde(default, alias = "member_score")]
    pub score: i32,
    #[serde(default)]
    pub perfect: i32,
    #[serde(default)]
    pub great: i32,
    #[serde(default)]
    pub good: i32,
    #[serde(default)]
    pub bad: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayHist {
    #[serde(default)]
    pub data: PlayHistData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayHistData {
    #[serde(default)]
    pub player_data: PlayHistPlayerData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayHistPlayerData {
    #[serde(default)]
    pub music_history: MusicHistory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicHistory {
    #[serde(default)]
    pub music: Vec<HistoryRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub music_id: String,
    #[serde(default)]
    pub music_type: String,
    #[serde(default)]
    pub shop_name: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub combo: i32,
    #[serde(default)]
    pub param: i32,
    #[serde(default)]
    pub last_play_date: i64,
    #[serde(default, rename = "player_1")]
    pub player1: PlayerResult,
    #[serde(default, rename = "player_2")]
    pub player2: Option<PlayerResult>,
}

// ---- records ----

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum DrsMode {
    Single,
    Double,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum DrsDifficulty {
    Easy,
    Normal,
}

/// Chart keys look like `1a`: a leading `1` is a single chart, a trailing
/// `a` the normal difficulty.
pub fn parse_chart_kind(kind: &str) -> (DrsMode, DrsDifficulty) {
    let mode = if kind.starts_with('1') { DrsMode::Single } else { DrsMode::Double };
    let difficulty = if kind.ends_with('a') { DrsDifficulty::Normal } else { DrsDifficulty::Easy };
    (mode, difficulty)
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms <= 0 {
        None
    } else {
        DateTime::<Utc>::from_timestamp_millis(ms)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsPlayer {
    pub code: i32,
    pub name: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsProfileSnapshot {
    pub play_count: i32,
    pub play_seconds: i64,
    pub total_stars: i32,
    pub used_stars: i32,
    pub player_code: i32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsSong {
    pub song_id: String,
    pub name: String,
    pub artist: String,
    pub max_bpm: i32,
    pub min_bpm: i32,
    pub limitation_type: i32,
    pub genre: i32,
    pub video_flags: i32,
    pub license: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsChart {
    pub song_id: String,
    pub mode: DrsMode,
    pub difficulty: DrsDifficulty,
    pub level: i32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsSongStats {
    pub song_id: String,
    pub mode: DrsMode,
    pub difficulty: DrsDifficulty,
    pub best_score: i32,
    pub combo: i32,
    pub play_count: i32,
    pub param: i32,
    pub best_score_at: Option<DateTime<Utc>>,
    pub last_played_at: Option<DateTime<Utc>>,
    pub p1: PlayerResult,
    pub p2: Option<PlayerResult>,
    pub player_code: i32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsScore {
    pub song_id: String,
    pub mode: DrsMode,
    pub difficulty: DrsDifficulty,
    pub shop: String,
    pub score: i32,
    pub max_combo: i32,
    pub param: i32,
    pub played_at: Option<DateTime<Utc>>,
    pub p1: PlayerResult,
    pub p2: Option<PlayerResult>,
    pub player_code: i32,
}

/// Everything one account's DANCERUSH data decodes into
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DrsSnapshot {
    pub player: DrsPlayer,
    pub profile: DrsProfileSnapshot,
    pub songs: Vec<DrsSong>,
    pub charts: Vec<DrsChart>,
    pub stats: Vec<DrsSongStats>,
    pub scores: Vec<DrsScore>,
}

pub fn transform(
    dancer_info: DancerInfo,
    music_data: MusicData,
    play_hist: PlayHist,
) -> DrsSnapshot {
    let site = dancer_info.data.ea_site;
    let player_data = music_data.data.player_data;
    let player_code = player_data.user_id.code;

    let player = DrsPlayer { code: player_code, name: site.profile.name };
    let profile = DrsProfileSnapshot {
        play_count: site.statistics.play_count,
        play_seconds: site.statistics.play_seconds,
        total_stars: site.coins.total,
        used_stars: site.coins.used,
        player_code,
    };

    let mut songs = Vec::new();
    let mut charts = Vec::new();
    for (song_id, entry) in player_data.music_db.songs {
        for (key, raw) in &entry.difficulties {
            let Some(kind) = key.strip_prefix(CHART_KEY_PREFIX) else {
                log::warn!(
                    "difficulty field for {} does not have prefix, instead {}",
                    song_id,
                    key
                );
                continue;
            };
            let (mode, difficulty) = parse_chart_kind(kind);
            charts.push(DrsChart { song_id: song_id.clone(), mode, difficulty, level: raw.level });
        }
        let info = entry.info;
        songs.push(DrsSong {
            song_id,
            name: info.title_name,
            artist: info.artist_name,
            max_bpm: info.bpm_max,
            min_bpm: info.bpm_min,
            limitation_type: info.limitation_type,
            genre: info.genre,
            video_flags: info.play_video_flags,
            license: info.license,
        });
    }

    let stats = player_data
        .score_data
        .music
        .into_iter()
        .map(|chart| {
            let (mode, difficulty) = parse_chart_kind(&chart.music_type);
            DrsSongStats {
                song_id: chart.music_id,
                mode,
                difficulty,
                best_score: chart.score,
                combo: chart.combo,
                play_count: chart.play_count,
                param: chart.param,
                best_score_at: from_millis(chart.best_score_date),
                last_played_at: from_millis(chart.last_play_date),
                p1: chart.player1,
                p2: chart.player2,
                player_code,
            }
        })
        .collect();

    let scores = play_hist
        .data
        .player_data
        .music_history
        .music
        .into_iter()
        .map(|play| {
            let (mode, difficulty) = parse_chart_kind(&play.music_type);
            DrsScore {
                song_id: play.music_id,
                mode,
                difficulty,
                shop: play.shop_name,
                score: play.score,
                max_combo: play.combo,
                param: play.param,
                played_at: from_millis(play.last_play_date),
                p1: play.player1,
                p2: play.player2,
                player_code,
            }
        })
        .collect();

    DrsSnapshot { player, profile, songs, charts, stats, scores }
}

async fn load_pdata<S, T>(source: &S, kind: &str) -> Result<T>
where
    S: PageSource + ?Sized,
    T: serde::de::DeserializeOwned,
{
    let uri = build_uri(PDATA_URI);
    log::info!("retrieving {} from {}", kind, uri);
    let page = post_form(source, &uri, &[("service_kind", kind), ("pdata_kind", kind)]).await?;
    page.json()
}

pub async fn load_dancer_info<S: PageSource + ?Sized>(source: &S) -> Result<DancerInfo> {
    load_pdata(source, "dancer_info").await
}

pub async fn load_music_data<S: PageSource + ?Sized>(source: &S) -> Result<MusicData> {
    load_pdata(source, "music_data").await
}

pub async fn load_play_hist<S: PageSource + ?Sized>(source: &S) -> Result<PlayHist> {
    load_pdata(source, "play_hist").await
}

/// Load all three documents and decode them
pub async fn load_snapshot<S: PageSource + ?Sized>(source: &S) -> Result<DrsSnapshot> {
    let dancer_info = load_dancer_info(source).await?;
    let music_data = load_music_data(source).await?;
    let play_hist = load_play_hist(source).await?;
    Ok(transform(dancer_info, music_data, play_hist))
}
