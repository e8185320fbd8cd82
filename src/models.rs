use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScrapeError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Single,
    Double,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Single, Mode::Double];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Single => "SINGLE",
            Mode::Double => "DOUBLE",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SINGLE" => Ok(Mode::Single),
            "DOUBLE" => Ok(Mode::Double),
            _ => Err(ScrapeError::UnknownValue { kind: "mode", value: s.to_string() }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Beginner,
    Basic,
    Difficult,
    Expert,
    Challenge,
}

impl Tier {
    pub const ALL: [Tier; 5] =
        [Tier::Beginner, Tier::Basic, Tier::Difficult, Tier::Expert, Tier::Challenge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Beginner => "BEGINNER",
            Tier::Basic => "BASIC",
            Tier::Difficult => "DIFFICULT",
            Tier::Expert => "EXPERT",
            Tier::Challenge => "CHALLENGE",
        }
    }

    pub fn index(&self) -> u32 {
        *self as u32
    }

    pub fn from_index(index: u32) -> Result<Self, ScrapeError> {
        Tier::ALL
            .get(index as usize)
            .copied()
            .ok_or(ScrapeError::UnknownValue { kind: "difficulty", value: index.to_string() })
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or(ScrapeError::UnknownValue { kind: "difficulty", value: s.to_string() })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Song {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub image_url: Option<String>,
    #[serde(skip)]
    pub cover_art: Option<Vec<u8>>,
}

/// Level -1 marks a tier the site has not revealed yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Difficulty {
    pub song_id: String,
    pub mode: Mode,
    pub tier: Tier,
    pub level: i32,
}

/// One playable (song, mode, tier) unit
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Chart {
    pub song_id: String,
    pub mode: Mode,
    pub tier: Tier,
}

impl From<&Difficulty> for Chart {
    fn from(d: &Difficulty) -> Self {
        Chart { song_id: d.song_id.clone(), mode: d.mode, tier: d.tier }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PlayerProfile {
    pub name: String,
    pub code: i32,
    pub prefecture: String,
    pub affiliation: String,
    pub single_rank: String,
    pub double_rank: String,
    pub eagate_account: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PlayCountSummary {
    pub player_code: i32,
    pub play_count: i32,
    pub last_play: Option<DateTime<FixedOffset>>,
    pub single_play_count: i32,
    pub single_last_play: Option<DateTime<FixedOffset>>,
    pub double_play_count: i32,
    pub double_last_play: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChartStatistic {
    pub song_id: String,
    pub mode: Mode,
    pub tier: Tier,
    pub best_score: i32,
    pub lamp: String,
    pub rank: String,
    pub max_combo: i32,
    pub play_count: i32,
    pub clear_count: i32,
    pub last_played: Option<DateTime<FixedOffset>>,
    pub player_code: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecentScore {
    pub song_id: String,
    pub mode: Mode,
    pub tier: Tier,
    pub score: i32,
    pub cleared: bool,
    pub played_at: Option<DateTime<FixedOffset>>,
    pub player_code: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WorkoutEntry {
    pub date: NaiveDate,
    pub play_count: i32,
    pub kcal: f32,
    pub player_code: i32,
}
