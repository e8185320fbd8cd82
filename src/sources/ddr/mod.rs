//! DDR A20 play data pages.
//!
//! Each submodule has a pure extractor working on a parsed document and a
//! thin async loader that fetches the page through a [`PageSource`].
//!
//! [`PageSource`]: crate::fetcher::PageSource

pub mod player;
pub mod recent;
pub mod songs;
pub mod statistics;
pub mod workout;

use crate::error::{Result, ScrapeError};
use crate::fetcher::build_uri;
use crate::models::{Mode, Tier};

const PLAYDATA_ROOT: &str = "/game/ddr/ddra20/p/playdata";

/// Tiers per mode in the site's combined chart index
pub const TIERS_PER_MODE: u32 = 5;

pub fn player_uri() -> String {
    build_uri(&format!("{}/index.html", PLAYDATA_ROOT))
}

pub fn music_data_uri(page: usize) -> String {
    build_uri(&format!(
        "{}/music_data_single.html?offset={}&filter=0&filtertype=0&sorttype=0",
        PLAYDATA_ROOT, page
    ))
}

pub fn music_detail_uri(song_id: &str) -> String {
    build_uri(&format!("{}/music_detail.html?index={}", PLAYDATA_ROOT, song_id))
}

pub fn chart_detail_uri(song_id: &str, mode: Mode, tier: Tier) -> Result<String> {
    Ok(build_uri(&format!(
        "{}/music_detail.html?index={}&diff={}",
        PLAYDATA_ROOT,
        song_id,
        chart_index(mode, tier)?
    )))
}

pub fn recent_uri() -> String {
    build_uri(&format!("{}/music_recent.html", PLAYDATA_ROOT))
}

pub fn workout_uri() -> String {
    build_uri(&format!("{}/workout.html", PLAYDATA_ROOT))
}

/// Decode the site's combined mode/tier index.
///
/// Single charts use 0..=4 for Beginner..Challenge. Double has no Beginner
/// chart, so its numbering starts one tier later: 5..=8 are
/// Basic..Challenge and the tier is `(k + 1) % 5`.
pub fn decode_chart_index(k: u32) -> Result<(Mode, Tier)> {
    let unknown = || ScrapeError::UnknownValue { kind: "chart index", value: k.to_string() };
    match k / TIERS_PER_MODE {
        0 => Ok((Mode::Single, Tier::from_index(k % TIERS_PER_MODE)?)),
        1 => {
            let tier = Tier::from_index((k + 1) % TIERS_PER_MODE)?;
            if tier == Tier::Beginner {
                return Err(unknown());
            }
            Ok((Mode::Double, tier))
        }
        _ => Err(unknown()),
    }
}

/// Inverse of [`decode_chart_index`]
pub fn chart_index(mode: Mode, tier: Tier) -> Result<u32> {
    match (mode, tier) {
        (Mode::Single, tier) => Ok(tier.index()),
        (Mode::Double, Tier::Beginner) => Err(ScrapeError::UnknownValue {
            kind: "chart",
            value: format!("{} {}", mode, tier),
        }),
        (Mode::Double, tier) => Ok(tier.index() + TIERS_PER_MODE - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_branch() {
        assert_eq!(decode_chart_index(0).unwrap(), (Mode::Single, Tier::Beginner));
        assert_eq!(decode_chart_index(2).unwrap(), (Mode::Single, Tier::Difficult));
        assert_eq!(decode_chart_index(4).unwrap(), (Mode::Single, Tier::Challenge));
    }

    #[test]
    fn test_decode_double_branch_is_offset() {
        assert_eq!(decode_chart_index(5).unwrap(), (Mode::Double, Tier::Basic));
        assert_eq!(decode_chart_index(6).unwrap(), (Mode::Double, Tier::Difficult));
        assert_eq!(decode_chart_index(7).unwrap(), (Mode::Double, Tier::Expert));
        assert_eq!(decode_chart_index(8).unwrap(), (Mode::Double, Tier::Challenge));
    }

    #[test]
    fn test_decode_out_of_range() {
        assert!(matches!(decode_chart_index(9), Err(ScrapeError::UnknownValue { .. })));
        assert!(matches!(decode_chart_index(10), Err(ScrapeError::UnknownValue { .. })));
    }

    #[test]
    fn test_chart_index_inverts_decode() {
        for k in 0..=8 {
            let (mode, tier) = decode_chart_index(k).unwrap();
            assert_eq!(chart_index(mode, tier).unwrap(), k);
        }
        assert!(chart_index(Mode::Double, Tier::Beginner).is_err());
    }

    #[test]
    fn test_uris() {
        assert_eq!(
            music_data_uri(3),
            "https://p.eagate.573.jp/game/ddr/ddra20/p/playdata/music_data_single.html?offset=3&filter=0&filtertype=0&sorttype=0"
        );
        assert_eq!(
            chart_detail_uri("abc", Mode::Double, Tier::Expert).unwrap(),
            "https://p.eagate.573.jp/game/ddr/ddra20/p/playdata/music_detail.html?index=abc&diff=7"
        );
    }
}
