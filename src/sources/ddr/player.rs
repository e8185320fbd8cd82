use scraper::{ElementRef, Html};
use std::collections::HashMap;

use crate::error::{Result, ScrapeError};
use crate::fetcher::{fetch_page, PageSource};
use crate::helpers::{
    apply_fields, parse_int, parse_site_datetime, select_first, suffix_keys, table_th_td,
    FieldSetter,
};
use crate::models::{PlayCountSummary, PlayerProfile};

use super::player_uri;

const PROFILE_FIELDS: &[(&str, FieldSetter<PlayerProfile>)] = &[
    ("ダンサーネーム", |p, v| p.name = v.to_string()),
    ("DDR-CODE", |p, v| p.code = parse_int(v).unwrap_or_default()),
    ("所属都道府県", |p, v| p.prefecture = v.to_string()),
    ("所属クラス", |p, v| p.affiliation = v.to_string()),
    ("段位_single", |p, v| p.single_rank = v.to_string()),
    ("段位_double", |p, v| p.double_rank = v.to_string()),
];

const PLAY_COUNT_FIELDS: &[(&str, FieldSetter<PlayCountSummary>)] = &[
    ("DDR-CODE", |p, v| p.player_code = parse_int(v).unwrap_or_default()),
    ("総プレー回数", |p, v| p.play_count = parse_int(v).unwrap_or_default()),
    ("最終プレー日時", |p, v| p.last_play = parse_site_datetime(v)),
    ("プレー回数_single", |p, v| p.single_play_count = parse_int(v).unwrap_or_default()),
    ("最終プレー日時_single", |p, v| p.single_last_play = parse_site_datetime(v)),
    ("プレー回数_double", |p, v| p.double_play_count = parse_int(v).unwrap_or_default()),
    ("最終プレー日時_double", |p, v| p.double_last_play = parse_site_datetime(v)),
];

/// Flatten the overall status table and the per-mode tables into one map.
/// Per-mode labels get a `_single` / `_double` suffix.
fn player_details(doc: &Html) -> Result<HashMap<String, String>> {
    let root = doc.root_element();
    let block = |css: &str| -> Result<ElementRef> {
        select_first(root, css)?
            .ok_or_else(|| ScrapeError::shape(format!("player page without {}", css)))
    };

    let mut details = table_th_td(block("div#sougou table#status")?)?;
    details.extend(suffix_keys(table_th_td(block("div#single table.small_table")?)?, "_single"));
    details.extend(suffix_keys(table_th_td(block("div#double table.small_table")?)?, "_double"));
    Ok(details)
}

pub fn player_profile_from_document(doc: &Html) -> Result<PlayerProfile> {
    let details = player_details(doc)?;
    let mut profile = PlayerProfile::default();
    apply_fields(&mut profile, PROFILE_FIELDS, &details);
    if profile.code == 0 {
        return Err(ScrapeError::shape("player page without a dancer code"));
    }
    Ok(profile)
}

pub fn play_count_from_document(doc: &Html) -> Result<PlayCountSummary> {
    let details = player_details(doc)?;
    let mut summary = PlayCountSummary::default();
    apply_fields(&mut summary, PLAY_COUNT_FIELDS, &details);
    if summary.player_code == 0 {
        return Err(ScrapeError::shape("player page without a dancer code"));
    }
    Ok(summary)
}

/// Profile and play counts of the logged in account
pub async fn load_player_information<S: PageSource + ?Sized>(
    source: &S,
    account: &str,
) -> Result<(PlayerProfile, PlayCountSummary)> {
    log::info!("loading player information for user {}", account);
    let page = fetch_page(source, &player_uri()).await.map_err(|e| {
        log::error!("failed to load player information for user {}: {}", account, e);
        e
    })?;

    let doc = page.document();
    let mut profile = player_profile_from_document(&doc)?;
    let summary = play_count_from_document(&doc)?;
    profile.eagate_account = Some(account.to_string());

    log::info!(
        "loaded player information for {}, dancer code {}, play count {}",
        account,
        profile.code,
        summary.play_count
    );
    Ok((profile, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div id="sougou"><table id="status">
            <tr><th>ダンサーネーム</th><td>TESTER</td></tr>
            <tr><th>DDR-CODE</th><td>8765-4321</td></tr>
            <tr><th>総プレー回数</th><td>12回</td></tr>
        </table></div>
        <div id="single"><table class="small_table"><tr><th>段位</th><td>初段</td></tr></table></div>
        <div id="double"><table class="small_table"><tr><th>段位</th><td>二段</td></tr></table></div>
    </body></html>"#;

    #[test]
    fn test_suffixed_ranks() {
        let doc = Html::parse_document(PAGE);
        let profile = player_profile_from_document(&doc).unwrap();
        assert_eq!(profile.code, 87654321);
        assert_eq!(profile.single_rank, "初段");
        assert_eq!(profile.double_rank, "二段");
        let summary = play_count_from_document(&doc).unwrap();
        assert_eq!(summary.play_count, 12);
        assert_eq!(summary.player_code, 87654321);
        assert!(summary.last_play.is_none());
    }

    #[test]
    fn test_missing_block_is_an_error() {
        let doc = Html::parse_document("<html><body><div id=\"sougou\"></div></body></html>");
        assert!(matches!(
            player_profile_from_document(&doc),
            Err(ScrapeError::PageShape(_))
        ));
    }
}
