use scraper::Html;

use crate::error::{Result, ScrapeError};
use crate::fetcher::{fetch_page, PageSource};
use crate::helpers::{
    element_text, parse_int, parse_site_datetime, query_param, select_first, selector,
};
use crate::models::RecentScore;

use super::{decode_chart_index, recent_uri};

/// The site keeps this many recent plays
pub const MAX_RECENT_SCORES: usize = 50;

const FAILED_RANK_IMAGE: &str = "rank_s_e";

/// Recent plays, most recent first
pub fn recent_scores_from_document(doc: &Html, player_code: i32) -> Result<Vec<RecentScore>> {
    let table = select_first(doc.root_element(), "table#data_tbl")?
        .ok_or_else(|| ScrapeError::shape("could not find data_tbl"))?;
    let body = select_first(table, "tbody")?
        .ok_or_else(|| ScrapeError::shape("could not find table body"))?;

    let td = selector("td")?;
    let mut scores = Vec::new();
    for row in body.select(&selector("tr")?) {
        if row.select(&td).next().is_none() {
            continue;
        }
        if scores.len() == MAX_RECENT_SCORES {
            break;
        }

        let href = select_first(row, "a.music_info.cboxelement")?
            .and_then(|link| link.value().attr("href"))
            .ok_or_else(|| ScrapeError::shape("recent score row without a song link"))?;
        let song_id = query_param(href, "index")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ScrapeError::shape(format!("song link without an id: {}", href)))?;
        let diff = query_param(href, "diff")
            .and_then(|d| d.parse::<u32>().ok())
            .ok_or_else(|| {
                ScrapeError::shape(format!("song link without a chart index: {}", href))
            })?;
        let (mode, tier) = decode_chart_index(diff)?;

        let score = select_first(row, "td.score")?
            .and_then(|cell| parse_int(&element_text(cell)))
            .unwrap_or_default();
        let played_at = select_first(row, "td.date")?
            .and_then(|cell| parse_site_datetime(&element_text(cell)));
        let cleared = select_first(row, "td.rank img")?
            .and_then(|img| img.value().attr("src"))
            .map_or(false, |src| !src.contains(FAILED_RANK_IMAGE));

        scores.push(RecentScore {
            song_id: song_id.to_string(),
            mode,
            tier,
            score,
            cleared,
            played_at,
            player_code,
        });
    }
    Ok(scores)
}

pub async fn load_recent_scores<S: PageSource + ?Sized>(
    source: &S,
    player_code: i32,
) -> Result<Vec<RecentScore>> {
    log::info!("loading recent scores for player code {}", player_code);
    let page = fetch_page(source, &recent_uri()).await?;
    let scores = recent_scores_from_document(&page.document(), player_code)?;
    log::info!("recent scores loaded for player code {} ({} scores)", player_code, scores.len());
    Ok(scores)
}
