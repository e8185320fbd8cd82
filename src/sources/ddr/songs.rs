use regex::Regex;
use scraper::Html;

use crate::error::{Result, ScrapeError};
use crate::fetcher::{build_uri, fetch_page, PageSource};
use crate::helpers::{query_param, select_first, selector};
use crate::models::{Difficulty, Song};

use super::{decode_chart_index, music_data_uri, music_detail_uri};

/// Number of catalog pages announced by the pagination control
pub fn page_count_from_document(doc: &Html) -> Result<usize> {
    let paging = select_first(doc.root_element(), "div#paging_box")?;
    let pages = match paging {
        Some(paging) => paging.select(&selector("div.page_num")?).count(),
        None => 0,
    };
    Ok(pages.max(1))
}

/// Song ids linked from one catalog page, in page order
pub fn song_ids_from_document(doc: &Html) -> Result<Vec<String>> {
    let table = select_first(doc.root_element(), "table#data_tbl")?
        .ok_or_else(|| ScrapeError::shape("catalog page without data_tbl"))?;

    let mut ids: Vec<String> = Vec::new();
    for link in table.select(&selector("a[href]")?) {
        let href = link.value().attr("href").unwrap_or_default();
        if !href.contains("music_detail.html") {
            continue;
        }
        if let Some(id) = query_param(href, "index") {
            // jacket and title both link to the same song
            if !id.is_empty() && !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

fn absolute_url(src: &str) -> String {
    if src.starts_with('/') {
        build_uri(src)
    } else {
        src.to_string()
    }
}

/// Name, artist and jacket from a song detail page
pub fn song_from_document(doc: &Html, song_id: &str) -> Result<Song> {
    let info = select_first(doc.root_element(), "div#music_info")?
        .ok_or_else(|| ScrapeError::shape(format!("song {} without music_info", song_id)))?;

    let mut lines = info.text().map(str::trim).filter(|line| !line.is_empty());
    let name = lines
        .next()
        .ok_or_else(|| ScrapeError::shape(format!("song {} without a name", song_id)))?
        .to_string();
    let artist = lines.next().unwrap_or_default().to_string();

    let image_url = select_first(info, "img")?
        .and_then(|img| img.value().attr("src"))
        .map(absolute_url);

    Ok(Song { id: song_id.to_string(), name, artist, image_url, cover_art: None })
}

/// Levels of every chart listed on a song detail page.
///
/// Marker `i` describes chart index `i`. A marker whose image does not
/// carry a level is an unrevealed chart and gets level -1.
pub fn difficulties_from_document(doc: &Html, song_id: &str) -> Result<Vec<Difficulty>> {
    let level_re = Regex::new(r"songdetails_level_(\d+)\.png")
        .map_err(|e| ScrapeError::shape(e.to_string()))?;
    let img = selector("img")?;

    let mut difficulties = Vec::new();
    for (i, step) in doc.select(&selector("li.step")?).enumerate() {
        let (mode, tier) = decode_chart_index(i as u32)?;
        let level = step
            .select(&img)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| level_re.captures(src))
            .and_then(|caps| caps[1].parse::<i32>().ok())
            .unwrap_or(-1);
        difficulties.push(Difficulty { song_id: song_id.to_string(), mode, tier, level });
    }
    Ok(difficulties)
}

/// Page count and first page ids of the catalog
pub async fn load_catalog_head<S: PageSource + ?Sized>(source: &S) -> Result<(usize, Vec<String>)> {
    let page = fetch_page(source, &music_data_uri(0)).await?;
    let doc = page.document();
    Ok((page_count_from_document(&doc)?, song_ids_from_document(&doc)?))
}

pub async fn load_catalog_page<S: PageSource + ?Sized>(
    source: &S,
    page_number: usize,
) -> Result<Vec<String>> {
    let page = fetch_page(source, &music_data_uri(page_number)).await?;
    song_ids_from_document(&page.document())
}

pub async fn load_song<S: PageSource + ?Sized>(source: &S, song_id: &str) -> Result<Song> {
    let page = fetch_page(source, &music_detail_uri(song_id)).await?;
    song_from_document(&page.document(), song_id)
}

pub async fn load_difficulties<S: PageSource + ?Sized>(
    source: &S,
    song_id: &str,
) -> Result<Vec<Difficulty>> {
    let page = fetch_page(source, &music_detail_uri(song_id)).await?;
    difficulties_from_document(&page.document(), song_id)
}

/// Raw jacket image bytes
pub async fn load_cover_art<S: PageSource + ?Sized>(source: &S, url: &str) -> Result<Vec<u8>> {
    Ok(fetch_page(source, url).await?.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mode, Tier};

    #[test]
    fn test_page_count_defaults_to_one() {
        let doc = Html::parse_document("<html><body><table id=\"data_tbl\"></table></body></html>");
        assert_eq!(page_count_from_document(&doc).unwrap(), 1);
    }

    #[test]
    fn test_unrevealed_levels() {
        let doc = Html::parse_document(
            r#"<ul>
                <li class="step"><img src="/images/songdetails_level_3.png"></li>
                <li class="step"><img src="/images/songdetails_level_.png"></li>
                <li class="step"></li>
            </ul>"#,
        );
        let diffs = difficulties_from_document(&doc, "s1").unwrap();
        assert_eq!(diffs.len(), 3);
        assert_eq!(
            (diffs[0].mode, diffs[0].tier, diffs[0].level),
            (Mode::Single, Tier::Beginner, 3)
        );
        assert_eq!(diffs[1].level, -1);
        assert_eq!(diffs[2].level, -1);
    }

    #[test]
    fn test_song_without_info_is_an_error() {
        let doc = Html::parse_document("<html><body></body></html>");
        assert!(song_from_document(&doc, "x").is_err());
    }
}
