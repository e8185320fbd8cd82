use scraper::Html;

use crate::error::{Result, ScrapeError};
use crate::fetcher::{fetch_page, PageSource};
use crate::helpers::{
    apply_fields, element_text, parse_int, parse_site_datetime, select_first, table_th_td,
    FieldSetter,
};
use crate::models::{Chart, ChartStatistic};

use super::chart_detail_uri;

const NO_RECORD_MARKERS: &[&str] = &["NO PLAY", "select a difficulty", "難易度を選択"];

pub const FAILED_LAMP: &str = "Failed";
pub const CLEAR_LAMP: &str = "Clear";

const STATISTIC_FIELDS: &[(&str, FieldSetter<ChartStatistic>)] = &[
    ("ハイスコア", |s, v| s.best_score = parse_int(v).unwrap_or_default()),
    ("ハイスコア時のランク", |s, v| s.rank = v.to_string()),
    ("フルコンボ種別", |s, v| s.lamp = v.to_string()),
    ("最大コンボ数", |s, v| s.max_combo = parse_int(v).unwrap_or_default()),
    ("プレー回数", |s, v| s.play_count = parse_int(v).unwrap_or_default()),
    ("クリア回数", |s, v| s.clear_count = parse_int(v).unwrap_or_default()),
    ("最終プレー時間", |s, v| s.last_played = parse_site_datetime(v)),
];

fn is_no_record(doc: &Html) -> Result<bool> {
    let text = match select_first(doc.root_element(), "div#popup_cnt")? {
        Some(popup) => element_text(popup),
        None => element_text(doc.root_element()),
    };
    Ok(NO_RECORD_MARKERS.iter().any(|marker| text.contains(marker)))
}

/// Statistics of one chart, or `None` when the account never played it.
pub fn chart_statistic_from_document(
    doc: &Html,
    chart: &Chart,
    player_code: i32,
) -> Result<Option<ChartStatistic>> {
    if is_no_record(doc)? {
        return Ok(None);
    }

    let table = select_first(doc.root_element(), "table#music_detail_table")?
        .ok_or_else(|| {
            ScrapeError::shape(format!("chart {} without music_detail_table", chart.song_id))
        })?;
    let details = table_th_td(table)?;

    let mut stat = ChartStatistic {
        song_id: chart.song_id.clone(),
        mode: chart.mode,
        tier: chart.tier,
        best_score: 0,
        lamp: String::new(),
        rank: String::new(),
        max_combo: 0,
        play_count: 0,
        clear_count: 0,
        last_played: None,
        player_code,
    };
    if apply_fields(&mut stat, STATISTIC_FIELDS, &details) == 0 {
        return Err(ScrapeError::shape(format!("chart {} has no known statistics", chart.song_id)));
    }

    // An E rank is a failed play whatever the combo label says
    if stat.rank == "E" {
        stat.lamp = FAILED_LAMP.to_string();
    } else if stat.lamp.is_empty() || stat.lamp.chars().all(|c| c == '-') {
        stat.lamp = if stat.clear_count > 0 { CLEAR_LAMP } else { FAILED_LAMP }.to_string();
    }
    Ok(Some(stat))
}

pub async fn load_chart_statistic<S: PageSource + ?Sized>(
    source: &S,
    chart: &Chart,
    player_code: i32,
) -> Result<Option<ChartStatistic>> {
    let url = chart_detail_uri(&chart.song_id, chart.mode, chart.tier)?;
    let page = fetch_page(source, &url).await?;
    chart_statistic_from_document(&page.document(), chart, player_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mode, Tier};

    fn chart() -> Chart {
        Chart { song_id: "s1".into(), mode: Mode::Single, tier: Tier::Expert }
    }

    fn detail_page(rows: &str) -> Html {
        Html::parse_document(&format!(
            "<html><body><table id=\"music_detail_table\">{}</table></body></html>",
            rows
        ))
    }

    #[test]
    fn test_no_play_is_not_an_error() {
        let doc = Html::parse_document(
            "<html><body><div id=\"popup_cnt\">NO PLAY...</div></body></html>",
        );
        assert_eq!(chart_statistic_from_document(&doc, &chart(), 1).unwrap(), None);
    }

    #[test]
    fn test_rank_e_fails_the_lamp() {
        let doc = detail_page(
            "<tr><th>ハイスコア時のランク</th><td>E</td></tr><tr><th>フルコンボ種別</th><td>グッドフルコンボ</td></tr>",
        );
        let stat = chart_statistic_from_document(&doc, &chart(), 1).unwrap().unwrap();
        assert_eq!(stat.lamp, FAILED_LAMP);
    }

    #[test]
    fn test_missing_combo_label_uses_clear_count() {
        let doc = detail_page(
            "<tr><th>ハイスコア時のランク</th><td>AA</td></tr><tr><th>フルコンボ種別</th><td>---</td></tr><tr><th>クリア回数</th><td>3</td></tr>",
        );
        let stat = chart_statistic_from_document(&doc, &chart(), 1).unwrap().unwrap();
        assert_eq!(stat.lamp, CLEAR_LAMP);
        assert_eq!(stat.clear_count, 3);
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let doc = detail_page("<tr><th>something</th><td>else</td></tr>");
        assert!(chart_statistic_from_document(&doc, &chart(), 1).is_err());
    }
}
