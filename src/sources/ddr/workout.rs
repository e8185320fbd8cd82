use scraper::{ElementRef, Html};

use crate::error::{Result, ScrapeError};
use crate::fetcher::{fetch_page, PageSource};
use crate::helpers::{
    element_text, parse_decimal, parse_int, parse_site_date, select_first, selector,
};
use crate::models::WorkoutEntry;

use super::workout_uri;

/// Data rows have exactly this many cells; anything else is a header or footer
const WORKOUT_ROW_CELLS: usize = 5;

fn workout_from_cells(cells: &[ElementRef], player_code: i32) -> Option<WorkoutEntry> {
    let date_text = element_text(cells[1]);
    let Some(date) = parse_site_date(&date_text) else {
        log::warn!("skipping workout row with unreadable date {:?}", date_text);
        return None;
    };
    Some(WorkoutEntry {
        date,
        play_count: parse_int(&element_text(cells[2])).unwrap_or_default(),
        kcal: parse_decimal(&element_text(cells[3])).unwrap_or_default(),
        player_code,
    })
}

pub fn workouts_from_document(doc: &Html, player_code: i32) -> Result<Vec<WorkoutEntry>> {
    let table = select_first(doc.root_element(), "table#work_out_left")?
        .ok_or_else(|| ScrapeError::shape("could not find work_out_left"))?;
    let body = select_first(table, "tbody")?
        .ok_or_else(|| ScrapeError::shape("could not find table body"))?;

    let td = selector("td")?;
    let mut entries = Vec::new();
    for row in body.select(&selector("tr")?) {
        let cells: Vec<ElementRef> = row.select(&td).collect();
        if cells.len() != WORKOUT_ROW_CELLS {
            continue;
        }
        entries.extend(workout_from_cells(&cells, player_code));
    }
    Ok(entries)
}

pub async fn load_workouts<S: PageSource + ?Sized>(
    source: &S,
    player_code: i32,
) -> Result<Vec<WorkoutEntry>> {
    log::info!("loading workout data for player code {}", player_code);
    let page = fetch_page(source, &workout_uri()).await?;
    let entries = workouts_from_document(&page.document(), player_code)?;
    log::info!("workout data loaded for player code {} ({} days)", player_code, entries.len());
    Ok(entries)
}
