//! Helper functions shared by the page extractors
//!
//! - CSS selector compilation
//! - Flattening `th`/`td` tables into label → value maps
//! - Explicit label → field mapping tables
//! - Number and timestamp parsing in the site's time zone
//!
//! # Examples
//!
//! ```
//! use eagate_scraper::helpers::{digits_only, parse_decimal};
//!
//! assert_eq!(digits_only("1,234回"), "1234");
//! assert_eq!(parse_decimal("1,234.5kcal"), Some(1234.5));
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashMap;

use crate::error::{Result, ScrapeError};

/// The portal reports every time in Japan Standard Time, which has no DST.
const SITE_TIMEZONE: FixedOffset = match FixedOffset::east_opt(9 * 3600) {
    Some(tz) => tz,
    None => panic!("invalid site offset"),
};

pub const SITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const SITE_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::shape(format!("bad selector {}: {:?}", css, e)))
}

/// First element matching `css` under `root`
pub fn select_first<'a>(root: ElementRef<'a>, css: &str) -> Result<Option<ElementRef<'a>>> {
    Ok(root.select(&selector(css)?).next())
}

pub fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Pair every non-empty `th` with the `td` that follows it.
///
/// Cells are visited in document order. A `td` resets the pending header
/// whether or not it was paired, so stray data cells never shift later
/// pairs.
pub fn table_th_td(table: ElementRef) -> Result<HashMap<String, String>> {
    if table.value().name() != "table" {
        log::warn!("attempted table flattening on <{}>", table.value().name());
        return Err(ScrapeError::shape(format!(
            "expected a table, found <{}>",
            table.value().name()
        )));
    }

    let cells = selector("th, td")?;
    let mut pairs = HashMap::new();
    let mut header = String::new();
    for cell in table.select(&cells) {
        let text = element_text(cell);
        match cell.value().name() {
            "th" => header = text,
            _ => {
                if !header.is_empty() && !text.is_empty() {
                    pairs.insert(std::mem::take(&mut header), text);
                }
                header.clear();
            }
        }
    }
    Ok(pairs)
}

/// Setter applied to one mapped label
pub type FieldSetter<T> = fn(&mut T, &str);

/// Apply every `(label, setter)` whose label is present in `data`.
/// Returns how many fields were set.
pub fn apply_fields<T>(
    target: &mut T,
    fields: &[(&str, FieldSetter<T>)],
    data: &HashMap<String, String>,
) -> usize {
    let mut applied = 0;
    for (label, setter) in fields {
        if let Some(value) = data.get(*label) {
            setter(target, value);
            applied += 1;
        }
    }
    applied
}

/// Append `suffix` to every key, as done for the per-mode profile tables
pub fn suffix_keys(data: HashMap<String, String>, suffix: &str) -> HashMap<String, String> {
    data.into_iter().map(|(k, v)| (format!("{}{}", k, suffix), v)).collect()
}

fn strip_matching(pattern: &str, s: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(s, "").into_owned(),
        Err(_) => s.to_string(),
    }
}

pub fn digits_only(s: &str) -> String {
    strip_matching(r"[^0-9]+", s)
}

/// Integer after removing every non-digit ("1,234回" → 1234)
pub fn parse_int(s: &str) -> Option<i32> {
    digits_only(s).parse().ok()
}

/// Float after removing everything but digits and dots ("1,234.5kcal" → 1234.5)
pub fn parse_decimal(s: &str) -> Option<f32> {
    strip_matching(r"[^0-9.]+", s).parse().ok()
}

pub fn site_timezone() -> FixedOffset {
    SITE_TIMEZONE
}

/// Parse a `YYYY-MM-DD hh:mm:ss` timestamp as site-local time
pub fn parse_site_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), SITE_DATETIME_FORMAT).ok()?;
    naive.and_local_timezone(site_timezone()).single()
}

pub fn parse_site_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), SITE_DATE_FORMAT).ok()
}

/// Value of a query parameter in a (possibly relative) link
pub fn query_param<'a>(href: &'a str, name: &str) -> Option<&'a str> {
    let query = href.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};
    use scraper::Html;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&selector(css).unwrap()).next().unwrap()
    }

    #[test]
    fn test_table_th_td() {
        let doc = Html::parse_document(
            r#"<table id="t">
                <tr><th>ダンサーネーム</th><td> EAGATE </td></tr>
                <tr><th>空</th><td></td></tr>
                <tr><td>orphan</td></tr>
                <tr><th>DDR-CODE</th><td>1234-5678</td></tr>
            </table>"#,
        );
        let pairs = table_th_td(first(&doc, "table#t")).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["ダンサーネーム"], "EAGATE");
        assert_eq!(pairs["DDR-CODE"], "1234-5678");
    }

    #[test]
    fn test_table_th_td_rejects_non_table() {
        let doc = Html::parse_document(r#"<div id="d"><th>a</th></div>"#);
        assert!(matches!(
            table_th_td(first(&doc, "div#d")),
            Err(ScrapeError::PageShape(_))
        ));
    }

    #[derive(Default)]
    struct Target {
        name: String,
        count: i32,
    }

    #[test]
    fn test_apply_fields() {
        let fields: &[(&str, FieldSetter<Target>)] = &[
            ("name", |t, v| t.name = v.to_string()),
            ("count", |t, v| t.count = parse_int(v).unwrap_or_default()),
            ("missing", |t, _| t.count = -1),
        ];
        let data: HashMap<String, String> =
            [("name".to_string(), "x".to_string()), ("count".to_string(), "3,210回".to_string())]
                .into();
        let mut target = Target::default();
        assert_eq!(apply_fields(&mut target, fields, &data), 2);
        assert_eq!(target.name, "x");
        assert_eq!(target.count, 3210);
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(parse_int("12345678"), Some(12345678));
        assert_eq!(parse_int("---"), None);
        assert_eq!(parse_decimal("1,234.5kcal"), Some(1234.5));
        assert_eq!(parse_decimal("kcal"), None);
    }

    #[test]
    fn test_site_time_is_fixed_offset() {
        let t = parse_site_datetime("2020-03-18 18:52:59").unwrap();
        assert_eq!(t.offset().local_minus_utc(), 9 * 3600);
        assert_eq!(t.with_timezone(&Utc).hour(), 9);
        assert!(parse_site_datetime("18/03/2020").is_none());
        assert_eq!(parse_site_date(" 2020-03-18 "), NaiveDate::from_ymd_opt(2020, 3, 18));
    }

    #[test]
    fn test_query_param() {
        let href = "/game/ddr/ddra20/p/playdata/music_detail.html?index=abc123&diff=6";
        assert_eq!(query_param(href, "index"), Some("abc123"));
        assert_eq!(query_param(href, "diff"), Some("6"));
        assert_eq!(query_param(href, "offset"), None);
        assert_eq!(query_param("no-query", "index"), None);
    }
}
