//! Raw `Set-Cookie` import/export.
//!
//! Sessions are persisted as the rendered `Set-Cookie` value and read back
//! with [`Cookie::parse`], so `Cookie::parse(raw).to_string()` must reproduce
//! an equivalent header value.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use std::fmt;

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const EXPIRES_LAYOUTS: &[&str] = &["%a, %d %b %Y %H:%M:%S", "%a, %d-%b-%Y %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub raw_expires: Option<String>,
    /// `Some(0)` means "delete now"; positive values are seconds to live.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub raw: String,
    /// Attributes that were present but not understood.
    pub unparsed: Vec<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            raw_expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
            raw: String::new(),
            unparsed: Vec::new(),
        }
    }

    /// Parse a raw `Set-Cookie` header value. Returns `None` for empty input,
    /// a missing `=`, an invalid name or an invalid value.
    pub fn parse(raw: &str) -> Option<Cookie> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            log::error!("attempted to parse empty raw cookie");
            return None;
        }
        let mut parts = trimmed.split(';');
        let first = parts.next()?.trim();
        let Some((name, value)) = first.split_once('=') else {
            log::error!("raw cookie {} does not contain '='", preview(raw));
            return None;
        };
        if !is_cookie_name_valid(name) {
            return None;
        }
        let Some(value) = parse_cookie_value(value, true) else {
            log::error!("failed to parse cookie value of {}", preview(raw));
            return None;
        };

        let mut cookie = Cookie::new(name, value);
        cookie.raw = raw.to_string();

        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (attr, val) = match part.split_once('=') {
                Some((a, v)) => (a, v),
                None => (part, ""),
            };
            let Some(val) = parse_cookie_value(val, false) else {
                cookie.unparsed.push(part.to_string());
                continue;
            };
            match attr.to_ascii_lowercase().as_str() {
                "samesite" => {
                    cookie.same_site = match val.to_ascii_lowercase().as_str() {
                        "lax" => Some(SameSite::Lax),
                        "strict" => Some(SameSite::Strict),
                        "none" => Some(SameSite::None),
                        _ => None,
                    };
                }
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "domain" => cookie.domain = Some(val),
                "path" => cookie.path = Some(val),
                "max-age" => match parse_max_age(&val) {
                    Some(secs) => cookie.max_age = Some(secs),
                    None => cookie.unparsed.push(part.to_string()),
                },
                "expires" => {
                    cookie.raw_expires = Some(val.clone());
                    match parse_expires(&val) {
                        Some(t) => cookie.expires = Some(t),
                        None => {
                            log::warn!("parsing expiry of {} failed: {}", preview(raw), val);
                            cookie.unparsed.push(part.to_string());
                        }
                    }
                }
                _ => cookie.unparsed.push(part.to_string()),
            }
        }

        Some(cookie)
    }

    /// `name=value` as sent in a `Cookie` request header.
    pub fn header_pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// A cookie whose `Expires` has passed is no longer usable. Cookies
    /// without an expiry are treated as expired, since they cannot be
    /// safely reused across runs.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires {
            Some(t) => t <= now,
            None => true,
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.contains(' ') || self.value.contains(',') {
            write!(f, "{}=\"{}\"", self.name, self.value)?;
        } else {
            write!(f, "{}={}", self.name, self.value)?;
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            write!(f, "; Path={}", path)?;
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            write!(f, "; Domain={}", domain.trim_start_matches('.'))?;
        }
        if let Some(expires) = self.expires.filter(|t| t.year() >= 1601) {
            write!(f, "; Expires={}", expires.format(EXPIRES_FORMAT))?;
        }
        match self.max_age {
            Some(secs) if secs > 0 => write!(f, "; Max-Age={}", secs)?,
            Some(_) => write!(f, "; Max-Age=0")?,
            None => {}
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        match self.same_site {
            Some(SameSite::Lax) => write!(f, "; SameSite=Lax")?,
            Some(SameSite::Strict) => write!(f, "; SameSite=Strict")?,
            Some(SameSite::None) => write!(f, "; SameSite=None")?,
            None => {}
        }
        Ok(())
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(9).collect()
}

fn parse_max_age(val: &str) -> Option<i64> {
    let secs: i64 = val.parse().ok()?;
    if secs != 0 && val.starts_with('0') {
        return None;
    }
    Some(secs.max(0))
}

fn parse_expires(val: &str) -> Option<DateTime<Utc>> {
    // The zone is always GMT in practice; strip it and read the rest as UTC.
    let without_zone = val.rsplit_once(' ').map(|(head, _)| head)?;
    EXPIRES_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(without_zone, layout).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_cookie_value(raw: &str, allow_double_quote: bool) -> Option<String> {
    let mut raw = raw;
    if allow_double_quote && raw.len() > 1 && raw.starts_with('"') && raw.ends_with('"') {
        raw = &raw[1..raw.len() - 1];
    }
    raw.bytes()
        .all(|b| (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\')
        .then(|| raw.to_string())
}

fn is_cookie_name_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "M573SSID=ab4d4e5a-38a3-4f23-aa9f-90cbe40419c1; Path=/; Domain=p.eagate.573.jp; Expires=Tue, 24 Mar 2020 00:35:26 GMT; HttpOnly; Secure";

    #[test]
    fn test_round_trip() {
        let cookie = Cookie::parse(SESSION).unwrap();
        assert_eq!(cookie.raw, SESSION);
        assert_eq!(cookie.to_string(), SESSION);
        assert_eq!(cookie.name, "M573SSID");
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert!(cookie.http_only && cookie.secure);
    }

    #[test]
    fn test_round_trip_all_attributes() {
        let raw = "sid=abc; Path=/gate; Domain=example.com; Expires=Wed, 01 Jan 2031 10:00:00 GMT; Max-Age=3600; HttpOnly; Secure; SameSite=Strict";
        let cookie = Cookie::parse(raw).unwrap();
        assert_eq!(cookie.max_age, Some(3600));
        assert_eq!(cookie.same_site, Some(SameSite::Strict));
        assert_eq!(cookie.to_string(), raw);
    }

    #[test]
    fn test_dashed_expires_format() {
        let cookie = Cookie::parse("a=b; Expires=Tue, 24-Mar-2020 00:35:26 GMT").unwrap();
        let expected = Utc.with_ymd_and_hms(2020, 3, 24, 0, 35, 26).unwrap();
        assert_eq!(cookie.expires, Some(expected));
        assert_eq!(cookie.to_string(), "a=b; Expires=Tue, 24 Mar 2020 00:35:26 GMT");
    }

    #[test]
    fn test_attributes_are_case_insensitive() {
        let cookie = Cookie::parse("a=b; secure; HTTPONLY; samesite=lax; max-age=0").unwrap();
        assert!(cookie.secure && cookie.http_only);
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
        assert_eq!(cookie.max_age, Some(0));
        assert_eq!(cookie.to_string(), "a=b; Max-Age=0; HttpOnly; Secure; SameSite=Lax");
    }

    #[test]
    fn test_bad_values_are_kept_unparsed() {
        let cookie = Cookie::parse("a=b; Max-Age=012; Expires=yesterday; Foo=bar").unwrap();
        assert_eq!(cookie.max_age, None);
        assert_eq!(cookie.expires, None);
        assert_eq!(cookie.unparsed.len(), 3);
    }

    #[test]
    fn test_invalid_cookies() {
        assert!(Cookie::parse("").is_none());
        assert!(Cookie::parse("novalue").is_none());
        assert!(Cookie::parse("bad name=x").is_none());
        assert!(Cookie::parse("a=b\\c").is_none());
    }

    #[test]
    fn test_quoted_value() {
        let cookie = Cookie::parse("a=\"quoted\"").unwrap();
        assert_eq!(cookie.value, "quoted");
        assert_eq!(cookie.header_pair(), "a=quoted");
    }

    #[test]
    fn test_expiry() {
        let cookie = Cookie::parse(SESSION).unwrap();
        let before = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
        assert!(!cookie.is_expired_at(before));
        assert!(cookie.is_expired_at(after));
        assert!(Cookie::new("a", "b").is_expired_at(before));
    }
}
