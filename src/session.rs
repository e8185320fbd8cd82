//! Session cookie storage and validity probing.

use chrono::{DateTime, Utc};
use std::sync::RwLock;

use crate::cookie::Cookie;
use crate::fetcher::{build_uri, PageRequest, PageSource};

/// Authenticated-only page used solely to test a cookie
pub const SESSION_CHECK_URI: &str = "/gate/p/mypage/index.html";

/// A persisted session for one account
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub account: String,
    pub cookie: Cookie,
}

impl Session {
    pub fn new(account: impl Into<String>, cookie: Cookie) -> Self {
        Self { account: account.into(), cookie }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.cookie.is_expired_at(now)
    }
}

/// Holds the session cookie of one logical client.
///
/// Replacing the cookie is a single assignment under the write lock, so
/// concurrent probes and requests never observe a half-written token.
#[derive(Debug, Default)]
pub struct SessionStore {
    cookie: RwLock<Option<Cookie>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cookie(&self, cookie: Cookie) {
        match self.cookie.write() {
            Ok(mut guard) => *guard = Some(cookie),
            Err(poisoned) => *poisoned.into_inner() = Some(cookie),
        }
    }

    pub fn cookie(&self) -> Option<Cookie> {
        match self.cookie.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.cookie.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Value for the `Cookie` request header
    pub fn header_value(&self) -> Option<String> {
        self.cookie().map(|c| c.header_pair())
    }

    /// Probe the authenticated-only endpoint. Any non-200 response or
    /// network failure means the session is invalid. A rotated session
    /// cookie returned by the probe replaces the stored one.
    pub async fn is_valid<S: PageSource + ?Sized>(&self, source: &S) -> bool {
        let page = match source.request(PageRequest::get(build_uri(SESSION_CHECK_URI))).await {
            Ok(page) => page,
            Err(e) => {
                log::warn!("session probe failed: {}", e);
                return false;
            }
        };
        if page.status != 200 {
            log::info!("session probe rejected with status {}", page.status);
            return false;
        }

        let current = self.cookie();
        let rotated = page
            .set_cookies
            .iter()
            .filter_map(|raw| Cookie::parse(raw))
            .find(|c| current.as_ref().map_or(true, |cur| cur.name == c.name));
        if let Some(rotated) = rotated {
            if current.as_ref().map(|c| c.to_string()) != Some(rotated.to_string()) {
                log::info!("session cookie rotated by probe");
                self.set_cookie(rotated);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ScrapeError};
    use crate::fetcher::Page;
    use async_trait::async_trait;

    struct ProbeStub {
        status: u16,
        set_cookie: Option<&'static str>,
    }

    #[async_trait]
    impl PageSource for ProbeStub {
        async fn request(&self, request: PageRequest) -> Result<Page> {
            assert_eq!(request.url(), "https://p.eagate.573.jp/gate/p/mypage/index.html");
            let mut page = Page::html(request.url(), "<html></html>");
            page.status = self.status;
            page.set_cookies = self.set_cookie.iter().map(|s| s.to_string()).collect();
            Ok(page)
        }
    }

    struct Offline;

    #[async_trait]
    impl PageSource for Offline {
        async fn request(&self, request: PageRequest) -> Result<Page> {
            Err(ScrapeError::Status { url: request.url().to_string(), status: 599 })
        }
    }

    #[test]
    fn test_set_and_get() {
        let store = SessionStore::new();
        assert!(store.cookie().is_none());
        store.set_cookie(Cookie::new("M573SSID", "abc"));
        assert_eq!(store.header_value().as_deref(), Some("M573SSID=abc"));
        store.clear();
        assert!(store.cookie().is_none());
    }

    #[tokio::test]
    async fn test_probe_rotates_cookie() {
        let store = SessionStore::new();
        store.set_cookie(Cookie::new("M573SSID", "old"));
        let stub = ProbeStub { status: 200, set_cookie: Some("M573SSID=new; Path=/") };
        assert!(store.is_valid(&stub).await);
        assert_eq!(store.cookie().unwrap().value, "new");
    }

    #[tokio::test]
    async fn test_probe_keeps_cookie_without_rotation() {
        let store = SessionStore::new();
        store.set_cookie(Cookie::new("M573SSID", "same"));
        let stub = ProbeStub { status: 200, set_cookie: None };
        assert!(store.is_valid(&stub).await);
        assert_eq!(store.cookie().unwrap().value, "same");
    }

    #[tokio::test]
    async fn test_probe_rejections() {
        let store = SessionStore::new();
        store.set_cookie(Cookie::new("M573SSID", "old"));
        let redirected = ProbeStub { status: 302, set_cookie: Some("M573SSID=new") };
        assert!(!store.is_valid(&redirected).await);
        assert!(!store.is_valid(&Offline).await);
        assert_eq!(store.cookie().unwrap().value, "old");
    }
}
