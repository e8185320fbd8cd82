#![allow(dead_code)]

use async_trait::async_trait;
use eagate_scraper::error::{Result, ScrapeError};
use eagate_scraper::fetcher::{Page, PageRequest, PageSource};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path, e))
}

/// In-memory portal: canned pages by URL, everything else is a 404.
#[derive(Default)]
pub struct FakeSource {
    pages: HashMap<String, Page>,
    broken: HashSet<String>,
    requests: Mutex<Vec<PageRequest>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, page: Page) -> Self {
        let url = url.into();
        self.pages.insert(url, page);
        self
    }

    pub fn with_html(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        let page = Page::html(url.clone(), html);
        self.with_page(url, page)
    }

    pub fn with_bytes(self, url: impl Into<String>, body: Vec<u8>) -> Self {
        let url = url.into();
        let page = Page {
            url: url.clone(),
            status: 200,
            content_type: Some("image/png".into()),
            set_cookies: Vec::new(),
            body,
        };
        self.with_page(url, page)
    }

    /// Requests to `url` keep failing with a 503
    pub fn with_broken(mut self, url: impl Into<String>) -> Self {
        self.broken.insert(url.into());
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn request(&self, request: PageRequest) -> Result<Page> {
        self.requests.lock().unwrap().push(request.clone());
        let url = request.url().to_string();
        if self.broken.contains(&url) {
            return Err(ScrapeError::Status { url, status: 503 });
        }
        Ok(self.pages.get(&url).cloned().unwrap_or_else(|| Page {
            url,
            status: 404,
            ..Page::default()
        }))
    }
}
