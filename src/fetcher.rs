//! Page fetching: requests, responses and body decoding.

use async_trait::async_trait;
use scraper::Html;
use serde::de::DeserializeOwned;

use crate::error::{Result, ScrapeError};

pub const EAGATE_HOST: &str = "https://p.eagate.573.jp";

const MAINTENANCE_URI: &str = "/game/";
const MAINTENANCE_MARKER: &str = "メンテナンス期間";

/// Build an absolute URL on the portal host from a resource path
pub fn build_uri(resource: &str) -> String {
    format!("{}{}", EAGATE_HOST, resource)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Get { url: String },
    PostForm { url: String, form: Vec<(String, String)> },
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        PageRequest::Get { url: url.into() }
    }

    pub fn post_form(url: impl Into<String>, form: &[(&str, &str)]) -> Self {
        PageRequest::PostForm {
            url: url.into(),
            form: form.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PageRequest::Get { url } | PageRequest::PostForm { url, .. } => url,
        }
    }

    pub fn is_idempotent(&self) -> bool {
        matches!(self, PageRequest::Get { .. })
    }
}

/// A fully read response.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub set_cookies: Vec<String>,
    pub body: Vec<u8>,
}

impl Page {
    /// An HTML page served as UTF-8, used by tests and fakes
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Page {
            url: url.into(),
            status: 200,
            content_type: Some("text/html; charset=UTF-8".to_string()),
            set_cookies: Vec::new(),
            body: body.into().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ScrapeError::Status { url: self.url, status: self.status })
        }
    }

    /// Whether the declared content type names the legacy Japanese encoding
    pub fn is_shift_jis(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("windows-31j") || ct.contains("shift_jis") || ct.contains("shift-jis")
        })
    }

    /// Body as UTF-8 text, transcoded from Windows-31J when declared
    pub fn text(&self) -> String {
        if self.is_shift_jis() {
            let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(&self.body);
            if had_errors {
                log::warn!("malformed Shift_JIS sequences in {}", self.url);
            }
            decoded.into_owned()
        } else {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.text())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text())?)
    }
}

/// Anything that can execute a request on behalf of a session.
///
/// `EaClient` is the production implementation; tests substitute fakes.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn request(&self, request: PageRequest) -> Result<Page>;
}

/// Authenticated GET that fails on a non-success status
pub async fn fetch_page<S: PageSource + ?Sized>(source: &S, url: &str) -> Result<Page> {
    log::debug!("retrieving resource {}", url);
    let page = source.request(PageRequest::get(url)).await.map_err(|e| {
        log::error!("failed to get resource {}: {}", url, e);
        e
    })?;
    page.ensure_success()
}

/// Form POST that fails on a non-success status
pub async fn post_form<S: PageSource + ?Sized>(
    source: &S,
    url: &str,
    form: &[(&str, &str)],
) -> Result<Page> {
    log::debug!("posting to resource {}", url);
    source.request(PageRequest::post_form(url, form)).await?.ensure_success()
}

/// The portal shows a maintenance notice instead of game pages during
/// scheduled downtime. A failed check is treated as maintenance.
pub async fn is_maintenance_mode<S: PageSource + ?Sized>(source: &S) -> bool {
    match fetch_page(source, &build_uri(MAINTENANCE_URI)).await {
        Ok(page) => page.text().contains(MAINTENANCE_MARKER),
        Err(e) => {
            log::warn!("failed to get page content for maintenance check: {}", e);
            true
        }
    }
}
