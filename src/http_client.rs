use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, ClientBuilder};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::TransportConfig;
use crate::error::{is_retryable_status, Result, ScrapeError};
use crate::fetcher::{Page, PageRequest};

/// User agents; one is picked per transport so a session keeps a stable identity
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// HTTP transport that admits every request through one shared token bucket.
///
/// The limiter is the only bound on outbound traffic: concurrent callers
/// wait in `until_ready` and are released at the configured rate, so the
/// burst must stay conservative. Redirects are never followed because the
/// login and session probe need to see the raw 302 and its `Set-Cookie`.
pub struct RateLimitedTransport {
    client: Client,
    limiter: DefaultDirectRateLimiter,
    config: TransportConfig,
}

impl RateLimitedTransport {
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Result<Self> {
        let rate = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| ScrapeError::Config("requests_per_second must be positive".into()))?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| ScrapeError::Config("burst must be positive".into()))?;
        let limiter = RateLimiter::direct(Quota::per_second(rate).allow_burst(burst));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(concat!(
                "text/html,application/xhtml+xml,application/xml;q=0.9,",
                "image/avif,image/webp,*/*;q=0.8"
            )),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ja,en-US;q=0.9,en;q=0.8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(Self::random_user_agent())
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self { client, limiter, config })
    }

    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
    }

    /// Exponential backoff with ±25% jitter
    fn calculate_retry_delay(&self, attempt: usize) -> Duration {
        let base_delay = self.config.initial_retry_delay_ms;
        let max_delay = self.config.max_retry_delay_ms;
        let delay_ms = base_delay
            .saturating_mul(2u64.saturating_pow(attempt as u32))
            .min(max_delay);

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0.75..=1.25);
        Duration::from_millis((delay_ms as f64 * jitter) as u64)
    }

    /// Send a request, waiting for a limiter token before every attempt.
    ///
    /// Only idempotent requests are retried; a login POST goes out once.
    pub async fn send(&self, request: &PageRequest, cookie: Option<&str>) -> Result<Page> {
        let retries = if request.is_idempotent() { self.config.max_retries } else { 0 };
        let mut attempt = 0;
        loop {
            self.limiter.until_ready().await;
            let result = self.send_once(request, cookie).await;

            let retry = match &result {
                Ok(page) => is_retryable_status(page.status),
                Err(e) => e.is_transient(),
            };
            if !retry || attempt >= retries {
                return result;
            }

            match &result {
                Ok(page) => log::warn!(
                    "Received retryable status {} for {}, attempt {}/{}",
                    page.status,
                    request.url(),
                    attempt + 1,
                    retries + 1
                ),
                Err(e) => log::warn!(
                    "Request failed for {}, attempt {}/{}: {}",
                    request.url(),
                    attempt + 1,
                    retries + 1,
                    e
                ),
            }
            sleep(self.calculate_retry_delay(attempt)).await;
            attempt += 1;
        }
    }

    async fn send_once(&self, request: &PageRequest, cookie: Option<&str>) -> Result<Page> {
        let mut builder = match request {
            PageRequest::Get { url } => self.client.get(url),
            PageRequest::PostForm { url, form } => self.client.post(url).form(form),
        };
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Page {
            url: request.url().to_string(),
            status,
            content_type,
            set_cookies,
            body,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_creation() {
        assert!(RateLimitedTransport::new().is_ok());
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let config = TransportConfig { requests_per_second: 0, ..TransportConfig::default() };
        assert!(matches!(
            RateLimitedTransport::with_config(config),
            Err(ScrapeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_delay_calculation() {
        let transport = RateLimitedTransport::new().unwrap();
        let delay0 = transport.calculate_retry_delay(0);
        let delay3 = transport.calculate_retry_delay(3);
        let capped = transport.calculate_retry_delay(20);

        assert!(delay0.as_millis() >= 375 && delay0.as_millis() <= 625);
        assert!(delay3.as_millis() >= 3000);
        assert!(capped.as_millis() <= 10_000);
    }

    #[test]
    fn test_random_user_agent() {
        assert!(USER_AGENTS.contains(&RateLimitedTransport::random_user_agent()));
    }
}
