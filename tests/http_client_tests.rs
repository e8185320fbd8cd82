use eagate_scraper::config::{Config, TransportConfig};
use eagate_scraper::http_client::RateLimitedTransport;

#[tokio::test]
async fn test_http_client_creation() {
    let client = RateLimitedTransport::new();
    assert!(client.is_ok(), "Failed to create HTTP client");
}

#[tokio::test]
async fn test_http_client_with_custom_config() {
    let config = TransportConfig {
        requests_per_second: 2,
        burst: 1,
        timeout_secs: 10,
        max_retries: 1,
        initial_retry_delay_ms: 100,
        max_retry_delay_ms: 1000,
    };

    let client = RateLimitedTransport::with_config(config)
        .expect("Failed to create HTTP client with custom config");
    assert_eq!(client.config().requests_per_second, 2);
    assert_eq!(client.config().burst, 1);
}

#[tokio::test]
async fn test_zero_burst_is_rejected() {
    let config = TransportConfig { burst: 0, ..TransportConfig::default() };
    assert!(RateLimitedTransport::with_config(config).is_err());
}

#[tokio::test]
async fn test_transport_from_config_file() {
    let path =
        std::env::temp_dir().join(format!("eagate_scraper_test_{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "database_path = \"test.db\"\n[account]\nusername = \"Dancer@Example.com\"\n[transport]\nrequests_per_second = 1\nburst = 1\n",
    )
    .expect("Failed to write config");

    let cfg = Config::load_from(&path).expect("Failed to load config");
    std::fs::remove_file(&path).ok();

    assert_eq!(cfg.database_path, "test.db");
    assert!(cfg.validate().is_ok());
    assert!(cfg.transport.create_transport().is_ok());
}

#[tokio::test]
async fn test_missing_config_file_uses_defaults() {
    let cfg = Config::load_from(std::path::Path::new("/nonexistent/eagate.toml")).unwrap();
    assert_eq!(cfg.crawl.workers, 16);
    // no account configured
    assert!(cfg.validate().is_err());
}
