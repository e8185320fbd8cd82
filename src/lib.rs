// Library interface for eagate_scraper
// This allows tests and the binary to use the scraper components

pub mod auth;
pub mod captcha;
pub mod client;
pub mod config;
pub mod cookie;
pub mod crawler;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod helpers;
pub mod http_client;
pub mod models;
pub mod session;
pub mod sources;
pub mod sync;

pub use error::{Result, ScrapeError};
