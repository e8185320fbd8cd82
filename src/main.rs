use eagate_scraper::config::Config;
use eagate_scraper::sync;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::process::ExitCode;

fn init_logging(path: &str) {
    let Err(file_error) = log4rs::init_file(path, Default::default()) else {
        return;
    };

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}")))
        .build();
    let fallback = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match fallback.map(log4rs::init_config) {
        Ok(Ok(_)) => log::warn!("could not load {} ({}), logging to console", path, file_error),
        Ok(Err(e)) => eprintln!("failed to initialize logging: {}", e),
        Err(e) => eprintln!("invalid fallback logging config: {}", e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&cfg.log_config);

    if let Err(e) = cfg.validate() {
        log::error!("{}", e);
        return ExitCode::FAILURE;
    }

    log::info!("Starting sync for {}", cfg.account.username.trim().to_lowercase());
    log::info!("  Database: {}", cfg.database_path);
    log::info!(
        "  Rate limit: {}/s (burst {}), {} workers",
        cfg.transport.requests_per_second,
        cfg.transport.burst,
        cfg.crawl.workers
    );

    match sync::run(&cfg).await {
        Ok(report) => {
            log::info!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("sync failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
