use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub event_interval: Duration,
    pub page_size: u64,
    pub seed_on_startup: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://movies.db?mode=rwc".to_string());

        let event_interval_ms: u64 =
            std::env::var("EVENT_INTERVAL_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(1000);

        let page_size: u64 =
            std::env::var("PAGE_SIZE").ok().and_then(|s| s.parse().ok()).unwrap_or(100);

        let seed_on_startup = std::env::var("SEED_ON_STARTUP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            event_interval: Duration::from_millis(event_interval_ms.max(1)),
            page_size,
            seed_on_startup,
        })
    }
}
