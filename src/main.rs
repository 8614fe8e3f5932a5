mod catalog;
mod config;
mod db;
mod entities;
mod error;
mod models;
mod routes;
mod seed;
mod store;

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{catalog::CatalogService, config::Config, seed::Seeder, store::SqlMovieStore};

pub struct AppState {
    pub catalog: CatalogService<SqlMovieStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,movie_catalog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = SqlMovieStore::new(db, config.page_size);
    let catalog = CatalogService::new(store, config.event_interval);

    if config.seed_on_startup {
        match Seeder::new(catalog.clone()).run().await {
            Ok(seeded) => tracing::info!(count = seeded.len(), "catalog seeded"),
            Err(err) => tracing::warn!(error = %err, "seeding failed, serving anyway"),
        }
    }

    let state = Arc::new(AppState { catalog });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
