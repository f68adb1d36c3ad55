use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thesis_comm::{
    AppState,
    comm::{self, CommHub, groups::InMemoryGroups, throttle::SendThrottle},
    config::{self, Config},
    db, router,
    session::session_layer,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = config::load_config()?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("bad database_url {}", config.database_url))?
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(connect_options)
        .await?;
    db::migrate(&db_pool).await?;

    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("creating {}", config.uploads.dir.display()))?;

    let hub = CommHub::new(
        db_pool.clone(),
        Arc::new(InMemoryGroups::new()),
        Arc::new(SendThrottle::new(config.hub.send_interval)),
        config.hub.outbox_capacity,
    );

    if let Some(older_than) = config.hub.stale_call_after {
        comm::spawn_stale_call_sweeper(hub.clone(), config.hub.sweep_every, older_than);
    }

    let mut app = router(&config)
        .with_state(AppState {
            db_pool,
            hub,
            config: Arc::new(config.clone()),
        })
        .layer(session_layer(&config))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&config)? {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,thesis_comm=debug".to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn cors_layer(config: &Config) -> anyhow::Result<Option<CorsLayer>> {
    if config.allowed_origins.is_empty() {
        return Ok(None);
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin).with_context(|| format!("bad origin {origin}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    ))
}
