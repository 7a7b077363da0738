use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groupnom_backend::{
    app::build_router,
    config::Config,
    db::connection::create_pool,
    selection::{
        outcomes::{InMemoryOutcomeStore, PgOutcomeStore},
        CuratedPlaceSource, GooglePlacesSource, OutcomeRecorder, OutcomeStore, PlaceSource,
        RestaurantSelector, RestaurantSourcing,
    },
    services::{spawn_expiry_sweeper, SessionStore},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupnom_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        database = config.database_url.is_some(),
        session_ttl_hours = config.session_ttl_hours,
        match_rule = ?config.session_match_rule,
        auto_finish = config.session_auto_finish,
        places_snapshot = ?config.places_snapshot_path,
        google_maps_api_key = %config
            .google_maps_api_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "<unset>".into()),
        rate_limit_enabled = config.rate_limit_enabled,
        "Loaded configuration from environment/.env"
    );

    let curated = match &config.places_snapshot_path {
        Some(path) => {
            let source = CuratedPlaceSource::from_json_file(path)?;
            tracing::info!(path, places = source.len(), "Loaded curated place snapshot");
            source
        }
        None => CuratedPlaceSource::new(Vec::new()),
    };
    let fallback: Option<Arc<dyn PlaceSource>> = match &config.google_maps_api_key {
        Some(key) => Some(Arc::new(GooglePlacesSource::new(
            key.clone(),
            config.upstream_timeout(),
        )?)),
        None => None,
    };
    if curated.is_empty() && fallback.is_none() {
        tracing::warn!("No place data configured: every session creation will find nothing");
    }
    let sourcing = RestaurantSourcing::new(
        Arc::new(curated),
        fallback,
        RestaurantSelector::new(
            config.selection_weights_balanced,
            config.selection_weights_hidden_gem,
        ),
    );

    let outcome_store: Arc<dyn OutcomeStore> = match &config.database_url {
        Some(url) => Arc::new(PgOutcomeStore::new(create_pool(url).await?)),
        None => {
            tracing::info!("DATABASE_URL unset, keeping voting outcomes in memory");
            Arc::new(InMemoryOutcomeStore::new())
        }
    };

    let sessions = Arc::new(SessionStore::in_memory(config.session_policy()));
    let _sweeper = spawn_expiry_sweeper(sessions.clone(), config.sweep_interval());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::new(
        sessions,
        Arc::new(sourcing),
        OutcomeRecorder::new(outcome_store),
        config,
    );
    let app = build_router(state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
