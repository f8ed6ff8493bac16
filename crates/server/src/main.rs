//! Dispatch Sync server - order reconciliation engine and internal sync API.
//!
//! This binary serves the sync API on port 3002.
//!
//! # Security
//!
//! The API binds to 127.0.0.1 by default and trusts the `x-actor-*` headers
//! of callers holding the bearer token. Only the platform front-end should
//! hold that token.
//!
//! # Architecture
//!
//! - Axum web framework
//! - Provider merchant API over `reqwest`
//! - `PostgreSQL` for orders, inventory, credentials and the event log
//! - One sync engine per signed-in staff member

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::http::{Request, Response};
use sentry::integrations::tracing as sentry_tracing;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_sync_server::config::SyncConfig;
use dispatch_sync_server::db::{
    self, CredentialRepository, EventRepository, OrderRepository, SettingsRepository,
};
use dispatch_sync_server::provider::{DeliveryProvider, ProviderClient, ReferenceData};
use dispatch_sync_server::routes;
use dispatch_sync_server::services::AccountService;
use dispatch_sync_server::state::AppState;
use dispatch_sync_server::sync::{EngineDeps, SessionRegistry};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = SyncConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dispatch_sync_server=info,tower_http=debug".into());

    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p dispatch-sync-cli -- migrate

    let provider: Arc<dyn DeliveryProvider> = Arc::new(ProviderClient::new(&config.provider)?);
    let credentials = Arc::new(CredentialRepository::new(pool.clone()));

    let deps = EngineDeps {
        orders: Arc::new(OrderRepository::new(pool.clone())),
        credentials: credentials.clone(),
        settings: Arc::new(SettingsRepository::new(pool.clone())),
        events: Arc::new(EventRepository::new(pool.clone())),
        provider: Arc::clone(&provider),
        funds: None,
    };
    let sessions = SessionRegistry::new(deps, config.engine.clone(), config.periodic_enabled);

    let state = AppState::new(
        config.api_token.clone(),
        pool,
        sessions.clone(),
        AccountService::new(credentials, Arc::clone(&provider)),
        ReferenceData::new(provider, config.reference_cache_ttl),
    );

    let app = routes::router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        actor_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &Response<_>, latency: std::time::Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("sync API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown_all().await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
