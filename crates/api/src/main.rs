//! Push relay binary entrypoint.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relay_common::auth::{ServiceAccountAuth, ServiceAccountKey, TokenSource};
use relay_common::clock::{BootEpoch, SystemClock};
use relay_common::config::AppConfig;
use relay_engine::{ChangeFeedWatcher, DispatchEngine, ListenerRegistry, PayloadBuilder, RelayStats};
use relay_notifier::{DisplayHints, FcmTransport, PushProvider};
use relay_store::{ChangeFeedStore, DeliveryLedger, RtdbStore, TokenRegistry};

use relay_api::keepalive::KeepAlive;
use relay_api::routes::create_router;
use relay_api::state::AppState;

/// Largest accepted request body; `/test-push` bodies are tiny.
const MAX_BODY_BYTES: usize = 16 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "relay_api=info,relay_engine=info,relay_notifier=info,relay_store=info,tower_http=info",
            )
        }))
        .init();

    // Captured before any subscription opens
    let boot = BootEpoch::capture(&SystemClock);
    let started_at = Instant::now();

    let config = AppConfig::from_env()?;
    tracing::info!(app = %config.app_name, boot_epoch = %boot, "Starting push relay...");

    // Credentials shared by the database and FCM
    let client = reqwest::Client::new();
    let key = ServiceAccountKey::from_json(&config.service_account_json)?;
    let auth = ServiceAccountAuth::new(key, client.clone())?;
    let project_id = auth.project_id().to_string();
    let auth: Arc<dyn TokenSource> = Arc::new(auth);
    tracing::info!(project = %project_id, "Service account loaded");

    let store: Arc<dyn ChangeFeedStore> = Arc::new(RtdbStore::new(
        config.database_url.clone(),
        client.clone(),
        auth.clone(),
    ));
    let tokens = TokenRegistry::new(store.clone());
    let push = Arc::new(PushProvider::new(
        Arc::new(FcmTransport::new(project_id, client.clone(), auth)),
        tokens.clone(),
        DisplayHints::new(config.push_icon_url.clone()),
    ));
    let stats = Arc::new(RelayStats::new());

    let engine = DispatchEngine::new(
        tokens.clone(),
        DeliveryLedger::new(store.clone()),
        push.clone(),
        PayloadBuilder::new(&config.app_name),
    );
    let watcher = Arc::new(ChangeFeedWatcher::new(
        store,
        Arc::new(engine),
        Arc::new(ListenerRegistry::new()),
        boot,
        stats.clone(),
    ));

    if let Some(url) = &config.public_url {
        let keepalive = KeepAlive::new(url, config.keepalive_interval_secs, client);
        tokio::spawn(keepalive.run());
    } else {
        tracing::info!("No public URL configured, keep-alive disabled");
    }

    let port = config.port;
    let state = AppState::new(tokens, push, stats, boot, started_at, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Push relay listening on {}", addr);

    // Run until a feed fails, the server stops, or Ctrl+C
    tokio::select! {
        result = watcher.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Change feed watcher exited with error");
                return Err(e.into());
            }
        }
        result = axum::serve(listener, app).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Push relay stopped.");
    Ok(())
}
