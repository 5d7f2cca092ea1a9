//! fxchatd - real-time messaging and push-notification hub.

use fxchatd::api::{self, AppState};
use fxchatd::auth;
use fxchatd::config::Config;
use fxchatd::db::Database;
use fxchatd::hub::Hub;
use fxchatd::network::Gateway;
use fxchatd::notify::{Dispatcher, ExpoPushProvider, NoopPushProvider, PushProvider};
use fxchatd::router::Router;
use fxchatd::{http, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(server = %config.server.name, "Starting fxchatd");

    // Initialize database
    let db_path = config
        .database
        .as_ref()
        .map(|d| d.path.as_str())
        .unwrap_or("fxchatd.db");
    let db = Database::new(db_path).await?;

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    // Start the hub coordination task
    let (hub, hub_task) = Hub::new();
    tokio::spawn(hub_task.run());

    // Notification dispatcher
    let provider: Arc<dyn PushProvider> = match &config.push {
        Some(push) => {
            info!(endpoint = %push.endpoint, "Push notifications enabled");
            Arc::new(ExpoPushProvider::new(push.endpoint.clone()))
        }
        None => {
            info!("Push notifications disabled");
            Arc::new(NoopPushProvider)
        }
    };
    let notifier = Arc::new(Dispatcher::new(db.clone(), provider));

    let router = Arc::new(Router::new(db.clone(), hub.clone(), notifier));
    let identity = auth::provider_for(config.auth.mode);

    // Management REST API
    {
        let state = AppState {
            db: db.clone(),
            auth: Arc::clone(&identity),
        };
        let api_address = config.listen.api_address;
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_address, state).await {
                error!(error = %e, "API server exited");
            }
        });
    }

    // WebSocket gateway
    let gateway = Gateway::bind(config.listen.ws_address, hub.clone(), router, identity, db)
        .await?;

    tokio::select! {
        result = gateway.run() => {
            error!("Gateway stopped unexpectedly");
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    hub.shutdown().await;
    info!("fxchatd stopped");
    Ok(())
}
